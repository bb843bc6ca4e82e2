// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader configuration
//!
//! Read from `modload.toml`, then overridden by `MODLOAD_*` environment
//! variables:
//!
//! ```toml
//! base_dir = "modules"
//! fetch_retries = 2
//! retry_delay_ms = 100
//! loglevel = "debug"
//!
//! [paths]
//! jquery = "vendor/jquery/dist/jquery"
//! ```

use crate::error::{LoaderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Default config file name
pub const CONFIG_FILE: &str = "modload.toml";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "MODLOAD_";

/// Configuration for a module loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Root directory for file-backed module sources
    pub base_dir: PathBuf,

    /// Module name -> location aliases
    pub paths: BTreeMap<String, String>,

    /// Extra attempts after a transport failure
    pub fetch_retries: u32,

    /// Delay between fetch attempts in milliseconds
    pub retry_delay_ms: u64,

    /// Log level used when `RUST_LOG` is unset
    pub loglevel: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            paths: BTreeMap::new(),
            fetch_retries: 0,
            retry_delay_ms: 50,
            loglevel: "info".to_string(),
        }
    }
}

impl LoaderConfig {
    /// Load configuration from a file (if it exists) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| LoaderError::Config(format!("{}: {}", path.display(), e)))?;
            Self::from_toml_str(&content)?
        } else {
            Self::default()
        };

        config.apply_env(std::env::vars())?;
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `MODLOAD_*` overrides from an iterator of variables.
    ///
    /// `MODLOAD_PATHS` takes a comma-separated list of `name=location`.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                let config_key = config_key.to_lowercase().replace('_', "-");
                if self.get(&config_key).is_none() {
                    warn!("Ignoring unknown setting {}", key);
                    continue;
                }
                self.set(&config_key, &value)?;
            }
        }
        Ok(())
    }

    /// Set a configuration value by key.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "base-dir" => self.base_dir = PathBuf::from(value),
            "fetch-retries" => {
                self.fetch_retries = value
                    .parse()
                    .map_err(|_| LoaderError::Config(format!("invalid fetch-retries: {}", value)))?;
            }
            "retry-delay-ms" => {
                self.retry_delay_ms = value
                    .parse()
                    .map_err(|_| LoaderError::Config(format!("invalid retry-delay-ms: {}", value)))?;
            }
            "loglevel" => self.loglevel = value.to_string(),
            "paths" => {
                for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                    let (name, location) = entry
                        .split_once('=')
                        .ok_or_else(|| LoaderError::Config(format!("invalid path alias: {}", entry)))?;
                    self.paths
                        .insert(name.trim().to_string(), location.trim().to_string());
                }
            }
            _ => return Err(LoaderError::Config(format!("unknown key: {}", key))),
        }
        Ok(())
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "base-dir" => Some(self.base_dir.display().to_string()),
            "fetch-retries" => Some(self.fetch_retries.to_string()),
            "retry-delay-ms" => Some(self.retry_delay_ms.to_string()),
            "loglevel" => Some(self.loglevel.clone()),
            "paths" => Some(
                self.paths
                    .iter()
                    .map(|(name, location)| format!("{}={}", name, location))
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            _ => None,
        }
    }

    /// Location a module source should use for `name`
    pub fn resolve_location(&self, name: &str) -> String {
        self.paths
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Delay between fetch attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
