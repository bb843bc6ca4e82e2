// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! JSON module files
//!
//! A JSON module is a file `<base_dir>/<location>.json`:
//!
//! ```json
//! { "dependencies": ["b"], "exports": { "val": 11 } }
//! ```
//!
//! Its factory returns `exports`. When `exports` is an object and the module
//! has dependencies, the dependencies' exports are attached under `"imports"`
//! in declaration order.

use super::{ModuleSource, SourceRequest};
use crate::error::{LoaderError, Result};
use crate::record::ModuleDefinition;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, instrument};

/// Key under which dependency exports are attached
pub const IMPORTS_KEY: &str = "imports";

#[derive(Debug, Deserialize)]
struct JsonModule {
    #[serde(default, alias = "deps")]
    dependencies: Vec<String>,
    #[serde(default)]
    exports: Value,
}

/// Build the definition of a JSON module
pub fn json_definition(dependencies: Vec<String>, exports: Value) -> ModuleDefinition<Value> {
    ModuleDefinition {
        dependencies,
        factory: Box::new(move |imports: Vec<Value>| {
            let mut exports = exports;
            if let Value::Object(map) = &mut exports {
                if !imports.is_empty() {
                    map.insert(IMPORTS_KEY.to_string(), Value::Array(imports));
                }
            }
            Ok(exports)
        }),
    }
}

/// Parse JSON module text
pub fn parse_json_module(name: &str, content: &str) -> Result<ModuleDefinition<Value>> {
    let module: JsonModule = serde_json::from_str(content)
        .map_err(|e| LoaderError::source(name, format!("invalid JSON module: {}", e)))?;
    Ok(json_definition(module.dependencies, module.exports))
}

/// Loads JSON modules from a directory
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    base_dir: PathBuf,
}

impl JsonDirSource {
    /// Create a source rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the file backing `location`.
    ///
    /// Locations must stay inside the base directory: absolute paths and
    /// `..` components are rejected.
    pub fn module_path(&self, location: &str) -> Result<PathBuf> {
        let relative = Path::new(location);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || location.is_empty() {
            return Err(LoaderError::source(
                location,
                "location must be a relative path inside the module directory",
            ));
        }

        if location.ends_with(".json") {
            Ok(self.base_dir.join(relative))
        } else {
            Ok(self.base_dir.join(format!("{}.json", location)))
        }
    }
}

#[async_trait]
impl ModuleSource<Value> for JsonDirSource {
    #[instrument(skip(self), fields(module = %request.name))]
    async fn fetch(&self, request: &SourceRequest) -> Result<ModuleDefinition<Value>> {
        let path = self
            .module_path(&request.location)
            .map_err(|_| {
                LoaderError::source(
                    &request.name,
                    format!("location '{}' is outside {}", request.location, self.base_dir.display()),
                )
            })?;
        debug!("Reading module from {}", path.display());

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LoaderError::not_found(&request.name));
            }
            Err(e) => {
                return Err(LoaderError::source(
                    &request.name,
                    format!("{}: {}", path.display(), e),
                ));
            }
        };

        parse_json_module(&request.name, &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_definition_attaches_imports() {
        let def = json_definition(vec!["b".into()], json!({ "val": 11 }));
        assert_eq!(def.dependencies, vec!["b".to_string()]);

        let exports = (def.factory)(vec![json!({ "val": 10 })]).unwrap();
        assert_eq!(exports, json!({ "val": 11, "imports": [{ "val": 10 }] }));
    }

    #[test]
    fn test_scalar_exports_unchanged() {
        let def = json_definition(vec!["b".into()], json!("Mon"));
        assert_eq!((def.factory)(vec![json!(1)]).unwrap(), json!("Mon"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_json_module("a", "{ not json").unwrap_err();
        assert!(matches!(err, LoaderError::Source { .. }));
    }

    #[test]
    fn test_module_path() {
        let source = JsonDirSource::new("/mods");
        assert_eq!(source.module_path("a").unwrap(), PathBuf::from("/mods/a.json"));
        assert_eq!(
            source.module_path("lib/b.json").unwrap(),
            PathBuf::from("/mods/lib/b.json")
        );
        assert!(source.module_path("../secret").is_err());
        assert!(source.module_path("lib/../../secret").is_err());
        assert!(source.module_path("/etc/passwd").is_err());
        assert!(source.module_path("").is_err());
    }

    #[tokio::test]
    async fn test_fetch_stays_inside_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mods = dir.path().join("mods");
        std::fs::create_dir(&mods).unwrap();
        std::fs::write(dir.path().join("secret.json"), r#"{ "exports": 1 }"#).unwrap();
        let source = JsonDirSource::new(&mods);

        let err = source
            .fetch(&SourceRequest::new("../secret", "../secret"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::Source { ref module, .. } if module == "../secret"));
    }

    #[tokio::test]
    async fn test_fetch_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"{ "deps": ["b"], "exports": { "name": "a" } }"#,
        )
        .unwrap();
        let source = JsonDirSource::new(dir.path());

        let def = source.fetch(&SourceRequest::new("a", "a")).await.unwrap();
        assert_eq!(def.dependencies, vec!["b".to_string()]);

        let err = source
            .fetch(&SourceRequest::new("missing", "missing"))
            .await
            .unwrap_err();
        assert_eq!(err, LoaderError::not_found("missing"));
    }
}
