// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! `run` and `graph` commands

use crate::cli::LoadArgs;
use futures::future::join_all;
use modload_core::{
    JsonDirSource, LoaderConfig, ModuleInfo, ModuleLoader, ModuleState, RetryingSource,
};
use owo_colors::OwoColorize;
use serde_json::Value;
use tracing::debug;

/// Build a loader over the JSON modules in `config.base_dir`
pub fn build_loader(config: LoaderConfig) -> ModuleLoader<Value> {
    debug!(
        base_dir = %config.base_dir.display(),
        retries = config.fetch_retries,
        "building loader"
    );
    let source = RetryingSource::new(
        JsonDirSource::new(&config.base_dir),
        config.fetch_retries,
        config.retry_delay(),
    );
    ModuleLoader::with_config(config, source)
}

/// Require every module and print its exports.
pub async fn run(args: &LoadArgs, loader: &ModuleLoader<Value>) -> anyhow::Result<()> {
    let exports = loader.require_all(&args.modules).await?;

    for (name, value) in args.modules.iter().zip(&exports) {
        println!("{}", name.bright_cyan().bold());
        println!("{}", render(value, args.compact)?);
    }
    Ok(())
}

/// Require every module, then print what the loader knows.
///
/// Unlike `run`, one failing module does not stop the others.
pub async fn graph(args: &LoadArgs, loader: &ModuleLoader<Value>) -> anyhow::Result<()> {
    let results = join_all(args.modules.iter().map(|name| loader.require(name))).await;

    for info in loader.snapshot() {
        println!("{}", format_info(&info));
    }

    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} modules failed to load", failed, results.len());
    }
    Ok(())
}

/// Render exports as JSON
pub fn render(value: &Value, compact: bool) -> serde_json::Result<String> {
    if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    }
}

/// One line per module: state, name, dependencies, error
pub fn format_info(info: &ModuleInfo) -> String {
    let state = match info.state {
        ModuleState::Ready => format!("{:9}", info.state).green().to_string(),
        ModuleState::Failed => format!("{:9}", info.state).red().to_string(),
        ModuleState::Loading => format!("{:9}", info.state).yellow().to_string(),
        ModuleState::Unstarted => format!("{:9}", info.state).dimmed().to_string(),
    };

    let mut line = format!("{} {}", state, info.name.bold());
    if !info.dependencies.is_empty() {
        line.push_str(&format!(" -> [{}]", info.dependencies.join(", ")).dimmed().to_string());
    }
    if let Some(error) = &info.error {
        line.push_str(&format!("  {}", error.red()));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_over_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.json"),
            r#"{ "exports": { "val": 10 } }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"{ "dependencies": ["b"], "exports": { "val": 11 } }"#,
        )
        .unwrap();

        let config = LoaderConfig {
            base_dir: dir.path().to_path_buf(),
            ..LoaderConfig::default()
        };
        let loader = build_loader(config);
        let args = LoadArgs {
            modules: vec!["a".into()],
            compact: true,
        };

        run(&args, &loader).await.unwrap();
        assert_eq!(loader.state("b"), Some(ModuleState::Ready));

        let missing = LoadArgs {
            modules: vec!["a".into(), "nope".into()],
            compact: true,
        };
        assert!(graph(&missing, &loader).await.is_err());
    }

    #[test]
    fn test_format_info_mentions_dependencies() {
        let info = ModuleInfo {
            name: "a".into(),
            state: ModuleState::Ready,
            dependencies: vec!["b".into()],
            defined: false,
            error: None,
        };
        let line = format_info(&info);
        assert!(line.contains('a'));
        assert!(line.contains("b"));
    }
}
