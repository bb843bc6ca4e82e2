// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # modload-core
//!
//! An asynchronous, AMD-style module dependency resolver and loader.
//!
//! - `define(name, dependencies, factory)` declares a module
//! - `require(name)` loads it, its dependencies first
//! - Each factory runs at most once; exports are cached for the loader's lifetime
//! - Factory arguments follow declaration order, whatever order dependencies finish in
//! - Cycles fail with [`LoaderError::CircularDependency`] instead of deadlocking
//! - Modules nobody defined are fetched from a pluggable [`ModuleSource`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use modload_core::ModuleLoader;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let loader: ModuleLoader<i64> = ModuleLoader::new();
//!     loader.define("b", &[], |_| Ok(10))?;
//!     loader.define("a", &["b"], |deps| Ok(deps[0] + 1))?;
//!
//!     assert_eq!(loader.require("a").await?, 11);
//!     Ok(())
//! }
//! ```
//!
//! ## Module sources
//!
//! ```rust,ignore
//! use modload_core::{JsonDirSource, LoaderConfig, ModuleLoader, RetryingSource};
//!
//! let config = LoaderConfig::load(None)?;
//! let source = RetryingSource::new(
//!     JsonDirSource::new(&config.base_dir),
//!     config.fetch_retries,
//!     config.retry_delay(),
//! );
//! let loader = ModuleLoader::with_config(config, source);
//! let main = loader.require("main").await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod loader;
pub mod record;
pub mod registry;
mod scheduler;
pub mod source;

// Re-exports
pub use config::LoaderConfig;
pub use error::{LoaderError, Result};
pub use loader::ModuleLoader;
pub use record::{Factory, ModuleDefinition, ModuleInfo, ModuleState};
pub use registry::ModuleRegistry;
pub use source::{
    json_definition, FnSource, JsonDirSource, ModuleSource, NoSource, RetryingSource,
    SourceChain, SourceRequest,
};

/// Version of the modload-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
