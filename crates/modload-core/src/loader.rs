// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module loader - the `define`/`require` surface

use crate::config::LoaderConfig;
use crate::error::Result;
use crate::record::{ModuleDefinition, ModuleInfo, ModuleState};
use crate::registry::ModuleRegistry;
use crate::scheduler::Scheduler;
use crate::source::{ModuleSource, NoSource};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::instrument;

/// Module loader
///
/// Cloning is cheap and yields a handle to the same registry. Separately
/// constructed loaders never share modules.
pub struct ModuleLoader<V: Send + 'static> {
    scheduler: Arc<Scheduler<V>>,
}

impl<V> ModuleLoader<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a loader that only knows `define`d modules
    pub fn new() -> Self {
        Self::with_source(NoSource)
    }

    /// Create a loader that asks `source` for modules nobody defined
    pub fn with_source(source: impl ModuleSource<V> + 'static) -> Self {
        Self::with_config(LoaderConfig::default(), source)
    }

    /// Create a loader with explicit configuration
    pub fn with_config(config: LoaderConfig, source: impl ModuleSource<V> + 'static) -> Self {
        Self {
            scheduler: Arc::new(Scheduler::new(config, Box::new(source))),
        }
    }

    /// Declare a module: its dependencies and the factory building its exports.
    ///
    /// Fails with `DuplicateDefinition` once the module has started loading.
    pub fn define<F>(&self, name: &str, dependencies: &[&str], factory: F) -> Result<()>
    where
        F: FnOnce(Vec<V>) -> anyhow::Result<V> + Send + 'static,
    {
        self.define_module(name, ModuleDefinition::new(dependencies.iter().copied(), factory))
    }

    /// Declare a module from a prepared definition
    pub fn define_module(&self, name: &str, definition: ModuleDefinition<V>) -> Result<()> {
        self.scheduler.registry().define(name, definition)
    }

    /// Load a module and return its exports
    #[instrument(skip(self))]
    pub async fn require(&self, name: &str) -> Result<V> {
        self.scheduler.clone().load(name.to_string()).await
    }

    /// Load several modules, exports in the order requested
    pub async fn require_all<I, S>(&self, names: I) -> Result<Vec<V>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let loads = names
            .into_iter()
            .map(|name| self.scheduler.clone().load(name.as_ref().to_string()));
        try_join_all(loads).await
    }

    /// Load several modules, then hand their exports to `continuation`
    pub async fn require_with<I, S, F, R>(&self, names: I, continuation: F) -> Result<R>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnOnce(&[V]) -> R,
    {
        let exports = self.require_all(names).await?;
        Ok(continuation(&exports))
    }

    /// Location the module source is asked for when loading `name`
    pub fn resolve(&self, name: &str) -> String {
        self.scheduler.config().resolve_location(name)
    }

    /// Current state of a module, if the loader has seen it
    pub fn state(&self, name: &str) -> Option<ModuleState> {
        self.scheduler.registry().state(name)
    }

    /// Cached exports of a ready module
    pub fn exports(&self, name: &str) -> Option<V> {
        self.scheduler.registry().exports(name)
    }

    /// Point-in-time view of every module the loader knows
    pub fn snapshot(&self) -> Vec<ModuleInfo> {
        self.scheduler.registry().snapshot()
    }

    /// Get the module registry
    pub fn registry(&self) -> &ModuleRegistry<V> {
        self.scheduler.registry()
    }

    /// Get the loader configuration
    pub fn config(&self) -> &LoaderConfig {
        self.scheduler.config()
    }
}

impl<V: Send + 'static> Clone for ModuleLoader<V> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<V> Default for ModuleLoader<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
