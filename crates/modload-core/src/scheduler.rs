// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Dependency scheduler - drives modules from unstarted to ready or failed
//!
//! The first requester of a module claims it and spawns a driver task. The
//! driver fetches the definition if `define` did not supply one, loads every
//! dependency concurrently, runs the factory with the dependencies' exports in
//! declaration order and settles the record. Every requester, the claimer
//! included, waits on the record's broadcast, so dropping a requester never
//! abandons a load.

use crate::config::LoaderConfig;
use crate::error::{LoaderError, Result};
use crate::record::{Factory, ModuleDefinition};
use crate::registry::{Acquire, ModuleRegistry};
use crate::source::{ModuleSource, SourceRequest};
use futures::future::{try_join_all, BoxFuture};
use futures::{FutureExt, TryFutureExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, instrument};

/// Resolves modules against one registry and one source
pub(crate) struct Scheduler<V: Send + 'static> {
    registry: ModuleRegistry<V>,
    source: Box<dyn ModuleSource<V>>,
    config: LoaderConfig,
}

impl<V> Scheduler<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(config: LoaderConfig, source: Box<dyn ModuleSource<V>>) -> Self {
        Self {
            registry: ModuleRegistry::new(),
            source,
            config,
        }
    }

    pub(crate) fn registry(&self) -> &ModuleRegistry<V> {
        &self.registry
    }

    pub(crate) fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load a module, returning its cached exports once ready
    #[instrument(level = "debug", skip(self))]
    pub(crate) async fn load(self: Arc<Self>, name: String) -> Result<V> {
        match self.registry.acquire(&name) {
            Acquire::Ready(exports) => {
                debug!("cache hit");
                Ok(exports)
            }
            Acquire::Failed(err) => Err(err),
            Acquire::Wait(waiter) => {
                debug!("already loading, waiting");
                settled(&name, waiter).await
            }
            Acquire::Start { definition, waiter } => {
                tokio::spawn(self.clone().drive(name.clone(), definition));
                settled(&name, waiter).await
            }
        }
    }

    /// Run one claimed module to a terminal state
    fn drive(
        self: Arc<Self>,
        name: String,
        definition: Option<ModuleDefinition<V>>,
    ) -> BoxFuture<'static, ()> {
        async move {
            // A panicking source must still settle the record, or its waiters hang
            let outcome = match AssertUnwindSafe(self.resolve(&name, definition))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => {
                    self.registry.clear_waits(&name);
                    Err(LoaderError::source(
                        &name,
                        format!("panicked: {}", panic_message(panic.as_ref())),
                    ))
                }
            };
            let settled = match outcome {
                Ok(exports) => self.registry.mark_ready(&name, exports),
                Err(err) => self.registry.mark_failed(&name, err),
            };
            if let Err(err) = settled {
                error!(module = %name, error = %err, "could not settle module");
            }
        }
        .boxed()
    }

    async fn resolve(
        self: &Arc<Self>,
        name: &str,
        definition: Option<ModuleDefinition<V>>,
    ) -> Result<V> {
        let ModuleDefinition {
            dependencies,
            factory,
        } = match definition {
            Some(definition) => definition,
            None => self.fetch(name).await?,
        };

        self.registry.record_dependencies(name, &dependencies);
        let imports = self.load_dependencies(name, &dependencies).await?;
        run_factory(name, factory, imports)
    }

    async fn fetch(&self, name: &str) -> Result<ModuleDefinition<V>> {
        let request = SourceRequest::new(name, self.config.resolve_location(name));
        debug!(module = name, location = %request.location, "fetching definition");
        self.source.fetch(&request).await
    }

    /// Load all dependencies of `name`, exports in declaration order.
    ///
    /// The first failure wins; the remaining dependencies keep loading in
    /// their own driver tasks.
    async fn load_dependencies(
        self: &Arc<Self>,
        name: &str,
        dependencies: &[String],
    ) -> Result<Vec<V>> {
        let mut pending = Vec::with_capacity(dependencies.len());
        let mut waiting = Vec::with_capacity(dependencies.len());
        let mut cycle = None;

        for dependency in dependencies {
            if let Err(err) = self.registry.begin_wait(name, dependency) {
                cycle = Some((dependency.clone(), err));
                break;
            }
            waiting.push(dependency.as_str());

            let label = dependency.clone();
            pending.push(
                self.clone()
                    .load(dependency.clone())
                    .map_err(move |err| (label, err)),
            );
        }

        let result = match cycle {
            Some(failure) => Err(failure),
            None => try_join_all(pending).await,
        };

        for dependency in waiting {
            self.registry.end_wait(name, dependency);
        }

        result.map_err(|(dependency, err)| dependency_error(name, dependency, err))
    }
}

async fn settled<V>(name: &str, waiter: oneshot::Receiver<Result<V>>) -> Result<V> {
    waiter.await.unwrap_or_else(|_| {
        Err(LoaderError::source(
            name,
            "load task ended before the module settled",
        ))
    })
}

/// Error for `module` after `dependency` failed with `err`.
///
/// Every member of a cycle reports the cycle itself.
fn dependency_error(module: &str, dependency: String, err: LoaderError) -> LoaderError {
    if err.is_cycle_through(module) {
        return err;
    }
    LoaderError::DependencyFailed {
        module: module.to_string(),
        dependency,
        source: Box::new(err),
    }
}

fn run_factory<V>(name: &str, factory: Factory<V>, imports: Vec<V>) -> Result<V> {
    match std::panic::catch_unwind(AssertUnwindSafe(move || factory(imports))) {
        Ok(Ok(exports)) => Ok(exports),
        Ok(Err(err)) => Err(LoaderError::factory(name, err)),
        Err(panic) => Err(LoaderError::factory(
            name,
            format!("panicked: {}", panic_message(panic.as_ref())),
        )),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
