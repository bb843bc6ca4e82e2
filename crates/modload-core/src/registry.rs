// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module registry: the single name -> record map
//!
//! Every state check and the action that depends on it happen under one lock,
//! so concurrent requests for the same name collapse onto a single load.
//! The lock is never held across an `.await`.

use crate::error::{LoaderError, Result};
use crate::record::{ModuleDefinition, ModuleInfo, ModuleRecord, ModuleState};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Outcome of asking the registry for a module
pub(crate) enum Acquire<V> {
    /// Cached exports
    Ready(V),
    /// Cached failure
    Failed(LoaderError),
    /// Another requester is loading it; wait for the broadcast
    Wait(oneshot::Receiver<Result<V>>),
    /// The caller claimed the load and must drive it to a terminal state
    Start {
        /// Definition registered through `define`, if any
        definition: Option<ModuleDefinition<V>>,
        /// The claimer's own waiter
        waiter: oneshot::Receiver<Result<V>>,
    },
}

struct RegistryInner<V> {
    records: HashMap<String, ModuleRecord<V>>,
    /// Wait-for edges: loading module -> dependencies it is waiting on
    waits: HashMap<String, BTreeMap<String, usize>>,
}

/// Thread-safe module registry
pub struct ModuleRegistry<V> {
    inner: Mutex<RegistryInner<V>>,
}

impl<V: Clone> ModuleRegistry<V> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                records: HashMap::new(),
                waits: HashMap::new(),
            }),
        }
    }

    /// Return the state of `name`, creating an unstarted record if needed
    pub fn get_or_create(&self, name: &str) -> ModuleState {
        let mut inner = self.inner.lock();
        inner.record_mut(name).state
    }

    /// Register a definition for a module that has not started loading.
    ///
    /// Redefining a still-unstarted module replaces the pending definition.
    pub fn define(&self, name: &str, definition: ModuleDefinition<V>) -> Result<()> {
        let mut inner = self.inner.lock();
        let record = inner.record_mut(name);

        if record.state != ModuleState::Unstarted {
            return Err(LoaderError::DuplicateDefinition(name.to_string()));
        }
        if record.definition.is_some() {
            warn!(module = name, "replacing pending definition");
        }

        debug!(module = name, dependencies = ?definition.dependencies, "defined");
        record.definition = Some(definition);
        Ok(())
    }

    /// Request a module, claiming its load when nobody else has
    pub(crate) fn acquire(&self, name: &str) -> Acquire<V> {
        let mut inner = self.inner.lock();
        let record = inner.record_mut(name);

        match record.state {
            ModuleState::Ready => match &record.exports {
                Some(exports) => Acquire::Ready(exports.clone()),
                None => Acquire::Failed(LoaderError::InvalidTransition {
                    module: name.to_string(),
                    state: record.state,
                }),
            },
            ModuleState::Failed => Acquire::Failed(
                record
                    .error
                    .clone()
                    .unwrap_or_else(|| LoaderError::not_found(name)),
            ),
            ModuleState::Loading => {
                let (tx, rx) = oneshot::channel();
                record.waiters.push(tx);
                Acquire::Wait(rx)
            }
            ModuleState::Unstarted => {
                let (tx, rx) = oneshot::channel();
                record.waiters.push(tx);
                record.state = ModuleState::Loading;
                Acquire::Start {
                    definition: record.definition.take(),
                    waiter: rx,
                }
            }
        }
    }

    /// Remember the declared dependencies of a loading module
    pub(crate) fn record_dependencies(&self, name: &str, dependencies: &[String]) {
        let mut inner = self.inner.lock();
        inner.record_mut(name).dependencies = dependencies.to_vec();
    }

    /// Transition a loading module to `Ready` and notify its waiters
    pub fn mark_ready(&self, name: &str, exports: V) -> Result<()> {
        let mut inner = self.inner.lock();
        let record = inner
            .records
            .get_mut(name)
            .ok_or_else(|| LoaderError::not_found(name))?;
        record.settle(Ok(exports))?;
        info!(module = name, "module ready");
        Ok(())
    }

    /// Transition a loading module to `Failed` and notify its waiters
    pub fn mark_failed(&self, name: &str, error: LoaderError) -> Result<()> {
        let mut inner = self.inner.lock();
        let record = inner
            .records
            .get_mut(name)
            .ok_or_else(|| LoaderError::not_found(name))?;
        let reason = error.to_string();
        record.settle(Err(error))?;
        warn!(module = name, error = %reason, "module failed");
        Ok(())
    }

    /// Record that `dependent` is about to wait on `dependency`.
    ///
    /// Fails with the full cycle when `dependency` already waits, directly
    /// or transitively, on `dependent`.
    pub(crate) fn begin_wait(&self, dependent: &str, dependency: &str) -> Result<()> {
        let mut inner = self.inner.lock();

        if let Some(mut cycle) = inner.wait_path(dependency, dependent) {
            cycle.push(dependency.to_string());
            return Err(LoaderError::CircularDependency { cycle });
        }

        *inner
            .waits
            .entry(dependent.to_string())
            .or_default()
            .entry(dependency.to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    /// Drop every wait edge out of `dependent`
    pub(crate) fn clear_waits(&self, dependent: &str) {
        self.inner.lock().waits.remove(dependent);
    }

    #[cfg(test)]
    pub(crate) fn has_waits(&self) -> bool {
        !self.inner.lock().waits.is_empty()
    }

    /// Remove one wait edge added by [`begin_wait`](Self::begin_wait)
    pub(crate) fn end_wait(&self, dependent: &str, dependency: &str) {
        let mut inner = self.inner.lock();
        let Some(edges) = inner.waits.get_mut(dependent) else {
            return;
        };
        if let Some(count) = edges.get_mut(dependency) {
            *count -= 1;
            if *count == 0 {
                edges.remove(dependency);
            }
        }
        if edges.is_empty() {
            inner.waits.remove(dependent);
        }
    }

    /// Current state of a module, if known
    pub fn state(&self, name: &str) -> Option<ModuleState> {
        self.inner.lock().records.get(name).map(|r| r.state)
    }

    /// Cached exports of a ready module
    pub fn exports(&self, name: &str) -> Option<V> {
        self.inner
            .lock()
            .records
            .get(name)
            .and_then(|r| r.exports.clone())
    }

    /// Cached error of a failed module
    pub fn error(&self, name: &str) -> Option<LoaderError> {
        self.inner
            .lock()
            .records
            .get(name)
            .and_then(|r| r.error.clone())
    }

    /// Declared dependencies, once known
    pub fn dependencies(&self, name: &str) -> Option<Vec<String>> {
        self.inner
            .lock()
            .records
            .get(name)
            .map(|r| r.info().dependencies)
    }

    /// Whether a record exists for `name`
    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().records.contains_key(name)
    }

    /// All known module names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().records.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of known modules
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    /// Point-in-time view of every record, sorted by name
    pub fn snapshot(&self) -> Vec<ModuleInfo> {
        let inner = self.inner.lock();
        let mut infos: Vec<ModuleInfo> = inner.records.values().map(ModuleRecord::info).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

impl<V: Clone> RegistryInner<V> {
    fn record_mut(&mut self, name: &str) -> &mut ModuleRecord<V> {
        self.records.entry(name.to_string()).or_insert_with(|| {
            debug!(module = name, "created module record");
            ModuleRecord::new(name)
        })
    }

    /// Shortest wait-for path `from -> ... -> to`, inclusive of both ends
    fn wait_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if from == to {
            return Some(vec![from.to_string()]);
        }

        let mut parents: HashMap<&str, &str> = HashMap::new();
        let mut queue = VecDeque::from([from]);

        while let Some(current) = queue.pop_front() {
            let Some(edges) = self.waits.get(current) else {
                continue;
            };
            for next in edges.keys() {
                let next = next.as_str();
                if next == from || parents.contains_key(next) {
                    continue;
                }
                parents.insert(next, current);
                if next == to {
                    let mut path = vec![to.to_string()];
                    let mut step = to;
                    while let Some(&parent) = parents.get(step) {
                        path.push(parent.to_string());
                        step = parent;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }

        None
    }
}

impl<V: Clone> Default for ModuleRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_waits_drops_edges() {
        let registry: ModuleRegistry<i32> = ModuleRegistry::new();
        registry.begin_wait("a", "b").unwrap();
        registry.begin_wait("a", "c").unwrap();
        assert!(registry.has_waits());

        registry.clear_waits("a");
        assert!(!registry.has_waits());
        // b may now wait on a without a spurious cycle
        registry.begin_wait("b", "a").unwrap();
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let registry: ModuleRegistry<u32> = ModuleRegistry::new();
        assert_eq!(registry.get_or_create("a"), ModuleState::Unstarted);
        assert_eq!(registry.get_or_create("a"), ModuleState::Unstarted);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_only_first_acquire_starts() {
        let registry: ModuleRegistry<u32> = ModuleRegistry::new();
        registry.define("a", ModuleDefinition::value(1)).unwrap();

        assert!(matches!(
            registry.acquire("a"),
            Acquire::Start { definition: Some(_), .. }
        ));
        assert!(matches!(registry.acquire("a"), Acquire::Wait(_)));
        assert_eq!(registry.state("a"), Some(ModuleState::Loading));

        registry.mark_ready("a", 1).unwrap();
        assert!(matches!(registry.acquire("a"), Acquire::Ready(1)));
    }

    #[test]
    fn test_define_after_start_is_duplicate() {
        let registry: ModuleRegistry<u32> = ModuleRegistry::new();
        registry.define("a", ModuleDefinition::value(1)).unwrap();
        registry.define("a", ModuleDefinition::value(2)).unwrap();
        let _ = registry.acquire("a");

        assert_eq!(
            registry.define("a", ModuleDefinition::value(3)).unwrap_err(),
            LoaderError::DuplicateDefinition("a".into())
        );
    }

    #[test]
    fn test_mark_requires_loading() {
        let registry: ModuleRegistry<u32> = ModuleRegistry::new();
        registry.get_or_create("a");
        assert!(matches!(
            registry.mark_ready("a", 1),
            Err(LoaderError::InvalidTransition { .. })
        ));
        assert!(registry.mark_failed("missing", LoaderError::not_found("x")).is_err());
    }

    #[test]
    fn test_failed_is_cached() {
        let registry: ModuleRegistry<u32> = ModuleRegistry::new();
        let _ = registry.acquire("a");
        registry
            .mark_failed("a", LoaderError::not_found("a"))
            .unwrap();

        match registry.acquire("a") {
            Acquire::Failed(err) => assert_eq!(err, LoaderError::not_found("a")),
            _ => panic!("expected cached failure"),
        }
        assert_eq!(registry.error("a"), Some(LoaderError::not_found("a")));
    }

    #[test]
    fn test_begin_wait_detects_cycle() {
        let registry: ModuleRegistry<u32> = ModuleRegistry::new();
        registry.begin_wait("a", "b").unwrap();
        registry.begin_wait("b", "c").unwrap();

        let err = registry.begin_wait("c", "a").unwrap_err();
        assert_eq!(
            err,
            LoaderError::CircularDependency {
                cycle: vec!["a".into(), "b".into(), "c".into(), "a".into()],
            }
        );

        registry.end_wait("b", "c");
        registry.begin_wait("c", "a").unwrap();
    }

    #[test]
    fn test_self_wait_is_cycle() {
        let registry: ModuleRegistry<u32> = ModuleRegistry::new();
        let err = registry.begin_wait("a", "a").unwrap_err();
        assert_eq!(
            err,
            LoaderError::CircularDependency {
                cycle: vec!["a".into(), "a".into()],
            }
        );
    }
}
