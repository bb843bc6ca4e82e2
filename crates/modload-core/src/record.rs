// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module records and definitions

use crate::error::{LoaderError, Result};
use std::fmt;
use tokio::sync::oneshot;

/// Factory producing a module's exports from its dependencies' exports.
///
/// Arguments arrive in the order the dependencies were declared.
pub type Factory<V> = Box<dyn FnOnce(Vec<V>) -> anyhow::Result<V> + Send>;

/// Lifecycle state of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    /// Known by name, loading has not begun
    Unstarted,
    /// Definition fetch or dependency resolution in flight
    Loading,
    /// Factory ran, exports are cached
    Ready,
    /// Load failed, error is cached
    Failed,
}

impl ModuleState {
    /// Ready and Failed are terminal
    pub fn is_terminal(self) -> bool {
        matches!(self, ModuleState::Ready | ModuleState::Failed)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleState::Unstarted => "unstarted",
            ModuleState::Loading => "loading",
            ModuleState::Ready => "ready",
            ModuleState::Failed => "failed",
        };
        f.pad(s)
    }
}

/// A module's declared dependencies and its factory
pub struct ModuleDefinition<V> {
    /// Dependency names, in factory argument order
    pub dependencies: Vec<String>,
    /// Produces the module's exports
    pub factory: Factory<V>,
}

impl<V> ModuleDefinition<V> {
    /// Create a definition from a dependency list and a factory closure
    pub fn new<I, S, F>(dependencies: I, factory: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(Vec<V>) -> anyhow::Result<V> + Send + 'static,
    {
        Self {
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            factory: Box::new(factory),
        }
    }

    /// A module without dependencies that exports a fixed value
    pub fn value(exports: V) -> Self
    where
        V: Send + 'static,
    {
        Self {
            dependencies: Vec::new(),
            factory: Box::new(move |_| Ok(exports)),
        }
    }
}

impl<V> fmt::Debug for ModuleDefinition<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDefinition")
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Continuation attached to a record, fired once on a terminal transition
pub(crate) type Waiter<V> = oneshot::Sender<Result<V>>;

/// One named module's loading lifecycle
pub(crate) struct ModuleRecord<V> {
    /// Unique module name
    pub(crate) name: String,
    /// Current lifecycle state
    pub(crate) state: ModuleState,
    /// Definition registered by `define`, taken when loading starts
    pub(crate) definition: Option<ModuleDefinition<V>>,
    /// Declared dependencies, known once loading has the definition
    pub(crate) dependencies: Vec<String>,
    /// Cached exports, set only on entry to `Ready`
    pub(crate) exports: Option<V>,
    /// Pending continuations
    pub(crate) waiters: Vec<Waiter<V>>,
    /// Cached failure, set only on entry to `Failed`
    pub(crate) error: Option<LoaderError>,
}

impl<V: Clone> ModuleRecord<V> {
    /// Create an unstarted record
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ModuleState::Unstarted,
            definition: None,
            dependencies: Vec::new(),
            exports: None,
            waiters: Vec::new(),
            error: None,
        }
    }

    /// Move into a terminal state and fire every waiter exactly once
    pub(crate) fn settle(&mut self, outcome: Result<V>) -> Result<()> {
        if self.state != ModuleState::Loading {
            return Err(LoaderError::InvalidTransition {
                module: self.name.clone(),
                state: self.state,
            });
        }

        match &outcome {
            Ok(exports) => {
                self.state = ModuleState::Ready;
                self.exports = Some(exports.clone());
            }
            Err(err) => {
                self.state = ModuleState::Failed;
                self.error = Some(err.clone());
            }
        }

        for waiter in self.waiters.drain(..) {
            // A dropped receiver means that requester stopped listening
            let _ = waiter.send(outcome.clone());
        }
        Ok(())
    }
}

/// Point-in-time view of a record, for introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Module name
    pub name: String,
    /// Lifecycle state
    pub state: ModuleState,
    /// Declared dependencies (empty until loading has the definition)
    pub dependencies: Vec<String>,
    /// Whether a `define`d definition is waiting to be loaded
    pub defined: bool,
    /// Rendered failure, if any
    pub error: Option<String>,
}

impl<V> ModuleRecord<V> {
    /// Point-in-time view of this record
    pub(crate) fn info(&self) -> ModuleInfo {
        let dependencies = match &self.definition {
            Some(def) if self.dependencies.is_empty() => def.dependencies.clone(),
            _ => self.dependencies.clone(),
        };
        ModuleInfo {
            name: self.name.clone(),
            state: self.state,
            dependencies,
            defined: self.definition.is_some(),
            error: self.error.as_ref().map(ToString::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_drains_waiters_once() {
        let mut record: ModuleRecord<u32> = ModuleRecord::new("a");
        record.state = ModuleState::Loading;

        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        record.waiters.push(tx1);
        record.waiters.push(tx2);

        record.settle(Ok(7)).unwrap();
        assert_eq!(record.state, ModuleState::Ready);
        assert_eq!(record.exports, Some(7));
        assert!(record.waiters.is_empty());
        assert_eq!(rx1.try_recv().unwrap(), Ok(7));
        assert_eq!(rx2.try_recv().unwrap(), Ok(7));

        // Terminal states never transition again
        let err = record.settle(Ok(8)).unwrap_err();
        assert!(matches!(err, LoaderError::InvalidTransition { state: ModuleState::Ready, .. }));
        assert_eq!(record.exports, Some(7));
    }

    #[test]
    fn test_settle_requires_loading() {
        let mut record: ModuleRecord<u32> = ModuleRecord::new("a");
        assert!(record.settle(Err(LoaderError::not_found("a"))).is_err());
        assert_eq!(record.state, ModuleState::Unstarted);
    }

    #[test]
    fn test_settle_fails_every_waiter() {
        let mut record: ModuleRecord<u32> = ModuleRecord::new("a");
        record.state = ModuleState::Loading;

        let receivers: Vec<_> = (0..3)
            .map(|_| {
                let (tx, rx) = oneshot::channel();
                record.waiters.push(tx);
                rx
            })
            .collect();

        record.settle(Err(LoaderError::not_found("a"))).unwrap();
        assert_eq!(record.state, ModuleState::Failed);
        assert_eq!(record.info().error, Some(LoaderError::not_found("a").to_string()));
        for mut rx in receivers {
            assert_eq!(rx.try_recv().unwrap(), Err(LoaderError::not_found("a")));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(ModuleState::Ready.is_terminal());
        assert!(ModuleState::Failed.is_terminal());
        assert!(!ModuleState::Loading.is_terminal());
        assert!(!ModuleState::Unstarted.is_terminal());
    }
}
