// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the module loader

use crate::record::ModuleState;
use thiserror::Error;

/// Result type for module loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Errors that can occur while defining or loading modules.
///
/// Errors are `Clone` because a single failure is delivered to every waiter
/// of the failed module and cached on its record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoaderError {
    /// No module source could produce a definition
    #[error("Cannot find module '{0}'")]
    NotFound(String),

    /// A load path revisited a module that is still loading
    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency {
        /// Module names along the cycle, first and last are the same
        cycle: Vec<String>,
    },

    /// The module's factory returned an error or panicked
    #[error("Factory for module '{module}' failed: {reason}")]
    Factory {
        /// Module name
        module: String,
        /// Rendered factory error
        reason: String,
    },

    /// `define` was called for a module that already started loading
    #[error("Module '{0}' is already defined")]
    DuplicateDefinition(String),

    /// A dependency failed, so the module never ran its factory
    #[error("Module '{module}' failed because dependency '{dependency}' failed")]
    DependencyFailed {
        /// Module name
        module: String,
        /// The dependency that failed first
        dependency: String,
        /// Why the dependency failed
        #[source]
        source: Box<LoaderError>,
    },

    /// The module source failed for a reason other than "not found"
    #[error("Error fetching module '{module}': {reason}")]
    Source {
        /// Module name
        module: String,
        /// Reason for failure
        reason: String,
    },

    /// Internal invariant violation: a lifecycle transition from the wrong state
    #[error("Invalid transition for module '{module}' from state {state:?}")]
    InvalidTransition {
        /// Module name
        module: String,
        /// State the record was in
        state: ModuleState,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LoaderError {
    /// Create a module not found error
    pub fn not_found(module: impl Into<String>) -> Self {
        Self::NotFound(module.into())
    }

    /// Create a factory error from anything displayable
    pub fn factory(module: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Factory {
            module: module.into(),
            reason: format!("{:#}", reason),
        }
    }

    /// Create a source (transport) error
    pub fn source(module: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Source {
            module: module.into(),
            reason: reason.to_string(),
        }
    }

    /// Follow `DependencyFailed` links down to the original failure
    pub fn root_cause(&self) -> &LoaderError {
        let mut current = self;
        while let LoaderError::DependencyFailed { source, .. } = current {
            current = source;
        }
        current
    }

    /// Whether the root cause is a missing module
    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), LoaderError::NotFound(_))
    }

    /// Whether this error is a cycle passing through `module`
    pub(crate) fn is_cycle_through(&self, module: &str) -> bool {
        match self {
            LoaderError::CircularDependency { cycle } => cycle.iter().any(|m| m == module),
            _ => false,
        }
    }
}

impl From<toml::de::Error> for LoaderError {
    fn from(err: toml::de::Error) -> Self {
        LoaderError::Config(err.to_string())
    }
}
