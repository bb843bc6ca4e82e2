// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module sources: where definitions come from when nobody called `define`
//!
//! A source is asked at most once per module name for the lifetime of a
//! registry. Sources may fail with [`LoaderError::NotFound`] or with a
//! transport error ([`LoaderError::Source`]); the loader itself never retries,
//! wrap a source in [`RetryingSource`] for that.

pub mod json;

use crate::error::{LoaderError, Result};
use crate::record::ModuleDefinition;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use json::{json_definition, JsonDirSource};

/// What a source is asked to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    /// Module name, the registry key
    pub name: String,
    /// Where to find it, the name unless remapped by `paths`
    pub location: String,
}

impl SourceRequest {
    /// Create a request
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
        }
    }
}

/// Provider of module definitions
#[async_trait]
pub trait ModuleSource<V: Send + 'static>: Send + Sync {
    /// Produce the definition for `request.name`
    async fn fetch(&self, request: &SourceRequest) -> Result<ModuleDefinition<V>>;
}

#[async_trait]
impl<V, S> ModuleSource<V> for Arc<S>
where
    V: Send + 'static,
    S: ModuleSource<V> + ?Sized,
{
    async fn fetch(&self, request: &SourceRequest) -> Result<ModuleDefinition<V>> {
        (**self).fetch(request).await
    }
}

/// A source that knows no modules
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSource;

#[async_trait]
impl<V: Send + 'static> ModuleSource<V> for NoSource {
    async fn fetch(&self, request: &SourceRequest) -> Result<ModuleDefinition<V>> {
        Err(LoaderError::not_found(&request.name))
    }
}

/// A source backed by an async closure
pub struct FnSource<F> {
    fetch: F,
}

impl<F> FnSource<F> {
    /// Wrap a closure `SourceRequest -> Future<Output = Result<ModuleDefinition<V>>>`
    pub fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

#[async_trait]
impl<V, F, Fut> ModuleSource<V> for FnSource<F>
where
    V: Send + 'static,
    F: Fn(SourceRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ModuleDefinition<V>>> + Send,
{
    async fn fetch(&self, request: &SourceRequest) -> Result<ModuleDefinition<V>> {
        (self.fetch)(request.clone()).await
    }
}

/// Tries several sources in order
///
/// `NotFound` falls through to the next source; any other error stops the
/// chain.
pub struct SourceChain<V> {
    sources: Vec<Arc<dyn ModuleSource<V>>>,
}

impl<V: Send + 'static> SourceChain<V> {
    /// Create an empty chain
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Append a source
    pub fn with(mut self, source: impl ModuleSource<V> + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Number of sources in the chain
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if the chain is empty
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl<V: Send + 'static> Default for SourceChain<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V: Send + 'static> ModuleSource<V> for SourceChain<V> {
    async fn fetch(&self, request: &SourceRequest) -> Result<ModuleDefinition<V>> {
        for source in &self.sources {
            match source.fetch(request).await {
                Err(LoaderError::NotFound(_)) => continue,
                other => return other,
            }
        }
        Err(LoaderError::not_found(&request.name))
    }
}

/// Retries transport failures of an inner source
///
/// Only [`LoaderError::Source`] is retried. A missing module or any other
/// error is returned on the first attempt.
pub struct RetryingSource<S> {
    inner: S,
    retries: u32,
    delay: Duration,
}

impl<S> RetryingSource<S> {
    /// Retry up to `retries` extra times, sleeping `delay` between attempts
    pub fn new(inner: S, retries: u32, delay: Duration) -> Self {
        Self {
            inner,
            retries,
            delay,
        }
    }
}

#[async_trait]
impl<V, S> ModuleSource<V> for RetryingSource<S>
where
    V: Send + 'static,
    S: ModuleSource<V>,
{
    async fn fetch(&self, request: &SourceRequest) -> Result<ModuleDefinition<V>> {
        let mut attempt = 0;
        loop {
            match self.inner.fetch(request).await {
                Err(err @ LoaderError::Source { .. }) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        module = %request.name,
                        attempt,
                        error = %err,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                }
                result => {
                    if attempt > 0 {
                        debug!(module = %request.name, attempt, "fetch settled after retries");
                    }
                    return result;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn flaky(failures: u32, calls: Arc<AtomicU32>) -> impl ModuleSource<u32> {
        FnSource::new(move |request: SourceRequest| {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    Err(LoaderError::source(&request.name, "connection reset"))
                } else {
                    Ok(ModuleDefinition::value(n))
                }
            }
        })
    }

    #[tokio::test]
    async fn test_no_source_is_not_found() {
        let err = ModuleSource::<u32>::fetch(&NoSource, &SourceRequest::new("a", "a"))
            .await
            .unwrap_err();
        assert_eq!(err, LoaderError::not_found("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transport_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let source = RetryingSource::new(flaky(2, calls.clone()), 3, Duration::from_millis(10));

        let def = source.fetch(&SourceRequest::new("a", "a")).await.unwrap();
        assert_eq!((def.factory)(vec![]).unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up() {
        let calls = Arc::new(AtomicU32::new(0));
        let source = RetryingSource::new(flaky(10, calls.clone()), 2, Duration::from_millis(10));

        let err = source.fetch(&SourceRequest::new("a", "a")).await.unwrap_err();
        assert!(matches!(err, LoaderError::Source { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_skips_not_found() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let source = RetryingSource::new(
            FnSource::new(move |request: SourceRequest| {
                counted.fetch_add(1, Ordering::SeqCst);
                async move { Err::<ModuleDefinition<u32>, _>(LoaderError::not_found(request.name)) }
            }),
            5,
            Duration::from_millis(10),
        );

        let err = source.fetch(&SourceRequest::new("a", "a")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_chain_falls_through_not_found() {
        let chain = SourceChain::new()
            .with(NoSource)
            .with(FnSource::new(|_request: SourceRequest| async {
                Ok(ModuleDefinition::value(42u32))
            }));
        assert_eq!(chain.len(), 2);

        let def = chain.fetch(&SourceRequest::new("a", "a")).await.unwrap();
        assert_eq!((def.factory)(vec![]).unwrap(), 42);
    }

    #[tokio::test]
    async fn test_chain_stops_on_other_errors() {
        let chain = SourceChain::new()
            .with(FnSource::new(|request: SourceRequest| async move {
                Err::<ModuleDefinition<u32>, _>(LoaderError::source(request.name, "boom"))
            }))
            .with(FnSource::new(|_request: SourceRequest| async {
                Ok(ModuleDefinition::value(1u32))
            }));

        let err = chain.fetch(&SourceRequest::new("a", "a")).await.unwrap_err();
        assert!(matches!(err, LoaderError::Source { .. }));
    }
}
