//! Fallback resolution for failed remote calls
//!
//! A fallback strategy is a substitute value source consulted only after
//! the primary operation has definitively failed. Strategies are ordered by
//! priority (lower tried first) and the whole lookup is bounded by a
//! timeout so a slow fallback cannot stall error reporting.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::cache::CacheStrategy;
use crate::config::FallbackConfig;
use crate::{Error, Result};

/// Why the fallback path was taken, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The remote call failed after retries were exhausted
    ApiFailure,
    /// The circuit breaker rejected the call
    CircuitOpen,
    /// The remote call timed out
    Timeout,
}

impl From<&Error> for FallbackReason {
    fn from(err: &Error) -> Self {
        match err {
            Error::CircuitOpen => Self::CircuitOpen,
            Error::Timeout(_) => Self::Timeout,
            _ => Self::ApiFailure,
        }
    }
}

/// A substitute value source
#[async_trait]
pub trait FallbackStrategy<T>: Send + Sync {
    /// Produce a substitute value, or `None` when this source has nothing
    async fn fallback(&self) -> Option<T>;

    /// Whether this strategy should be consulted
    fn is_enabled(&self) -> bool {
        true
    }

    /// Ordering within a composite; lower is tried first
    fn priority(&self) -> i32;
}

/// Always serves one fixed value
pub struct StaticValueFallback<T> {
    value: T,
    priority: i32,
}

impl<T> StaticValueFallback<T> {
    /// Fallback serving `value` at priority 1
    #[must_use]
    pub fn new(value: T) -> Self {
        Self { value, priority: 1 }
    }

    /// Fallback serving `value` at an explicit priority
    #[must_use]
    pub fn with_priority(value: T, priority: i32) -> Self {
        Self { value, priority }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> FallbackStrategy<T> for StaticValueFallback<T> {
    async fn fallback(&self) -> Option<T> {
        Some(self.value.clone())
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// Serves the type's empty value (`Default`); a last resort, so it sits at
/// a late priority
pub struct EmptyValueFallback {
    priority: i32,
}

impl EmptyValueFallback {
    /// Empty-value fallback at priority 99
    #[must_use]
    pub fn new() -> Self {
        Self { priority: 99 }
    }

    /// Empty-value fallback at an explicit priority
    #[must_use]
    pub fn with_priority(priority: i32) -> Self {
        Self { priority }
    }
}

impl Default for EmptyValueFallback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Default + Send + Sync> FallbackStrategy<T> for EmptyValueFallback {
    async fn fallback(&self) -> Option<T> {
        Some(T::default())
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// Serves a previously cached value, stale-aware via the cache's own TTL
pub struct CachedValueFallback<T> {
    cache: Arc<dyn CacheStrategy<T>>,
    key: String,
    priority: i32,
}

impl<T> CachedValueFallback<T> {
    /// Fallback reading `key` from `cache` at priority 10
    #[must_use]
    pub fn new(cache: Arc<dyn CacheStrategy<T>>, key: impl Into<String>) -> Self {
        Self {
            cache,
            key: key.into(),
            priority: 10,
        }
    }

    /// Fallback reading `key` from `cache` at an explicit priority
    #[must_use]
    pub fn with_priority(
        cache: Arc<dyn CacheStrategy<T>>,
        key: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            cache,
            key: key.into(),
            priority,
        }
    }
}

#[async_trait]
impl<T: Send + Sync> FallbackStrategy<T> for CachedValueFallback<T> {
    async fn fallback(&self) -> Option<T> {
        self.cache.get(&self.key)
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// Ordered collection of strategies; first non-absent result wins
pub struct CompositeFallbackStrategy<T> {
    strategies: Vec<Arc<dyn FallbackStrategy<T>>>,
}

impl<T> CompositeFallbackStrategy<T> {
    /// Compose `strategies`; they are tried in ascending priority order
    #[must_use]
    pub fn new(strategies: Vec<Arc<dyn FallbackStrategy<T>>>) -> Self {
        Self { strategies }
    }
}

#[async_trait]
impl<T: Send + Sync> FallbackStrategy<T> for CompositeFallbackStrategy<T> {
    async fn fallback(&self) -> Option<T> {
        let mut ordered: Vec<&Arc<dyn FallbackStrategy<T>>> = self.strategies.iter().collect();
        ordered.sort_by_key(|s| s.priority());

        for strategy in ordered {
            if !strategy.is_enabled() {
                continue;
            }
            if let Some(value) = strategy.fallback().await {
                return Some(value);
            }
        }
        None
    }

    fn is_enabled(&self) -> bool {
        self.strategies.iter().any(|s| s.is_enabled())
    }

    fn priority(&self) -> i32 {
        self.strategies
            .iter()
            .map(|s| s.priority())
            .min()
            .unwrap_or(0)
    }
}

/// Runs a primary operation and resolves a substitute value when it fails.
///
/// When fallback is disabled or no strategy is configured, the primary
/// failure is returned unchanged. When a strategy was consulted but
/// produced nothing in time, the failure surfaces as
/// [`Error::FallbackExhausted`] wrapping the original error.
pub struct FallbackManager<T> {
    name: String,
    strategy: Option<Arc<dyn FallbackStrategy<T>>>,
    config: FallbackConfig,
}

impl<T: Send + Sync> FallbackManager<T> {
    /// Create a manager for one collaborator
    #[must_use]
    pub fn new(
        name: &str,
        strategy: Option<Arc<dyn FallbackStrategy<T>>>,
        config: FallbackConfig,
    ) -> Self {
        Self {
            name: name.to_string(),
            strategy,
            config,
        }
    }

    /// Run `primary`, consulting the configured strategy on failure
    pub async fn run<F, Fut>(&self, primary: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match primary().await {
            Ok(value) => Ok(value),
            Err(err) => self.resolve(err).await,
        }
    }

    /// Run `primary` with an explicit fallback closure.
    ///
    /// The closure takes precedence over the configured strategy; its own
    /// failure propagates to the caller.
    pub async fn run_with<F, Fut, G, GFut>(&self, primary: F, fallback: G) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T>>,
    {
        match primary().await {
            Ok(value) => Ok(value),
            Err(err) => {
                if !self.config.enable_fallback {
                    return Err(err);
                }
                let reason = FallbackReason::from(&err);
                let value = fallback().await?;
                info!(
                    collaborator = %self.name,
                    reason = ?reason,
                    "explicit fallback provided data"
                );
                Ok(value)
            }
        }
    }

    /// Resolve a substitute for a failed primary call
    pub async fn resolve(&self, original: Error) -> Result<T> {
        if !self.config.enable_fallback {
            return Err(original);
        }

        let Some(strategy) = &self.strategy else {
            debug!(collaborator = %self.name, "no fallback strategy configured");
            return Err(original);
        };

        if !strategy.is_enabled() {
            return Err(original);
        }

        let reason = FallbackReason::from(&original);
        match timeout(self.config.fallback_timeout, strategy.fallback()).await {
            Ok(Some(value)) => {
                info!(
                    collaborator = %self.name,
                    reason = ?reason,
                    "fallback provided data"
                );
                Ok(value)
            }
            Ok(None) => Err(Error::FallbackExhausted {
                source: Box::new(original),
            }),
            Err(_) => {
                debug!(
                    collaborator = %self.name,
                    timeout_ms = self.config.fallback_timeout.as_millis(),
                    "fallback lookup timed out"
                );
                Err(Error::FallbackExhausted {
                    source: Box::new(original),
                })
            }
        }
    }
}
