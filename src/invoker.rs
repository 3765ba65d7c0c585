//! Resilient fetch orchestration
//!
//! [`ResilientInvoker`] composes the admission, fault-handling, caching,
//! and fallback layers around one remote resource. Collaborators hold one
//! invoker per resource type and call [`ResilientInvoker::fetch`] with an
//! opaque async closure that performs the actual remote call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::CacheStrategy;
use crate::config::{CacheConfig, ResilienceConfig};
use crate::failsafe::{
    Admission, CircuitBreaker, CircuitBreakerResult, CircuitState, MultiLevelLimiter, RetryPolicy,
    TokenBucketLimiter, with_retry,
};
use crate::fallback::{FallbackManager, FallbackStrategy};
use crate::stats::{InvokerStats, InvokerStatsSnapshot};
use crate::{Error, Result};

/// Orchestrates rate limiting, circuit breaking, retries, caching, and
/// fallback around a single remote-call closure.
///
/// Call order on the network path: limiter first (a denied call fails
/// immediately, without backoff), then the circuit breaker wrapping the
/// retry loop. A fresh cache hit short-circuits everything. Failures never
/// mutate the cache.
pub struct ResilientInvoker<T> {
    name: String,
    limiter: MultiLevelLimiter,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    cache: Arc<dyn CacheStrategy<T>>,
    cache_enabled: bool,
    cache_ttl: Duration,
    fallback: FallbackManager<T>,
    stats: InvokerStats,
}

impl<T: Clone + Send + Sync + 'static> ResilientInvoker<T> {
    /// Create an invoker from one aggregate config.
    ///
    /// The rate limit config becomes a single-level limiter; use
    /// [`ResilientInvoker::from_parts`] to compose multiple levels.
    #[must_use]
    pub fn new(
        name: &str,
        config: &ResilienceConfig,
        cache: Arc<dyn CacheStrategy<T>>,
        fallback_strategy: Option<Arc<dyn FallbackStrategy<T>>>,
    ) -> Self {
        Self::from_parts(
            name,
            MultiLevelLimiter::new(vec![TokenBucketLimiter::new(&config.rate_limit)]),
            CircuitBreaker::new(name, &config.circuit_breaker),
            RetryPolicy::new(&config.retry),
            cache,
            &config.cache,
            FallbackManager::new(name, fallback_strategy, config.fallback.clone()),
        )
    }

    /// Create an invoker from explicitly constructed parts
    #[must_use]
    pub fn from_parts(
        name: &str,
        limiter: MultiLevelLimiter,
        breaker: CircuitBreaker,
        retry: RetryPolicy,
        cache: Arc<dyn CacheStrategy<T>>,
        cache_config: &CacheConfig,
        fallback: FallbackManager<T>,
    ) -> Self {
        Self {
            name: name.to_string(),
            limiter,
            breaker,
            retry,
            cache,
            cache_enabled: cache_config.enabled,
            cache_ttl: cache_config.ttl,
            fallback,
            stats: InvokerStats::default(),
        }
    }

    /// Fetch a value, preferring a fresh cache entry.
    ///
    /// With `force_refresh` false and a fresh entry under `cache_key`, the
    /// cached value is returned and `from_network` is never invoked. On a
    /// network success the cache is updated under `cache_key`; on failure
    /// the cache is left untouched and the fallback path decides the
    /// outcome.
    pub async fn fetch<F, Fut>(
        &self,
        cache_key: Option<&str>,
        force_refresh: bool,
        from_network: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(key) = cache_key {
            if self.cache_enabled && !force_refresh {
                if let Some(value) = self.cache.get(key) {
                    self.stats.record_cache_hit();
                    debug!(invoker = %self.name, key, "served from cache");
                    return Ok(value);
                }
                self.stats.record_cache_miss();
            }
        }

        self.fetch_from_network(cache_key, from_network).await
    }

    /// Fetch with a custom cache read.
    ///
    /// `from_cache` replaces the strategy lookup for this call only; the
    /// write-through on network success still goes to the configured
    /// strategy under `cache_key`.
    pub async fn fetch_with_cache_override<F, Fut, C, CFut>(
        &self,
        cache_key: Option<&str>,
        force_refresh: bool,
        from_network: F,
        from_cache: C,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: FnOnce() -> CFut,
        CFut: Future<Output = Option<T>>,
    {
        if !force_refresh {
            if let Some(value) = from_cache().await {
                self.stats.record_cache_hit();
                debug!(invoker = %self.name, "served from cache override");
                return Ok(value);
            }
            self.stats.record_cache_miss();
        }

        self.fetch_from_network(cache_key, from_network).await
    }

    /// Collaborator name used in logs
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current circuit breaker state
    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Available tokens per limiter level, in declared order
    pub fn limiter_status(&self) -> Vec<u32> {
        self.limiter.status()
    }

    /// Traffic counters snapshot
    pub fn stats(&self) -> InvokerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Drop all cached entries for this invoker
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    async fn fetch_from_network<F, Fut>(&self, cache_key: Option<&str>, from_network: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        // Admission control happens before the breaker: a denied call is
        // the caller's retry to schedule, not the backoff loop's.
        if let Admission::Denied { retry_after } = self.limiter.try_acquire() {
            self.stats.record_rate_limited();
            warn!(
                invoker = %self.name,
                retry_after_ms = retry_after.as_millis(),
                "rate limit exceeded"
            );
            return Err(Error::RateLimited { retry_after });
        }

        let outcome = self
            .breaker
            .execute(|| with_retry(&self.retry, &self.name, from_network))
            .await;

        match outcome {
            CircuitBreakerResult::Success(value) => {
                self.stats.record_network_success();
                if self.cache_enabled {
                    if let Some(key) = cache_key {
                        self.cache.put(key, value.clone(), self.cache_ttl);
                        debug!(invoker = %self.name, key, "cache updated");
                    }
                }
                Ok(value)
            }
            CircuitBreakerResult::Failure(err) => {
                self.stats.record_network_failure();
                warn!(invoker = %self.name, error = %err, "network call failed");
                self.recover(err).await
            }
            CircuitBreakerResult::CircuitOpen => {
                self.stats.record_circuit_rejection();
                self.recover(Error::CircuitOpen).await
            }
        }
    }

    async fn recover(&self, err: Error) -> Result<T> {
        let result = self.fallback.resolve(err).await;
        if result.is_ok() {
            self.stats.record_fallback_served();
        }
        result
    }
}
