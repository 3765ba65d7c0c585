//! Per-invoker observability counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for one invoker's traffic, tracked atomically
#[derive(Debug, Default)]
pub struct InvokerStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    network_successes: AtomicU64,
    network_failures: AtomicU64,
    rate_limited: AtomicU64,
    circuit_rejections: AtomicU64,
    fallbacks_served: AtomicU64,
}

impl InvokerStats {
    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_network_success(&self) {
        self.network_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_network_failure(&self) {
        self.network_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_circuit_rejection(&self) {
        self.circuit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback_served(&self) {
        self.fallbacks_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of all counters
    pub fn snapshot(&self) -> InvokerStatsSnapshot {
        InvokerStatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            network_successes: self.network_successes.load(Ordering::Relaxed),
            network_failures: self.network_failures.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            circuit_rejections: self.circuit_rejections.load(Ordering::Relaxed),
            fallbacks_served: self.fallbacks_served.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of an invoker's counters
#[derive(Debug, Clone, Serialize)]
pub struct InvokerStatsSnapshot {
    /// Fetches served from a fresh cache entry
    pub cache_hits: u64,
    /// Cache lookups that found no fresh entry
    pub cache_misses: u64,
    /// Network calls that succeeded (after any retries)
    pub network_successes: u64,
    /// Network calls that failed after retries were exhausted
    pub network_failures: u64,
    /// Fetches rejected by the rate limiter
    pub rate_limited: u64,
    /// Fetches rejected by an open circuit
    pub circuit_rejections: u64,
    /// Fetches answered by a fallback value
    pub fallbacks_served: u64,
}
