//! TTL-based response caching
//!
//! A cache entry is fresh while `now - written_at < ttl`. Stale entries
//! answer as a miss but may stay physically stored until overwritten or
//! swept by [`InMemoryCacheStrategy::evict_expired`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Pluggable cache store keyed by string
pub trait CacheStrategy<T>: Send + Sync {
    /// Get a fresh value, or `None` for missing and stale entries alike
    fn get(&self, key: &str) -> Option<T>;
    /// Store a value under `key` with the given TTL (last write wins)
    fn put(&self, key: &str, value: T, ttl: Duration);
    /// Drop all entries
    fn clear(&self);
}

/// A cached value with TTL metadata
struct CacheEntry<T> {
    value: T,
    written_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self) -> bool {
        self.written_at.elapsed() < self.ttl
    }
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    /// Total fresh reads served
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Total missing-or-stale reads
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Total stale entries physically removed
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Hit rate in [0.0, 1.0]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatsSnapshot {
    /// Total fresh reads served
    pub hits: u64,
    /// Total missing-or-stale reads
    pub misses: u64,
    /// Total stale entries physically removed
    pub evictions: u64,
    /// Current number of physically stored entries (fresh and stale)
    pub size: usize,
    /// Hit rate in [0.0, 1.0]
    pub hit_rate: f64,
}

/// In-memory TTL cache backed by a concurrent map
pub struct InMemoryCacheStrategy<T> {
    entries: DashMap<String, CacheEntry<T>>,
    stats: CacheStats,
}

impl<T> InMemoryCacheStrategy<T> {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Number of physically stored entries, stale ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Statistics snapshot
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits(),
            misses: self.stats.misses(),
            evictions: self.stats.evictions(),
            size: self.entries.len(),
            hit_rate: self.stats.hit_rate(),
        }
    }

    /// Physically remove stale entries (opportunistic maintenance; reads
    /// are already correct without it)
    pub fn evict_expired(&self) {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_fresh())
            .map(|entry| entry.key().clone())
            .collect();

        let count = stale.len();
        for key in stale {
            self.entries.remove(&key);
        }

        if count > 0 {
            self.stats
                .evictions
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }
}

impl<T> Default for InMemoryCacheStrategy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> CacheStrategy<T> for InMemoryCacheStrategy<T> {
    fn get(&self, key: &str) -> Option<T> {
        match self.entries.get(key) {
            Some(entry) if entry.is_fresh() => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn put(&self, key: &str, value: T, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                written_at: Instant::now(),
                ttl,
            },
        );
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

/// Cache strategy that never stores anything.
///
/// For resources where serving a stale response is worse than refetching.
pub struct NoCacheStrategy;

impl<T: Send + Sync> CacheStrategy<T> for NoCacheStrategy {
    fn get(&self, _key: &str) -> Option<T> {
        None
    }

    fn put(&self, _key: &str, _value: T, _ttl: Duration) {}

    fn clear(&self) {}
}

/// Build a cache key as `{resource}:{sha256(params)}`.
///
/// The digest is over the canonical JSON encoding, so logically equal
/// parameter objects produce the same key regardless of insertion order.
#[must_use]
pub fn build_key(resource: &str, params: &Value) -> String {
    let canonical = serde_json::to_string(params).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{resource}:{}", hex::encode(digest))
}
