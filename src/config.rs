//! Configuration for the resilience layer
//!
//! These structs define the recognized knobs only; loading and layering
//! (files, environment) belong to the host application.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Combined resilience configuration for one collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct ResilienceConfig {
    /// Rate limiter configuration
    pub rate_limit: RateLimiterConfig,
    /// Circuit breaker configuration
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry configuration
    pub retry: RetryConfig,
    /// Response cache configuration
    pub cache: CacheConfig,
    /// Fallback configuration
    pub fallback: FallbackConfig,
}

/// Token bucket rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Bucket capacity (maximum burst)
    pub capacity: u32,
    /// Window over which `capacity` tokens refill
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 10,
            window: Duration::from_secs(1),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Enable circuit breaker
    pub enabled: bool,
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Half-open trial successes required to close
    pub success_threshold: u32,
    /// Time to wait in open before allowing a trial call
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 1,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries
    pub enabled: bool,
    /// Maximum retries after the initial attempt
    pub max_retries: u32,
    /// Base delay before the first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Cap on the computed backoff delay (before jitter)
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable response caching
    pub enabled: bool,
    /// Time-to-live for cached responses
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(60),
        }
    }
}

/// Fallback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Consult fallback strategies when the primary call fails
    pub enable_fallback: bool,
    /// Bound on the fallback lookup (not on the primary call)
    #[serde(with = "humantime_serde")]
    pub fallback_timeout: Duration,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enable_fallback: true,
            fallback_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ResilienceConfig::default();
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.capacity, 10);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.success_threshold, 1);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_delay, Duration::from_secs(1));
        assert_eq!(config.cache.ttl, Duration::from_secs(60));
        assert!(config.fallback.enable_fallback);
    }

    #[test]
    fn deserializes_with_humantime_durations() {
        let json = r#"{
            "rate_limit": {"capacity": 5, "window": "1s"},
            "circuit_breaker": {"failure_threshold": 3, "reset_timeout": "250ms"},
            "retry": {"max_retries": 2, "initial_delay": "100ms", "max_delay": "2s"},
            "cache": {"ttl": "5m"},
            "fallback": {"fallback_timeout": "500ms"}
        }"#;

        let config: ResilienceConfig = serde_json::from_str(json).expect("parse");
        assert_eq!(config.rate_limit.capacity, 5);
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(
            config.circuit_breaker.reset_timeout,
            Duration::from_millis(250)
        );
        assert_eq!(config.retry.initial_delay, Duration::from_millis(100));
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.fallback.fallback_timeout, Duration::from_millis(500));
        // Unspecified fields fall back to defaults
        assert!(config.rate_limit.enabled);
        assert_eq!(config.circuit_breaker.success_threshold, 1);
    }
}
