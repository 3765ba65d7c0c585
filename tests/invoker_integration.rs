//! End-to-end tests for the fetch orchestration

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use fetchguard::Error;
use fetchguard::cache::{InMemoryCacheStrategy, NoCacheStrategy};
use fetchguard::config::{
    CacheConfig, CircuitBreakerConfig, FallbackConfig, RateLimiterConfig, ResilienceConfig,
    RetryConfig,
};
use fetchguard::fallback::{
    CachedValueFallback, CompositeFallbackStrategy, FallbackStrategy, StaticValueFallback,
};
use fetchguard::invoker::ResilientInvoker;

/// Config with fast timings and generous limits; tests tighten what they
/// exercise.
fn base_config() -> ResilienceConfig {
    ResilienceConfig {
        rate_limit: RateLimiterConfig {
            enabled: true,
            capacity: 100,
            window: Duration::from_secs(1),
        },
        circuit_breaker: CircuitBreakerConfig {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 1,
            reset_timeout: Duration::from_millis(50),
        },
        retry: RetryConfig {
            enabled: true,
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        cache: CacheConfig {
            enabled: true,
            ttl: Duration::from_secs(60),
        },
        fallback: FallbackConfig {
            enable_fallback: true,
            fallback_timeout: Duration::from_millis(100),
        },
    }
}

fn invoker_with(
    config: &ResilienceConfig,
    fallback: Option<Arc<dyn FallbackStrategy<i32>>>,
) -> ResilientInvoker<i32> {
    ResilientInvoker::new("test-api", config, Arc::new(InMemoryCacheStrategy::new()), fallback)
}

#[tokio::test]
async fn fresh_cache_hit_makes_zero_network_calls() {
    let invoker = invoker_with(&base_config(), None);
    let calls = Arc::new(AtomicU32::new(0));

    let fetch = |expected: i32| {
        let calls = calls.clone();
        let invoker = &invoker;
        async move {
            let got = invoker
                .fetch(Some("users"), false, move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(11)
                    }
                })
                .await
                .unwrap();
            assert_eq!(got, expected);
        }
    };

    fetch(11).await; // miss, network populates the cache
    fetch(11).await; // fresh hit, no network
    fetch(11).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = invoker.stats();
    assert_eq!(stats.cache_hits, 2);
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.network_successes, 1);
}

#[tokio::test]
async fn force_refresh_bypasses_cache_and_overwrites() {
    let invoker = invoker_with(&base_config(), None);
    let calls = Arc::new(AtomicU32::new(0));

    let network = |value: i32| {
        let calls = calls.clone();
        move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            }
        }
    };

    assert_eq!(invoker.fetch(Some("users"), false, network(1)).await.unwrap(), 1);
    // Cache holds 1, but force_refresh still reaches the network.
    assert_eq!(invoker.fetch(Some("users"), true, network(2)).await.unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // The refreshed value overwrote the cached one.
    assert_eq!(invoker.fetch(Some("users"), false, network(3)).await.unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retryable_failures_absorbed_until_success() {
    let invoker = invoker_with(&base_config(), None);
    let calls = Arc::new(AtomicU32::new(0));

    let result = invoker
        .fetch(None, false, {
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::Timeout("slow upstream".into()))
                    } else {
                        Ok(5)
                    }
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), 5);
    // Initial attempt plus two retries, the last of which succeeded.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn non_retryable_failure_is_invoked_once() {
    let mut config = base_config();
    config.fallback.enable_fallback = false;
    let invoker = invoker_with(&config, None);
    let calls = Arc::new(AtomicU32::new(0));

    let result = invoker
        .fetch(None, false, {
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>(Error::Http {
                        status: 404,
                        message: "not found".into(),
                    })
                }
            }
        })
        .await;

    assert!(matches!(result, Err(Error::Http { status: 404, .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rate_limit_denial_fails_fast_without_network() {
    let mut config = base_config();
    config.rate_limit.capacity = 1;
    let invoker = invoker_with(&config, None);
    let calls = Arc::new(AtomicU32::new(0));

    let network = || {
        let calls = calls.clone();
        move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }
        }
    };

    assert!(invoker.fetch(None, false, network()).await.is_ok());

    let denied = invoker.fetch(None, false, network()).await;
    match denied {
        Err(Error::RateLimited { retry_after }) => {
            assert!(retry_after <= Duration::from_secs(1));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(invoker.stats().rate_limited, 1);
}

#[tokio::test]
async fn circuit_open_surfaces_typed_error() {
    let mut config = base_config();
    config.circuit_breaker.failure_threshold = 1;
    config.retry.enabled = false;
    config.fallback.enable_fallback = false;
    let invoker = invoker_with(&config, None);
    let calls = Arc::new(AtomicU32::new(0));

    let network = || {
        let calls = calls.clone();
        move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(Error::Http {
                    status: 503,
                    message: "unavailable".into(),
                })
            }
        }
    };

    // First failure trips the breaker (threshold 1).
    assert!(invoker.fetch(None, false, network()).await.is_err());

    // Second call never reaches the network.
    let result = invoker.fetch(None, false, network()).await;
    assert!(matches!(result, Err(Error::CircuitOpen)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(invoker.stats().circuit_rejections, 1);
}

#[tokio::test]
async fn static_fallback_answers_when_network_fails() {
    let invoker = invoker_with(&base_config(), Some(Arc::new(StaticValueFallback::new(99))));

    let result = invoker
        .fetch(None, false, || async {
            Err::<i32, _>(Error::Connection("dns failure".into()))
        })
        .await;

    assert_eq!(result.unwrap(), 99);
    assert_eq!(invoker.stats().fallbacks_served, 1);
}

#[tokio::test]
async fn disabled_fallback_returns_original_failure() {
    let mut config = base_config();
    config.fallback.enable_fallback = false;
    config.retry.enabled = false;
    let invoker = invoker_with(&config, Some(Arc::new(StaticValueFallback::new(99))));

    let result = invoker
        .fetch(None, false, || async {
            Err::<i32, _>(Error::Connection("dns failure".into()))
        })
        .await;

    assert!(matches!(result, Err(Error::Connection(_))));
}

#[tokio::test]
async fn composite_fallback_prefers_lowest_priority_number() {
    let composite = CompositeFallbackStrategy::new(vec![
        Arc::new(StaticValueFallback::with_priority(10, 10)) as _,
        Arc::new(StaticValueFallback::with_priority(1, 1)) as _,
    ]);
    let invoker = invoker_with(&base_config(), Some(Arc::new(composite)));

    let result = invoker
        .fetch(None, false, || async {
            Err::<i32, _>(Error::Timeout("slow upstream".into()))
        })
        .await;

    assert_eq!(result.unwrap(), 1);
}

#[tokio::test]
async fn cached_value_fallback_serves_last_good_response() {
    let cache: Arc<InMemoryCacheStrategy<i32>> = Arc::new(InMemoryCacheStrategy::new());
    let fallback = CachedValueFallback::new(cache.clone() as _, "users");
    let config = base_config();
    let invoker: ResilientInvoker<i32> = ResilientInvoker::new(
        "test-api",
        &config,
        cache.clone() as _,
        Some(Arc::new(fallback)),
    );

    // Populate the cache through a successful fetch.
    assert_eq!(
        invoker.fetch(Some("users"), false, || async { Ok(7) }).await.unwrap(),
        7
    );

    // Remote down; force_refresh skips the fresh entry, the network fails,
    // and the fallback serves the last good response from the cache.
    let result = invoker
        .fetch(Some("users"), true, || async {
            Err::<i32, _>(Error::Http {
                status: 500,
                message: "boom".into(),
            })
        })
        .await;

    assert_eq!(result.unwrap(), 7);
}

#[tokio::test]
async fn failures_never_mutate_the_cache() {
    let invoker = invoker_with(&base_config(), Some(Arc::new(StaticValueFallback::new(99))));

    assert_eq!(
        invoker.fetch(Some("users"), false, || async { Ok(1) }).await.unwrap(),
        1
    );

    // Failed refresh answered by fallback; the cache keeps the old value.
    let result = invoker
        .fetch(Some("users"), true, || async {
            Err::<i32, _>(Error::Timeout("slow upstream".into()))
        })
        .await;
    assert_eq!(result.unwrap(), 99);

    let calls = Arc::new(AtomicU32::new(0));
    let cached = invoker
        .fetch(Some("users"), false, {
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(2)
                }
            }
        })
        .await;
    assert_eq!(cached.unwrap(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cache_override_replaces_strategy_read() {
    let invoker = invoker_with(&base_config(), None);
    let calls = Arc::new(AtomicU32::new(0));

    // Override produces a value: no network call.
    let got = invoker
        .fetch_with_cache_override(
            Some("users"),
            false,
            {
                let calls = calls.clone();
                move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(1)
                    }
                }
            },
            || async { Some(42) },
        )
        .await;
    assert_eq!(got.unwrap(), 42);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Override misses: the network runs and writes through to the strategy.
    let got = invoker
        .fetch_with_cache_override(
            Some("users"),
            false,
            {
                let calls = calls.clone();
                move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(1)
                    }
                }
            },
            || async { None },
        )
        .await;
    assert_eq!(got.unwrap(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The write-through landed in the configured strategy.
    assert_eq!(
        invoker.fetch(Some("users"), false, || async { Ok(3) }).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn no_cache_strategy_always_fetches() {
    let config = base_config();
    let invoker: ResilientInvoker<i32> =
        ResilientInvoker::new("uncached-api", &config, Arc::new(NoCacheStrategy), None);
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
        let got = invoker
            .fetch(Some("users"), false, {
                let calls = calls.clone();
                move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(8)
                    }
                }
            })
            .await;
        assert_eq!(got.unwrap(), 8);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn clear_cache_forces_next_fetch_to_network() {
    let invoker = invoker_with(&base_config(), None);
    let calls = Arc::new(AtomicU32::new(0));

    let network = || {
        let calls = calls.clone();
        move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(4)
            }
        }
    };

    invoker.fetch(Some("users"), false, network()).await.unwrap();
    invoker.fetch(Some("users"), false, network()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    invoker.clear_cache();
    invoker.fetch(Some("users"), false, network()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
