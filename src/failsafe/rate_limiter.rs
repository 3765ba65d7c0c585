//! Token bucket rate limiting

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use crate::config::RateLimiterConfig;

/// Outcome of an admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A token was consumed; the request may proceed
    Granted,
    /// Bucket empty; retry after the suggested wait
    Denied {
        /// Estimated time until one whole token accrues
        retry_after: Duration,
    },
}

impl Admission {
    /// Whether the request was admitted
    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }

    /// Suggested wait for a denied request
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Granted => None,
            Self::Denied { retry_after } => Some(*retry_after),
        }
    }
}

/// Token bucket state, mutated only under the limiter's mutex
struct Bucket {
    /// Fractional tokens currently available, within [0, capacity]
    available: f64,
    /// Last time the bucket was refilled
    last_refill: Instant,
}

/// Thread-safe token bucket limiter.
///
/// The bucket starts full (full burst allowed immediately) and refills at
/// `capacity / window` tokens per second. Each admitted request consumes
/// one token.
pub struct TokenBucketLimiter {
    enabled: bool,
    capacity: u32,
    window: Duration,
    bucket: Mutex<Bucket>,
}

impl TokenBucketLimiter {
    /// Create a limiter from configuration
    #[must_use]
    pub fn new(config: &RateLimiterConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            enabled: config.enabled,
            capacity,
            window: config.window.max(Duration::from_millis(1)),
            bucket: Mutex::new(Bucket {
                available: f64::from(capacity),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Limiter allowing `n` requests per second
    #[must_use]
    pub fn per_second(n: u32) -> Self {
        Self::custom(n, Duration::from_secs(1))
    }

    /// Limiter allowing `n` requests per minute
    #[must_use]
    pub fn per_minute(n: u32) -> Self {
        Self::custom(n, Duration::from_secs(60))
    }

    /// Limiter allowing `capacity` requests per custom window
    #[must_use]
    pub fn custom(capacity: u32, window: Duration) -> Self {
        Self::new(&RateLimiterConfig {
            enabled: true,
            capacity,
            window,
        })
    }

    /// Try to consume one token.
    ///
    /// Refills the bucket from elapsed time first, then either consumes a
    /// token or reports how long until one accrues.
    pub fn try_acquire(&self) -> Admission {
        if !self.enabled {
            return Admission::Granted;
        }

        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);

        if bucket.available >= 1.0 {
            bucket.available -= 1.0;
            trace!(available = bucket.available, "rate limit token consumed");
            Admission::Granted
        } else {
            let retry_after = self.wait_for_tokens(&bucket, 1.0);
            trace!(
                retry_after_ms = retry_after.as_millis(),
                "rate limit denied"
            );
            Admission::Denied { retry_after }
        }
    }

    /// Number of whole tokens currently available, without consuming one
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn available_tokens(&self) -> u32 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        bucket.available.floor() as u32
    }

    /// Time until the next whole token is available (zero if one already is)
    pub fn time_to_next_token(&self) -> Duration {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);

        if bucket.available >= 1.0 {
            Duration::ZERO
        } else {
            self.wait_for_tokens(&bucket, 1.0)
        }
    }

    /// Restore a full bucket
    pub fn reset(&self) {
        let mut bucket = self.bucket.lock();
        bucket.available = f64::from(self.capacity);
        bucket.last_refill = Instant::now();
    }

    /// Configured (capacity, window)
    #[must_use]
    pub fn config(&self) -> (u32, Duration) {
        (self.capacity, self.window)
    }

    /// Add tokens accrued since the last refill, capped at capacity
    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill);
        if elapsed.is_zero() {
            return;
        }

        let accrued = elapsed.as_secs_f64() * self.refill_per_second();
        bucket.available = (bucket.available + accrued)
            .clamp(0.0, f64::from(self.capacity));
        bucket.last_refill = now;
    }

    /// Estimated wait until `needed` tokens are available
    fn wait_for_tokens(&self, bucket: &Bucket, needed: f64) -> Duration {
        let deficit = (needed - bucket.available).max(0.0);
        Duration::from_secs_f64(deficit / self.refill_per_second())
    }

    fn refill_per_second(&self) -> f64 {
        f64::from(self.capacity) / self.window.as_secs_f64()
    }
}

/// Several limiters enforced together with AND semantics.
///
/// A request is admitted only when every level grants it. Levels that
/// granted before a later level denied keep their consumed token; the
/// composition does not roll back partial consumption.
pub struct MultiLevelLimiter {
    levels: Vec<TokenBucketLimiter>,
}

impl MultiLevelLimiter {
    /// Compose limiters; all must grant for a request to be admitted
    #[must_use]
    pub fn new(levels: Vec<TokenBucketLimiter>) -> Self {
        Self { levels }
    }

    /// Common two-level setup: per-second and per-minute caps
    #[must_use]
    pub fn standard(per_second: u32, per_minute: u32) -> Self {
        Self::new(vec![
            TokenBucketLimiter::per_second(per_second),
            TokenBucketLimiter::per_minute(per_minute),
        ])
    }

    /// Try to acquire a token from every level.
    ///
    /// Every level is consulted even after a denial so each bucket's refill
    /// clock stays current; the reported wait is the maximum across denying
    /// levels.
    pub fn try_acquire(&self) -> Admission {
        let mut max_wait: Option<Duration> = None;

        for level in &self.levels {
            if let Admission::Denied { retry_after } = level.try_acquire() {
                max_wait = Some(max_wait.map_or(retry_after, |w| w.max(retry_after)));
            }
        }

        match max_wait {
            None => Admission::Granted,
            Some(retry_after) => Admission::Denied { retry_after },
        }
    }

    /// Available whole tokens per level, in declared order
    pub fn status(&self) -> Vec<u32> {
        self.levels
            .iter()
            .map(TokenBucketLimiter::available_tokens)
            .collect()
    }

    /// Reset every level to a full bucket
    pub fn reset(&self) {
        for level in &self.levels {
            level.reset();
        }
    }
}
