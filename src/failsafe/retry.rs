//! Retry logic with exponential backoff and full jitter

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::Result;
use crate::config::RetryConfig;

/// Retry policy: how many attempts and how long to back off between them.
///
/// Which outcomes are worth retrying is decided by
/// [`Error::is_retryable`](crate::Error::is_retryable).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Whether retries are enabled
    pub enabled: bool,
    /// Maximum retries after the initial attempt
    pub max_retries: u32,
    /// Base delay before the first retry
    pub initial_delay: Duration,
    /// Cap on the computed delay, applied before jitter
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Create from config
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_retries: config.max_retries,
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
        }
    }

    /// Backoff delay before the retry that follows `attempt` (1-based).
    ///
    /// `min(max_delay, initial_delay * 2^(attempt-1))`, scaled by a jitter
    /// factor drawn uniformly from [0.5, 1.5) so concurrent callers do not
    /// retry in lockstep.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let exponential = self.initial_delay.as_secs_f64() * 2f64.powi(exponent);
        let capped = exponential.min(self.max_delay.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(capped * jitter)
    }
}

/// Execute a future with retry logic.
///
/// Retryable failures are absorbed until the policy's budget is spent; the
/// last error surfaces once `max_retries` retries have run. A non-retryable
/// error returns after a single invocation. The backoff wait is a
/// non-blocking suspension.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if !policy.enabled {
        return f().await;
    }

    let mut attempt = 1u32;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err);
                }

                if attempt > policy.max_retries {
                    debug!(
                        operation,
                        attempts = attempt,
                        "retry budget exhausted"
                    );
                    return Err(err);
                }

                let delay = policy.backoff_delay(attempt);
                debug!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "retrying after backoff"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
