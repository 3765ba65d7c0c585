//! Circuit breaker implementation

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::Error;
use crate::config::CircuitBreakerConfig;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed (calls flow through)
    Closed,
    /// Circuit is open (calls rejected without reaching the remote)
    Open,
    /// Circuit is half-open (trial calls allowed to probe recovery)
    HalfOpen,
}

/// Outcome of one guarded invocation; exactly one variant per call
#[derive(Debug)]
pub enum CircuitBreakerResult<T> {
    /// The wrapped call succeeded
    Success(T),
    /// The wrapped call ran and failed
    Failure(Error),
    /// The circuit was open; the wrapped call was never invoked
    CircuitOpen,
}

impl<T> CircuitBreakerResult<T> {
    /// Collapse into a `Result`, mapping the open circuit to a typed error
    pub fn into_result(self) -> crate::Result<T> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(err) => Err(err),
            Self::CircuitOpen => Err(Error::CircuitOpen),
        }
    }
}

/// State and counters, mutated together so every transition is atomic
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    trial_successes: u32,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
}

/// Circuit breaker guarding one downstream dependency.
///
/// Failures here are infrastructure faults as judged by
/// [`Error::is_breaker_failure`]; errors the remote will keep returning for
/// the same request (validation, plain 4xx) pass through without touching
/// the counters.
pub struct CircuitBreaker {
    name: String,
    enabled: bool,
    failure_threshold: u32,
    success_threshold: u32,
    reset_timeout: Duration,
    inner: RwLock<Inner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(name: &str, config: &CircuitBreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            enabled: config.enabled,
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            reset_timeout: config.reset_timeout,
            inner: RwLock::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                trial_successes: 0,
                last_failure: None,
                opened_at: None,
            }),
        }
    }

    /// Run `call` under the breaker.
    ///
    /// When the circuit is open and the reset timeout has not elapsed, the
    /// call is never invoked and `CircuitOpen` is returned. The open→half-open
    /// transition is evaluated lazily here. The state lock is never held
    /// across the awaited call; admission and outcome recording are each one
    /// atomic critical section, so cancelling the caller mid-call leaves no
    /// half-updated counters.
    pub async fn execute<T, F, Fut>(&self, call: F) -> CircuitBreakerResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        if !self.enabled {
            return match call().await {
                Ok(value) => CircuitBreakerResult::Success(value),
                Err(err) => CircuitBreakerResult::Failure(err),
            };
        }

        if !self.try_admit() {
            debug!(breaker = %self.name, "circuit open, rejecting call");
            return CircuitBreakerResult::CircuitOpen;
        }

        match call().await {
            Ok(value) => {
                self.on_success();
                CircuitBreakerResult::Success(value)
            }
            Err(err) => {
                if err.is_breaker_failure() {
                    self.on_failure();
                }
                CircuitBreakerResult::Failure(err)
            }
        }
    }

    /// Current state (consistent snapshot)
    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    /// Consecutive failures recorded in the closed state
    pub fn failure_count(&self) -> u32 {
        self.inner.read().consecutive_failures
    }

    /// When the most recent counted failure happened
    pub fn last_failure(&self) -> Option<Instant> {
        self.inner.read().last_failure
    }

    /// Force the breaker closed with counters cleared
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        Self::close(&mut inner);
        debug!(breaker = %self.name, "circuit breaker reset");
    }

    /// Decide admission, transitioning open→half-open when the timeout elapsed
    fn try_admit(&self) -> bool {
        let mut inner = self.inner.write();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map_or(Duration::MAX, |at| at.elapsed());
                if elapsed >= self.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_successes = 0;
                    debug!(breaker = %self.name, "reset timeout elapsed, half-open");
                    true
                } else {
                    false
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.write();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.trial_successes += 1;
                if inner.trial_successes >= self.success_threshold {
                    Self::close(&mut inner);
                    info!(breaker = %self.name, "circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.write();
        inner.last_failure = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    Self::open(&mut inner);
                    warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                Self::open(&mut inner);
                warn!(breaker = %self.name, "trial call failed, reopening circuit");
            }
            CircuitState::Open => {}
        }
    }

    fn open(inner: &mut Inner) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.trial_successes = 0;
    }

    fn close(inner: &mut Inner) {
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.trial_successes = 0;
        inner.opened_at = None;
    }
}
