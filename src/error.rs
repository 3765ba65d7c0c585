//! Error types for resilient remote calls

use std::time::Duration;

use thiserror::Error;

/// Result type alias for resilient remote calls
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the resilience layer
#[derive(Error, Debug)]
pub enum Error {
    /// Rate limiter denied admission; retry after the reported wait
    #[error("rate limit exceeded, retry in {}ms", .retry_after.as_millis())]
    RateLimited {
        /// Suggested wait before the caller retries
        retry_after: Duration,
    },

    /// Remote call timed out
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Connection-level failure (DNS resolution, unreachable host)
    #[error("connection error: {0}")]
    Connection(String),

    /// TLS handshake failure
    #[error("tls error: {0}")]
    Tls(String),

    /// Remote API returned a non-success HTTP status
    #[error("http {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response message or body excerpt
        message: String,
    },

    /// Request was malformed before it left the process
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Circuit breaker is open; the remote call was not attempted
    #[error("circuit breaker open")]
    CircuitOpen,

    /// Fallback was consulted but produced no value in time
    #[error("fallback exhausted")]
    FallbackExhausted {
        /// The failure that triggered the fallback lookup
        #[source]
        source: Box<Error>,
    },

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a retry may succeed where this error occurred.
    ///
    /// Retryable: timeouts, connection/DNS failures, TLS handshake errors,
    /// and HTTP 408, 429, or 5xx. Everything else indicates a request the
    /// remote will keep rejecting, so retrying only wastes the budget.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) | Self::Tls(_) => true,
            Self::Http { status, .. } => {
                matches!(status, 408 | 429) || (500..600).contains(status)
            }
            _ => false,
        }
    }

    /// Whether this error counts toward opening the circuit breaker.
    ///
    /// Only infrastructure faults (the retryable set) signal downstream
    /// trouble; validation errors and client-side 4xx do not.
    #[must_use]
    pub fn is_breaker_failure(&self) -> bool {
        self.is_retryable()
    }
}
