//! Fetchguard
//!
//! Resilient remote-call orchestration for data-access collaborators.
//!
//! # Features
//!
//! - **Token bucket rate limiting**: per-caller admission control with
//!   burst capacity and multi-level (per-second AND per-minute) composition
//! - **Circuit breaker**: closed/open/half-open state machine guarding the
//!   downstream dependency
//! - **Retries**: full-jitter exponential backoff over a caller-supplied
//!   error classification
//! - **TTL caching**: pluggable in-memory or no-op response cache
//! - **Fallbacks**: prioritized substitute value sources with a bounded
//!   lookup
//!
//! Everything composes behind [`ResilientInvoker::fetch`], which wraps one
//! opaque async remote call per resource type. Each collaborator owns its
//! invoker; there is no shared global state.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fetchguard::cache::InMemoryCacheStrategy;
//! use fetchguard::config::ResilienceConfig;
//! use fetchguard::fallback::StaticValueFallback;
//! use fetchguard::invoker::ResilientInvoker;
//!
//! # async fn example() -> fetchguard::Result<()> {
//! let invoker = ResilientInvoker::new(
//!     "users",
//!     &ResilienceConfig::default(),
//!     Arc::new(InMemoryCacheStrategy::new()),
//!     Some(Arc::new(StaticValueFallback::new(Vec::new()))),
//! );
//!
//! let users: Vec<String> = invoker
//!     .fetch(Some("users:all"), false, || async {
//!         // Perform the remote call here.
//!         Ok(vec!["amira".to_string()])
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod error;
pub mod failsafe;
pub mod fallback;
pub mod invoker;
pub mod stats;

pub use error::{Error, Result};
pub use invoker::ResilientInvoker;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
