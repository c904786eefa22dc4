//! Stateful admission limits.
//!
//! These are the only shared mutable state in the engine. Both limiters
//! key their counters by [`Namespace`](tessera_types::Namespace) and hold
//! them behind a mutex; neither ever suspends.

mod concurrency;
mod rate;

pub use concurrency::{ConcurrencyLimiter, InFlightGuard};
pub use rate::{RateLimit, RateLimitDecision, RateLimiter};

use tessera_types::ErrorCode;
use thiserror::Error;

/// A request was turned away by a limiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LimitError {
    /// Too many attempts in the current window.
    #[error("rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimited {
        /// Time until the window rolls over.
        retry_after_ms: u64,
    },

    /// Too many executions in flight for the namespace.
    #[error("concurrency limit of {limit} reached")]
    ConcurrencyLimited {
        /// The tier ceiling.
        limit: u32,
    },
}

impl ErrorCode for LimitError {
    fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::ConcurrencyLimited { .. } => "RATE_CONCURRENCY_LIMITED",
        }
    }

    fn is_recoverable(&self) -> bool {
        true
    }
}
