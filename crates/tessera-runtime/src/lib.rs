//! Runtime layer for Tessera.
//!
//! - [`config`]: layered TOML/env configuration
//! - [`resource`]: backend handles, registry and capability table
//! - [`scope`]: per-namespace confinement of handles
//! - [`limits`]: rate and concurrency limiters
//! - [`executor`]: the timeout race around an [`EvalHost`](executor::EvalHost)
//!
//! ```text
//! ResourceRegistry ──scope_capabilities(ns)──► CapabilityTable
//!                                                   │
//!                   SandboxExecutor::execute(code, caps, options)
//!                                                   │
//!                                            ExecutionResult
//! ```

pub mod config;
pub mod executor;
pub mod limits;
pub mod resource;
pub mod scope;

pub use executor::{
    ConsoleBuffer, EvalHost, EvalJob, EvalOutcome, ExecutionFailure, ExecutionResult,
    ExecutorOptions, FailureKind, LogEntry, LogLevel, SandboxExecutor,
};
pub use limits::{ConcurrencyLimiter, InFlightGuard, LimitError, RateLimit, RateLimitDecision, RateLimiter};
pub use resource::{CapabilityTable, ResourceError, ResourceHandle, ResourceRegistry};
pub use scope::{scope, scope_capabilities, ScopedHandle};
