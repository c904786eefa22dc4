//! Result of the full request pipeline.

use serde::Serialize;
use tessera_auth::AuthorizationDecision;
use tessera_runtime::{ExecutionResult, RateLimitDecision};
use tessera_types::Namespace;

/// What happened to a request handed to
/// [`CodeExecutionService::handle`](crate::CodeExecutionService::handle).
///
/// Serialized with a `status` tag:
///
/// ```json
/// { "status": "completed", "decision": { ... }, "result": { "success": true, "value": 4, ... } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Turned away by the rate limiter before authorization.
    RateLimited {
        /// The limiter's decision.
        decision: RateLimitDecision,
    },
    /// Rejected by the gate; no code ran.
    Denied {
        /// The gate's decision.
        decision: AuthorizationDecision,
    },
    /// Too many executions already in flight for the namespace.
    #[serde(rename_all = "camelCase")]
    ConcurrencyLimited {
        /// The tier's concurrency ceiling.
        limit: u32,
        /// The namespace at capacity.
        namespace: Namespace,
    },
    /// The code ran (successfully or not).
    Completed {
        /// The gate's decision.
        decision: AuthorizationDecision,
        /// The executor's result.
        result: ExecutionResult,
    },
}

impl ExecutionOutcome {
    /// Tag value of the outcome.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Denied { .. } => "denied",
            Self::ConcurrencyLimited { .. } => "concurrency_limited",
            Self::Completed { .. } => "completed",
        }
    }

    /// Whether the code ran and succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { result, .. } if result.success)
    }

    /// Whether the request never reached the executor.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        !matches!(self, Self::Completed { .. })
    }

    /// The execution result, when the code ran.
    #[must_use]
    pub fn result(&self) -> Option<&ExecutionResult> {
        match self {
            Self::Completed { result, .. } => Some(result),
            _ => None,
        }
    }
}
