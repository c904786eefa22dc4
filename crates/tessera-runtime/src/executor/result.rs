//! Structured execution results.

use super::LogEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_types::ErrorCode;

/// Classification of a failed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The code did not finish within the effective timeout.
    Timeout,
    /// The code failed: syntax error, `error(...)`, runtime error.
    Fault,
    /// No evaluation host is provisioned, or it crashed.
    HostUnavailable,
}

/// The `error` half of a failed [`ExecutionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    /// Classification.
    pub kind: FailureKind,
    /// Human-readable message.
    pub message: String,
    /// Guest stack trace, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ExecutionFailure {
    /// A timeout failure for `timeout_ms`.
    #[must_use]
    pub fn timeout(timeout_ms: u64) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: format!("Execution timed out after {timeout_ms}ms"),
            stack: None,
        }
    }

    /// A fault raised by the guest code.
    #[must_use]
    pub fn fault(message: impl Into<String>, stack: Option<String>) -> Self {
        Self {
            kind: FailureKind::Fault,
            message: message.into(),
            stack,
        }
    }

    /// The host is missing or broken.
    #[must_use]
    pub fn host_unavailable(detail: impl std::fmt::Display) -> Self {
        Self {
            kind: FailureKind::HostUnavailable,
            message: format!("Code execution host unavailable: {detail}"),
            stack: None,
        }
    }
}

impl std::fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ExecutionFailure {}

impl ErrorCode for ExecutionFailure {
    fn code(&self) -> &'static str {
        match self.kind {
            FailureKind::Timeout => "EXEC_TIMEOUT",
            FailureKind::Fault => "EXEC_FAULT",
            FailureKind::HostUnavailable => "EXEC_HOST_UNAVAILABLE",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self.kind, FailureKind::HostUnavailable)
    }
}

/// Outcome of one sandboxed execution.
///
/// `success == error.is_none()` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Whether the code completed without error.
    pub success: bool,
    /// Returned value, as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Failure details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionFailure>,
    /// Captured console output.
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    /// Wall-clock time spent, never above the effective timeout on timeout.
    pub execution_time_ms: u64,
}

impl ExecutionResult {
    /// A successful result.
    #[must_use]
    pub fn ok(value: Option<Value>, logs: Vec<LogEntry>, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            value,
            error: None,
            logs,
            execution_time_ms,
        }
    }

    /// A failed result.
    #[must_use]
    pub fn failed(error: ExecutionFailure, logs: Vec<LogEntry>, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(error),
            logs,
            execution_time_ms,
        }
    }

    /// Failure kind, if any.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
