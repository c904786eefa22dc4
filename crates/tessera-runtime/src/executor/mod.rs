//! Sandboxed executor.
//!
//! The executor owns the timeout race; the actual evaluation is delegated
//! to an [`EvalHost`] (the Lua host lives in `tessera-lua`).
//!
//! ```text
//! execute()
//!   ├── spawn_blocking ──► EvalHost::evaluate(job) ──► EvalOutcome
//!   └── tokio::time::timeout(effective timeout)
//!         whichever settles first produces the ExecutionResult
//! ```
//!
//! On timeout the evaluation thread is abandoned, not joined. Hosts are
//! expected to honour [`EvalJob::deadline`] and stop on their own shortly
//! after; logs written before the deadline are kept because the console
//! buffer is shared.

mod console;
mod result;

pub use console::{ConsoleBuffer, LogEntry, LogLevel};
pub use result::{ExecutionFailure, ExecutionResult, FailureKind};

use crate::resource::CapabilityTable;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_types::ExecutionRequest;
use tokio::runtime::Handle;
use tracing::{info, warn};

/// Default cap on captured log lines per execution.
pub const DEFAULT_MAX_LOG_ENTRIES: usize = 1_000;

/// Default cap on captured argument bytes per execution.
pub const DEFAULT_MAX_LOG_BYTES: usize = 1024 * 1024;

/// Everything a host needs to evaluate one chunk.
#[derive(Debug)]
pub struct EvalJob {
    /// Source to evaluate (plain Lua).
    pub code: String,
    /// Pre-scoped capabilities to inject.
    pub capabilities: CapabilityTable,
    /// Whether capabilities may be awaited.
    pub allow_async: bool,
    /// Point in time after which evaluation must stop.
    pub deadline: Instant,
    /// The effective timeout the deadline was derived from.
    pub timeout: Duration,
    /// Console sink. Disabled when capture is off.
    pub console: ConsoleBuffer,
    /// Runtime to drive async capabilities on.
    pub runtime: Handle,
}

/// What a host reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    /// The chunk returned (`None` for no value / `nil`).
    Value(Option<Value>),
    /// The chunk failed.
    Fault {
        /// Error message.
        message: String,
        /// Guest stack trace.
        stack: Option<String>,
    },
    /// The host stopped the chunk at the deadline.
    TimedOut,
    /// The host could not set up an evaluation context.
    HostError(String),
}

/// A code-evaluation primitive.
///
/// `evaluate` runs on a blocking worker thread and may block for as long
/// as the job's deadline allows.
pub trait EvalHost: Send + Sync {
    /// Short host name for logs.
    fn name(&self) -> &str;

    /// Evaluates one job in a fresh, isolated context.
    fn evaluate(&self, job: EvalJob) -> EvalOutcome;
}

/// Per-execution options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Effective timeout.
    pub timeout: Duration,
    /// Capture console output.
    pub capture_console: bool,
    /// Allow async capabilities.
    pub allow_async: bool,
}

impl ExecutorOptions {
    /// Options for `request` under an admitted effective timeout.
    #[must_use]
    pub fn for_request(request: &ExecutionRequest, effective_timeout_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(effective_timeout_ms),
            capture_console: request.capture_console,
            allow_async: request.allow_async,
        }
    }
}

/// Runs code on an [`EvalHost`] under a wall-clock timeout.
#[derive(Clone)]
pub struct SandboxExecutor {
    host: Option<Arc<dyn EvalHost>>,
    max_log_entries: usize,
    max_log_bytes: usize,
}

impl std::fmt::Debug for SandboxExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxExecutor")
            .field("host", &self.host.as_ref().map(|h| h.name().to_string()))
            .field("max_log_entries", &self.max_log_entries)
            .field("max_log_bytes", &self.max_log_bytes)
            .finish()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl SandboxExecutor {
    /// An executor backed by `host`.
    #[must_use]
    pub fn new(host: Arc<dyn EvalHost>) -> Self {
        Self {
            host: Some(host),
            max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
            max_log_bytes: DEFAULT_MAX_LOG_BYTES,
        }
    }

    /// An executor with no host; every call reports `host_unavailable`.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            host: None,
            max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
            max_log_bytes: DEFAULT_MAX_LOG_BYTES,
        }
    }

    /// Sets the cap on captured log lines.
    #[must_use]
    pub fn with_max_log_entries(mut self, max: usize) -> Self {
        self.max_log_entries = max;
        self
    }

    /// Sets the cap on captured argument bytes.
    #[must_use]
    pub fn with_max_log_bytes(mut self, max: usize) -> Self {
        self.max_log_bytes = max;
        self
    }

    /// Returns `true` if a host is provisioned.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.host.is_some()
    }

    /// Runs `code` with `capabilities`.
    ///
    /// Never panics and never returns an error: every failure is reported
    /// in the [`ExecutionResult`].
    pub async fn execute(
        &self,
        code: &str,
        capabilities: CapabilityTable,
        options: &ExecutorOptions,
    ) -> ExecutionResult {
        let Some(host) = self.host.clone() else {
            warn!("execution requested but no evaluation host is provisioned");
            return ExecutionResult::failed(
                ExecutionFailure::host_unavailable("no evaluation host is provisioned"),
                Vec::new(),
                0,
            );
        };
        let runtime = match Handle::try_current() {
            Ok(h) => h,
            Err(e) => {
                return ExecutionResult::failed(ExecutionFailure::host_unavailable(e), Vec::new(), 0)
            }
        };

        let console = if options.capture_console {
            ConsoleBuffer::new(self.max_log_entries, self.max_log_bytes)
        } else {
            ConsoleBuffer::disabled()
        };

        let started = Instant::now();
        let timeout_ms = millis(options.timeout);
        let job = EvalJob {
            code: code.to_string(),
            capabilities,
            allow_async: options.allow_async,
            deadline: started + options.timeout,
            timeout: options.timeout,
            console: console.clone(),
            runtime,
        };

        let host_name = host.name().to_string();
        let task = tokio::task::spawn_blocking(move || host.evaluate(job));
        let raced = tokio::time::timeout(options.timeout, task).await;
        let elapsed = millis(started.elapsed());

        let result = match raced {
            Err(_) | Ok(Ok(EvalOutcome::TimedOut)) => {
                warn!(timeout_ms, "execution timed out");
                ExecutionResult::failed(
                    ExecutionFailure::timeout(timeout_ms),
                    console.snapshot(),
                    elapsed.min(timeout_ms),
                )
            }
            Ok(Err(join)) => {
                warn!(host = host_name, error = %join, "evaluation host crashed");
                ExecutionResult::failed(
                    ExecutionFailure::host_unavailable(format!("evaluation host crashed: {join}")),
                    console.snapshot(),
                    elapsed,
                )
            }
            Ok(Ok(EvalOutcome::Value(value))) => {
                ExecutionResult::ok(value, console.snapshot(), elapsed)
            }
            Ok(Ok(EvalOutcome::HostError(detail))) => {
                warn!(host = host_name, %detail, "evaluation host failed");
                ExecutionResult::failed(
                    ExecutionFailure::host_unavailable(detail),
                    console.snapshot(),
                    elapsed,
                )
            }
            Ok(Ok(EvalOutcome::Fault { message, stack })) => ExecutionResult::failed(
                ExecutionFailure::fault(message, stack),
                console.snapshot(),
                elapsed,
            ),
        };

        info!(
            success = result.success,
            kind = ?result.failure_kind(),
            execution_time_ms = result.execution_time_ms,
            logs = result.logs.len(),
            dropped_logs = console.dropped(),
            dropped_log_bytes = console.dropped_bytes(),
            "execution finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct ScriptedHost(fn(EvalJob) -> EvalOutcome);

    impl EvalHost for ScriptedHost {
        fn name(&self) -> &str {
            "scripted"
        }

        fn evaluate(&self, job: EvalJob) -> EvalOutcome {
            (self.0)(job)
        }
    }

    fn executor(f: fn(EvalJob) -> EvalOutcome) -> SandboxExecutor {
        SandboxExecutor::new(Arc::new(ScriptedHost(f)))
    }

    fn options(timeout_ms: u64) -> ExecutorOptions {
        ExecutorOptions {
            timeout: Duration::from_millis(timeout_ms),
            capture_console: true,
            allow_async: false,
        }
    }

    #[tokio::test]
    async fn value_is_reported() {
        let ex = executor(|job| {
            job.console.push(LogLevel::Info, vec![job.code.clone()]);
            EvalOutcome::Value(Some(json!(4)))
        });
        let r = ex
            .execute("return 2 + 2", CapabilityTable::new(), &options(1_000))
            .await;
        assert!(r.success);
        assert_eq!(r.value, Some(json!(4)));
        assert_eq!(r.logs.len(), 1);
        assert_eq!(r.logs[0].args, vec!["return 2 + 2".to_string()]);
    }

    #[tokio::test]
    async fn fault_is_reported() {
        let ex = executor(|_| EvalOutcome::Fault {
            message: "boom".into(),
            stack: Some("stack traceback:".into()),
        });
        let r = ex.execute("", CapabilityTable::new(), &options(1_000)).await;
        assert!(!r.success);
        assert_eq!(r.failure_kind(), Some(FailureKind::Fault));
        assert_eq!(r.error.as_ref().map(|e| e.message.as_str()), Some("boom"));
    }

    #[tokio::test]
    async fn timer_wins_over_runaway_host_and_keeps_logs() {
        let ex = executor(|job| {
            job.console.push(LogLevel::Log, vec!["before".into()]);
            std::thread::sleep(Duration::from_millis(400));
            EvalOutcome::Value(None)
        });
        let started = Instant::now();
        let r = ex.execute("", CapabilityTable::new(), &options(50)).await;
        assert!(started.elapsed() < Duration::from_millis(350));
        assert_eq!(r.failure_kind(), Some(FailureKind::Timeout));
        assert!(r.execution_time_ms <= 50);
        assert!(r
            .error
            .as_ref()
            .is_some_and(|e| e.message.contains("timed out")));
        assert_eq!(r.logs.len(), 1);
    }

    #[tokio::test]
    async fn host_reported_timeout_is_classified() {
        let ex = executor(|_| EvalOutcome::TimedOut);
        let r = ex.execute("", CapabilityTable::new(), &options(1_000)).await;
        assert_eq!(r.failure_kind(), Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn crashing_host_is_unavailable() {
        let ex = executor(|_| panic!("host exploded"));
        let r = ex.execute("", CapabilityTable::new(), &options(1_000)).await;
        assert_eq!(r.failure_kind(), Some(FailureKind::HostUnavailable));
    }

    #[tokio::test]
    async fn host_setup_failure_is_unavailable() {
        let ex = executor(|_| EvalOutcome::HostError("out of memory".into()));
        let r = ex.execute("", CapabilityTable::new(), &options(1_000)).await;
        assert_eq!(r.failure_kind(), Some(FailureKind::HostUnavailable));
        assert!(r
            .error
            .as_ref()
            .is_some_and(|e| e.message.contains("out of memory")));
    }

    #[tokio::test]
    async fn missing_host_is_unavailable() {
        let ex = SandboxExecutor::unavailable();
        assert!(!ex.is_available());
        let r = ex
            .execute("return 1", CapabilityTable::new(), &options(1_000))
            .await;
        assert!(!r.success);
        assert_eq!(r.failure_kind(), Some(FailureKind::HostUnavailable));
        assert!(r.logs.is_empty());
    }

    #[tokio::test]
    async fn console_capture_off_yields_no_logs() {
        let ex = executor(|job| {
            assert!(!job.console.is_enabled());
            job.console.push(LogLevel::Log, vec!["x".into()]);
            EvalOutcome::Value(None)
        });
        let opts = ExecutorOptions {
            capture_console: false,
            ..options(1_000)
        };
        let r = ex.execute("", CapabilityTable::new(), &opts).await;
        assert!(r.success);
        assert!(r.logs.is_empty());
    }

    #[tokio::test]
    async fn log_byte_cap_is_applied_per_execution() {
        let ex = executor(|job| {
            job.console.push(LogLevel::Log, vec!["x".repeat(100)]);
            job.console.push(LogLevel::Log, vec!["y".into()]);
            EvalOutcome::Value(None)
        })
        .with_max_log_bytes(10);
        let r = ex.execute("", CapabilityTable::new(), &options(1_000)).await;
        assert!(r.success);
        assert_eq!(r.logs.len(), 1);
        assert_eq!(r.logs[0].args, vec!["x".repeat(10)]);
    }

    #[test]
    fn options_from_request() {
        let req = ExecutionRequest::new("").with_async(true).with_capture_console(false);
        let o = ExecutorOptions::for_request(&req, 250);
        assert_eq!(o.timeout, Duration::from_millis(250));
        assert!(o.allow_async);
        assert!(!o.capture_console);
    }
}
