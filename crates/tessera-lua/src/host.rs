//! The Lua 5.4 evaluation host.
//!
//! # Isolation
//!
//! Every [`EvalJob`] gets its own `Lua` state, loaded with only the
//! `table`, `string`, `math`, `utf8` and `os` libraries, and the chunk
//! runs against an allow-list `_ENV` (see [`crate::env`]). No state is
//! shared between jobs.
//!
//! # Deadline
//!
//! An instruction-count hook checks the job deadline every
//! `hook_interval` VM instructions and raises once it has passed. In
//! async mode the whole evaluation is additionally bounded by
//! `tokio::time::timeout_at`, which covers time spent suspended in
//! capabilities or `async.sleep`.

use crate::convert::lua_to_json;
use crate::env::{self, Sandbox, TIMEOUT_MESSAGE};
use crate::error::LuaHostError;
use mlua::{HookTriggers, Lua, LuaOptions, StdLib, Value, VmState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tessera_runtime::config::ExecutorConfig;
use tessera_runtime::{EvalHost, EvalJob, EvalOutcome};
use tracing::{debug, warn};

/// Chunk name reported in guest error messages (`sandbox:3: ...`).
pub const CHUNK_NAME: &str = "=sandbox";

/// Tunables for [`LuaHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LuaHostOptions {
    /// Heap limit per state in bytes; `0` disables it.
    pub memory_limit_bytes: usize,
    /// Instructions between deadline checks.
    pub hook_interval: u32,
}

impl Default for LuaHostOptions {
    fn default() -> Self {
        Self::from_config(&ExecutorConfig::default())
    }
}

impl LuaHostOptions {
    /// Options taken from the `[executor]` config section.
    #[must_use]
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            memory_limit_bytes: config.memory_limit_bytes,
            hook_interval: config.hook_interval.max(1),
        }
    }
}

/// [`EvalHost`] backed by mlua.
#[derive(Debug, Clone, Default)]
pub struct LuaHost {
    options: LuaHostOptions,
}

impl LuaHost {
    /// Creates a host with the given options.
    #[must_use]
    pub fn new(options: LuaHostOptions) -> Self {
        Self { options }
    }

    /// Creates a host from the `[executor]` config section.
    #[must_use]
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(LuaHostOptions::from_config(config))
    }

    /// The options in effect.
    #[must_use]
    pub fn options(&self) -> LuaHostOptions {
        self.options
    }

    fn new_state(&self) -> Result<Lua, LuaHostError> {
        let libs = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8 | StdLib::OS;
        let lua = Lua::new_with(libs, LuaOptions::default())?;
        if self.options.memory_limit_bytes > 0 {
            lua.set_memory_limit(self.options.memory_limit_bytes)?;
        }
        Ok(lua)
    }

    fn run(&self, job: EvalJob) -> Result<EvalOutcome, LuaHostError> {
        let lua = self.new_state()?;
        let interrupted = Arc::new(AtomicBool::new(false));

        let env = env::build(
            &lua,
            &Sandbox {
                console: &job.console,
                capabilities: &job.capabilities,
                allow_async: job.allow_async,
                interrupted: Arc::clone(&interrupted),
            },
        )?;
        install_deadline(&lua, job.deadline, self.options.hook_interval, Arc::clone(&interrupted));

        let chunk = lua
            .load(job.code.as_str())
            .set_name(CHUNK_NAME)
            .set_environment(env);

        let result = if job.allow_async {
            let deadline = tokio::time::Instant::from_std(job.deadline);
            let bounded = tokio::time::timeout_at(deadline, chunk.eval_async::<Value>());
            match job.runtime.block_on(bounded) {
                Ok(result) => result,
                Err(_) => {
                    interrupted.store(true, Ordering::Relaxed);
                    return Ok(EvalOutcome::TimedOut);
                }
            }
        } else {
            let _guard = job.runtime.enter();
            chunk.eval::<Value>()
        };

        if interrupted.load(Ordering::Relaxed) {
            return Ok(EvalOutcome::TimedOut);
        }

        Ok(match result {
            Ok(value) => match lua_to_json(&value) {
                Ok(serde_json::Value::Null) => EvalOutcome::Value(None),
                Ok(json) => EvalOutcome::Value(Some(json)),
                Err(e) => EvalOutcome::Fault {
                    message: format!("cannot return value: {}", describe(&e).0),
                    stack: None,
                },
            },
            Err(e) => {
                let (message, stack) = describe(&e);
                EvalOutcome::Fault { message, stack }
            }
        })
    }
}

impl EvalHost for LuaHost {
    fn name(&self) -> &str {
        "lua54"
    }

    fn evaluate(&self, job: EvalJob) -> EvalOutcome {
        let allow_async = job.allow_async;
        match self.run(job) {
            Ok(outcome) => {
                debug!(allow_async, outcome = outcome_label(&outcome), "lua chunk settled");
                outcome
            }
            Err(e) => {
                warn!(error = %e, "lua host setup failed");
                EvalOutcome::HostError(e.to_string())
            }
        }
    }
}

fn outcome_label(outcome: &EvalOutcome) -> &'static str {
    match outcome {
        EvalOutcome::Value(_) => "value",
        EvalOutcome::Fault { .. } => "fault",
        EvalOutcome::TimedOut => "timed_out",
        EvalOutcome::HostError(_) => "host_error",
    }
}

/// Raises inside the VM once `deadline` has passed.
fn install_deadline(lua: &Lua, deadline: Instant, interval: u32, interrupted: Arc<AtomicBool>) {
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(interval),
        move |_lua, _debug| {
            if interrupted.load(Ordering::Relaxed) || Instant::now() >= deadline {
                interrupted.store(true, Ordering::Relaxed);
                return Err(mlua::Error::RuntimeError(TIMEOUT_MESSAGE.to_string()));
            }
            Ok(VmState::Continue)
        },
    );
}

/// Splits an mlua error into a message and an optional guest traceback.
fn describe(err: &mlua::Error) -> (String, Option<String>) {
    match err {
        mlua::Error::RuntimeError(msg) => split_traceback(msg),
        mlua::Error::CallbackError { traceback, cause } => {
            let (message, stack) = describe(cause);
            (message, stack.or_else(|| Some(traceback.clone())))
        }
        mlua::Error::SyntaxError { message, .. } => (format!("syntax error: {message}"), None),
        mlua::Error::MemoryError(msg) => (format!("out of memory: {msg}"), None),
        other => split_traceback(&other.to_string()),
    }
}

fn split_traceback(msg: &str) -> (String, Option<String>) {
    match msg.split_once("\nstack traceback:") {
        Some((message, rest)) => (message.to_string(), Some(format!("stack traceback:{rest}"))),
        None => (msg.to_string(), None),
    }
}
