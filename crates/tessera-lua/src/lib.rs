//! Lua 5.4 evaluation host for Tessera.
//!
//! [`LuaHost`] implements [`tessera_runtime::EvalHost`]: each job runs in
//! a fresh `mlua` state against an allow-list environment with the job's
//! scoped capabilities bound as tables. [`normalize`] turns typed Lua
//! into plain Lua before execution.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tessera_lua::LuaHost;
//! use tessera_runtime::{CapabilityTable, ExecutorOptions, SandboxExecutor};
//!
//! # async fn demo() {
//! let executor = SandboxExecutor::new(Arc::new(LuaHost::default()));
//! let options = ExecutorOptions {
//!     timeout: std::time::Duration::from_secs(1),
//!     capture_console: true,
//!     allow_async: false,
//! };
//! let result = executor.execute("return 2 + 2", CapabilityTable::new(), &options).await;
//! assert!(result.success);
//! # }
//! ```

mod capability;
mod console;
mod convert;
mod env;
mod error;
mod host;
mod json;
pub mod normalize;

pub use capability::ASYNC_DISABLED_MESSAGE;
pub use convert::{json_to_lua, lua_to_json};
pub use env::{BASE_FUNCTIONS, OS_FUNCTIONS};
pub use error::{Location, LuaHostError, NormalizeError, NormalizeErrorKind};
pub use host::{LuaHost, LuaHostOptions, CHUNK_NAME};
pub use normalize::{normalize, NormalizeOptions, NormalizeOutcome, NormalizedSource};
