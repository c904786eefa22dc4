//! Configuration management with hierarchical layering.
//!
//! # Architecture
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌────────────────────────────────────────────┐
//! │  1. CLI overrides (ConfigResolver)         │
//! ├────────────────────────────────────────────┤
//! │  2. Environment Variables (TESSERA_*)      │
//! ├────────────────────────────────────────────┤
//! │  3. Project Config (.tessera/config.toml)  │
//! ├────────────────────────────────────────────┤
//! │  4. Global Config (~/.tessera/config.toml) │
//! ├────────────────────────────────────────────┤
//! │  5. Default Values (compile-time)          │
//! └────────────────────────────────────────────┘
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `TESSERA_DEBUG` | `debug` | bool |
//! | `TESSERA_DEPLOYMENT_MODE` | `deployment.mode` | `restricted` \| `open` |
//! | `TESSERA_EXECUTOR_ENABLED` | `executor.enabled` | bool |
//! | `TESSERA_PUBLIC_CODE_EXECUTION` | `policy.public.can_execute_arbitrary_code` | bool |
//!
//! # Example Configuration
//!
//! ```toml
//! debug = false
//!
//! [deployment]
//! mode = "restricted"
//!
//! [policy.public]
//! can_execute_arbitrary_code = true
//! max_execution_time_ms = 5000
//!
//! [rate_limit.tenant]
//! requests_per_window = 100
//! window_ms = 60000
//!
//! [executor]
//! enabled = true
//! memory_limit_bytes = 33554432
//! max_log_entries = 1000
//! max_log_bytes = 1048576
//! hook_interval = 1000
//! ```

mod error;
mod loader;
mod resolver;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use resolver::{ConfigResolver, NoOpResolver};
pub use types::{
    DeploymentConfig, ExecutorConfig, RateLimitOverride, RateLimitsConfig, TesseraConfig,
};

/// Default global config directory.
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".tessera")
}

/// Default global config file path.
pub fn default_config_path() -> std::path::PathBuf {
    default_config_dir().join("config.toml")
}

/// Project config directory name.
pub const PROJECT_CONFIG_DIR: &str = ".tessera";

/// Project config file name.
pub const PROJECT_CONFIG_FILE: &str = "config.toml";
