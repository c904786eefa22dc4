//! Builder for [`CodeExecutionService`].

use crate::error::AppError;
use crate::service::CodeExecutionService;
use std::sync::Arc;
use tessera_auth::{DeploymentMode, PolicyTable};
use tessera_lua::{LuaHost, NormalizeOptions};
use tessera_runtime::config::{RateLimitsConfig, TesseraConfig};
use tessera_runtime::{ConcurrencyLimiter, RateLimiter, SandboxExecutor};

/// Builder for [`CodeExecutionService`].
///
/// Defaults: reference policies, restricted mode, reference rate limits
/// and a Lua host with default options.
///
/// # Example
///
/// ```
/// use tessera_app::CodeExecutionService;
/// use tessera_auth::DeploymentMode;
///
/// let service = CodeExecutionService::builder()
///     .mode(DeploymentMode::Open)
///     .build();
/// assert_eq!(service.mode(), DeploymentMode::Open);
/// ```
#[derive(Debug)]
pub struct CodeExecutionServiceBuilder {
    policies: PolicyTable,
    mode: DeploymentMode,
    rate_limits: RateLimitsConfig,
    executor: Option<SandboxExecutor>,
    concurrency: ConcurrencyLimiter,
    normalize_options: NormalizeOptions,
}

impl Default for CodeExecutionServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeExecutionServiceBuilder {
    /// Creates a builder with reference settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            policies: PolicyTable::reference(),
            mode: DeploymentMode::default(),
            rate_limits: RateLimitsConfig::default(),
            executor: None,
            concurrency: ConcurrencyLimiter::new(),
            normalize_options: NormalizeOptions::default(),
        }
    }

    /// Seeds the builder from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Policy`] if the `[policy]` overrides break
    /// tier monotonicity.
    pub fn from_config(config: &TesseraConfig) -> Result<Self, AppError> {
        let executor = if config.executor.enabled {
            SandboxExecutor::new(Arc::new(LuaHost::from_config(&config.executor)))
        } else {
            SandboxExecutor::unavailable()
        };
        Ok(Self::new()
            .policies(config.policy_table()?)
            .mode(config.deployment.mode)
            .rate_limits(config.rate_limit.clone())
            .executor(
                executor
                    .with_max_log_entries(config.executor.max_log_entries)
                    .with_max_log_bytes(config.executor.max_log_bytes),
            ))
    }

    /// Sets the policy table.
    #[must_use]
    pub fn policies(mut self, policies: PolicyTable) -> Self {
        self.policies = policies;
        self
    }

    /// Sets the deployment mode.
    #[must_use]
    pub fn mode(mut self, mode: DeploymentMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets per-tier rate limits.
    #[must_use]
    pub fn rate_limits(mut self, rate_limits: RateLimitsConfig) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    /// Sets the executor.
    #[must_use]
    pub fn executor(mut self, executor: SandboxExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Shares in-flight counters with another service.
    #[must_use]
    pub fn concurrency(mut self, concurrency: ConcurrencyLimiter) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the normalizer options used for typed Lua.
    #[must_use]
    pub fn normalize_options(mut self, options: NormalizeOptions) -> Self {
        self.normalize_options = options;
        self
    }

    /// Builds the service.
    #[must_use]
    pub fn build(self) -> CodeExecutionService {
        let rate_limits = self.rate_limits;
        let rate_limiter = RateLimiter::new(&self.policies, |tier| rate_limits.limit_for(tier));
        let executor = self
            .executor
            .unwrap_or_else(|| SandboxExecutor::new(Arc::new(LuaHost::default())));
        CodeExecutionService {
            policies: self.policies,
            mode: self.mode,
            rate_limiter,
            concurrency: self.concurrency,
            executor,
            normalize_options: self.normalize_options,
        }
    }
}
