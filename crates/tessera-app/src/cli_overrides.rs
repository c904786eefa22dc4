//! CLI configuration overrides.
//!
//! Implements [`ConfigResolver`] for CLI flag overrides.

use tessera_auth::DeploymentMode;
use tessera_runtime::config::{ConfigResolver, TesseraConfig};

/// CLI configuration overrides.
///
/// Applied as the highest priority layer after file/env config loading.
///
/// # Example
///
/// ```
/// use tessera_app::CliOverrides;
/// use tessera_auth::DeploymentMode;
/// use tessera_runtime::config::{ConfigResolver, TesseraConfig};
///
/// let mut config = TesseraConfig::default();
/// CliOverrides::new()
///     .debug(true)
///     .mode(DeploymentMode::Open)
///     .apply(&mut config);
///
/// assert!(config.debug);
/// assert_eq!(config.deployment.mode, DeploymentMode::Open);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    debug: Option<bool>,
    mode: Option<DeploymentMode>,
    executor_enabled: Option<bool>,
    memory_limit_bytes: Option<usize>,
    public_code_execution: Option<bool>,
}

impl CliOverrides {
    /// Creates a new empty overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets debug mode override.
    #[must_use]
    pub fn debug(mut self, value: bool) -> Self {
        self.debug = Some(value);
        self
    }

    /// Sets deployment mode override.
    #[must_use]
    pub fn mode(mut self, mode: DeploymentMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Enables or disables the evaluation host.
    #[must_use]
    pub fn executor_enabled(mut self, value: bool) -> Self {
        self.executor_enabled = Some(value);
        self
    }

    /// Sets the Lua heap limit.
    #[must_use]
    pub fn memory_limit_bytes(mut self, bytes: usize) -> Self {
        self.memory_limit_bytes = Some(bytes);
        self
    }

    /// Lets the public tier run code in restricted deployments.
    #[must_use]
    pub fn public_code_execution(mut self, value: bool) -> Self {
        self.public_code_execution = Some(value);
        self
    }

    /// Sets debug mode override if Some.
    #[must_use]
    pub fn debug_opt(mut self, value: Option<bool>) -> Self {
        if let Some(v) = value {
            self.debug = Some(v);
        }
        self
    }

    /// Sets deployment mode override if Some.
    #[must_use]
    pub fn mode_opt(mut self, mode: Option<DeploymentMode>) -> Self {
        if let Some(m) = mode {
            self.mode = Some(m);
        }
        self
    }

    /// Sets the heap limit override if Some.
    #[must_use]
    pub fn memory_limit_bytes_opt(mut self, bytes: Option<usize>) -> Self {
        if let Some(b) = bytes {
            self.memory_limit_bytes = Some(b);
        }
        self
    }
}

impl ConfigResolver for CliOverrides {
    fn apply(&self, config: &mut TesseraConfig) {
        if let Some(d) = self.debug {
            config.debug = d;
        }
        if let Some(m) = self.mode {
            config.deployment.mode = m;
        }
        if let Some(e) = self.executor_enabled {
            config.executor.enabled = e;
        }
        if let Some(b) = self.memory_limit_bytes {
            config.executor.memory_limit_bytes = b;
        }
        if let Some(p) = self.public_code_execution {
            config.policy.public.can_execute_arbitrary_code = Some(p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_applies_nothing() {
        let mut config = TesseraConfig::default();
        let original = config.clone();

        CliOverrides::new().apply(&mut config);

        assert_eq!(config, original);
    }

    #[test]
    fn executor_overrides() {
        let mut config = TesseraConfig::default();

        CliOverrides::new()
            .executor_enabled(false)
            .memory_limit_bytes(1024)
            .apply(&mut config);

        assert!(!config.executor.enabled);
        assert_eq!(config.executor.memory_limit_bytes, 1024);
    }

    #[test]
    fn public_code_execution_sets_policy_override() {
        let mut config = TesseraConfig::default();
        assert!(config.policy.public.can_execute_arbitrary_code.is_none());

        CliOverrides::new()
            .public_code_execution(true)
            .apply(&mut config);

        assert_eq!(config.policy.public.can_execute_arbitrary_code, Some(true));
    }

    #[test]
    fn opt_methods_skip_none() {
        let mut config = TesseraConfig::default();
        let original = config.clone();

        CliOverrides::new()
            .debug_opt(None)
            .mode_opt(None)
            .memory_limit_bytes_opt(None)
            .apply(&mut config);

        assert_eq!(config, original);
    }
}
