//! Configuration types.
//!
//! All types implement [`Default`] for compile-time fallback values.

use crate::limits::RateLimit;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tessera_auth::{DeploymentMode, PolicyError, PolicyOverrides, PolicyTable, TrustTier};

/// Main configuration structure, after merging all layers.
///
/// # Example
///
/// ```
/// use tessera_runtime::config::TesseraConfig;
/// use tessera_auth::DeploymentMode;
///
/// let config = TesseraConfig::default();
/// assert!(!config.debug);
/// assert_eq!(config.deployment.mode, DeploymentMode::Restricted);
/// assert!(config.executor.enabled);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TesseraConfig {
    /// Enable debug logging.
    pub debug: bool,

    /// Deployment settings.
    pub deployment: DeploymentConfig,

    /// Per-tier overrides of the reference policy envelope.
    pub policy: PolicyOverrides,

    /// Per-tier rate limits.
    pub rate_limit: RateLimitsConfig,

    /// Sandbox executor settings.
    pub executor: ExecutorConfig,
}

impl TesseraConfig {
    /// Serializes to TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserializes from TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Builds the validated policy table from the `[policy]` overrides.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] if the overrides break monotonicity.
    pub fn policy_table(&self) -> Result<PolicyTable, PolicyError> {
        PolicyTable::with_overrides(&self.policy)
    }

    /// Merges another config into this one.
    ///
    /// Values from `other` override values in `self` only if they differ
    /// from the default.
    pub fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.debug != default.debug {
            self.debug = other.debug;
        }

        self.deployment.merge(&other.deployment);
        self.policy.merge(&other.policy);
        self.rate_limit.merge(&other.rate_limit);
        self.executor.merge(&other.executor);
    }
}

/// Deployment settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeploymentConfig {
    /// `restricted` enforces the arbitrary-code flag of each tier.
    pub mode: DeploymentMode,
}

impl DeploymentConfig {
    fn merge(&mut self, other: &Self) {
        if other.mode != DeploymentMode::default() {
            self.mode = other.mode;
        }
    }
}

/// Partial rate limit for one tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitOverride {
    /// Attempts allowed per window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_per_window: Option<u32>,
    /// Window length in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_ms: Option<u64>,
}

impl RateLimitOverride {
    fn merge(&mut self, other: &Self) {
        if other.requests_per_window.is_some() {
            self.requests_per_window = other.requests_per_window;
        }
        if other.window_ms.is_some() {
            self.window_ms = other.window_ms;
        }
    }

    fn resolve(&self, base: RateLimit) -> RateLimit {
        RateLimit {
            requests_per_window: self.requests_per_window.unwrap_or(base.requests_per_window),
            window: self
                .window_ms
                .map_or(base.window, Duration::from_millis),
        }
    }
}

/// `[rate_limit.*]` sections.
///
/// Tiers whose policy grants `can_bypass_rate_limit` ignore these.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitsConfig {
    /// `[rate_limit.internal]`
    pub internal: RateLimitOverride,
    /// `[rate_limit.tenant]`
    pub tenant: RateLimitOverride,
    /// `[rate_limit.public]`
    pub public: RateLimitOverride,
}

impl RateLimitsConfig {
    /// Effective limit for `tier`.
    #[must_use]
    pub fn limit_for(&self, tier: TrustTier) -> RateLimit {
        let base = RateLimit::reference(tier);
        match tier {
            TrustTier::Internal => self.internal.resolve(base),
            TrustTier::Tenant => self.tenant.resolve(base),
            TrustTier::Public => self.public.resolve(base),
        }
    }

    fn merge(&mut self, other: &Self) {
        self.internal.merge(&other.internal);
        self.tenant.merge(&other.tenant);
        self.public.merge(&other.public);
    }
}

/// `[executor]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Provision the evaluation host. When `false` every execution
    /// reports `host_unavailable`.
    pub enabled: bool,

    /// Lua heap limit in bytes. `0` disables the limit.
    pub memory_limit_bytes: usize,

    /// Maximum captured log entries per execution.
    pub max_log_entries: usize,

    /// Maximum bytes of captured log arguments per execution. Longer
    /// arguments are cut and later lines dropped.
    pub max_log_bytes: usize,

    /// Instructions between deadline checks.
    pub hook_interval: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_limit_bytes: 64 * 1024 * 1024,
            max_log_entries: 1_000,
            max_log_bytes: 1024 * 1024,
            hook_interval: 1_000,
        }
    }
}

impl ExecutorConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.enabled != default.enabled {
            self.enabled = other.enabled;
        }
        if other.memory_limit_bytes != default.memory_limit_bytes {
            self.memory_limit_bytes = other.memory_limit_bytes;
        }
        if other.max_log_entries != default.max_log_entries {
            self.max_log_entries = other.max_log_entries;
        }
        if other.max_log_bytes != default.max_log_bytes {
            self.max_log_bytes = other.max_log_bytes;
        }
        if other.hook_interval != default.hook_interval {
            self.hook_interval = other.hook_interval;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_roundtrip_of_defaults() {
        let config = TesseraConfig::default();
        let text = config.to_toml().expect("serialize");
        let back = TesseraConfig::from_toml(&text).expect("parse");
        assert_eq!(back, config);
    }

    #[test]
    fn parse_full_file() {
        let config = TesseraConfig::from_toml(
            r#"
debug = true

[deployment]
mode = "open"

[policy.public]
can_execute_arbitrary_code = true

[rate_limit.public]
requests_per_window = 5

[executor]
memory_limit_bytes = 16777216
hook_interval = 500
max_log_bytes = 32768
"#,
        )
        .expect("parse");

        assert!(config.debug);
        assert_eq!(config.deployment.mode, DeploymentMode::Open);
        assert_eq!(config.policy.public.can_execute_arbitrary_code, Some(true));
        assert_eq!(config.executor.memory_limit_bytes, 16 * 1024 * 1024);
        assert_eq!(config.executor.hook_interval, 500);
        assert_eq!(config.executor.max_log_entries, 1_000);
        assert_eq!(config.executor.max_log_bytes, 32_768);

        let public = config.rate_limit.limit_for(TrustTier::Public);
        assert_eq!(public.requests_per_window, 5);
        assert_eq!(public.window, Duration::from_millis(60_000));
    }

    #[test]
    fn rate_limit_defaults_per_tier() {
        let limits = RateLimitsConfig::default();
        assert_eq!(limits.limit_for(TrustTier::Tenant).requests_per_window, 100);
        assert_eq!(limits.limit_for(TrustTier::Public).requests_per_window, 20);
    }

    #[test]
    fn merge_keeps_unset_fields() {
        let mut base = TesseraConfig::default();
        base.executor.hook_interval = 250;
        base.policy.public.max_execution_time_ms = Some(5_000);

        let mut layer = TesseraConfig::default();
        layer.deployment.mode = DeploymentMode::Open;
        layer.policy.public.can_execute_arbitrary_code = Some(true);

        base.merge(&layer);
        assert_eq!(base.executor.hook_interval, 250);
        assert_eq!(base.deployment.mode, DeploymentMode::Open);
        assert_eq!(base.policy.public.max_execution_time_ms, Some(5_000));
        assert_eq!(base.policy.public.can_execute_arbitrary_code, Some(true));
    }

    #[test]
    fn policy_table_reflects_overrides() {
        let mut config = TesseraConfig::default();
        config.policy.public.can_execute_arbitrary_code = Some(true);
        let table = config.policy_table().expect("valid");
        assert!(table.policy_for(TrustTier::Public).can_execute_arbitrary_code);

        config.policy.public.max_execution_time_ms = Some(1_000_000);
        assert!(config.policy_table().is_err());
    }
}
