//! Per-tier permission policy.
//!
//! A [`PolicyTable`] maps each [`TrustTier`] to an immutable
//! [`PermissionPolicy`]. The table is built once at process start and is
//! only readable afterwards.
//!
//! # Reference envelope
//!
//! | Tier | Resources | Timeout | Concurrency | Internal | Bypass | Code |
//! |------|-----------|---------|-------------|----------|--------|------|
//! | internal | all | 120 000 ms | 100 | yes | yes | yes |
//! | tenant | db, email, queue | 30 000 ms | 10 | no | no | yes |
//! | public | db | 10 000 ms | 3 | no | no | no |
//!
//! # Monotonicity
//!
//! [`PolicyTable::new`] refuses any table where a lower tier holds
//! something a higher tier does not: a resource, a larger ceiling, or a
//! privilege flag.

use crate::{ResourceSet, TrustTier};
use serde::{Deserialize, Serialize};
use tessera_types::{ErrorCode, ResourceName};
use thiserror::Error;

/// Capability envelope of one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionPolicy {
    /// Resources that may be injected.
    pub allowed_resources: ResourceSet,
    /// Ceiling on the effective timeout.
    pub max_execution_time_ms: u64,
    /// Ceiling on simultaneous executions per namespace.
    pub max_concurrent_executions: u32,
    /// May receive internal-only resources.
    pub can_access_internal_resources: bool,
    /// Never rate limited.
    pub can_bypass_rate_limit: bool,
    /// May run caller-supplied code in restricted deployments.
    pub can_execute_arbitrary_code: bool,
}

impl PermissionPolicy {
    /// The reference envelope for `tier`.
    #[must_use]
    pub fn reference(tier: TrustTier) -> Self {
        match tier {
            TrustTier::Internal => Self {
                allowed_resources: ResourceSet::all(),
                max_execution_time_ms: 120_000,
                max_concurrent_executions: 100,
                can_access_internal_resources: true,
                can_bypass_rate_limit: true,
                can_execute_arbitrary_code: true,
            },
            TrustTier::Tenant => Self {
                allowed_resources: ResourceSet::DB | ResourceSet::EMAIL | ResourceSet::QUEUE,
                max_execution_time_ms: 30_000,
                max_concurrent_executions: 10,
                can_access_internal_resources: false,
                can_bypass_rate_limit: false,
                can_execute_arbitrary_code: true,
            },
            TrustTier::Public => Self {
                allowed_resources: ResourceSet::DB,
                max_execution_time_ms: 10_000,
                max_concurrent_executions: 3,
                can_access_internal_resources: false,
                can_bypass_rate_limit: false,
                can_execute_arbitrary_code: false,
            },
        }
    }

    /// Returns `true` if `resource` may be injected.
    #[must_use]
    pub fn allows(&self, resource: ResourceName) -> bool {
        self.allowed_resources.allows(resource)
    }

    /// Returns the name of the first field in which `self` exceeds `higher`.
    fn exceeds(&self, higher: &Self) -> Option<&'static str> {
        if !higher.allowed_resources.contains(self.allowed_resources) {
            return Some("allowed_resources");
        }
        if self.max_execution_time_ms > higher.max_execution_time_ms {
            return Some("max_execution_time_ms");
        }
        if self.max_concurrent_executions > higher.max_concurrent_executions {
            return Some("max_concurrent_executions");
        }
        let flags = [
            (
                "can_access_internal_resources",
                self.can_access_internal_resources,
                higher.can_access_internal_resources,
            ),
            (
                "can_bypass_rate_limit",
                self.can_bypass_rate_limit,
                higher.can_bypass_rate_limit,
            ),
            (
                "can_execute_arbitrary_code",
                self.can_execute_arbitrary_code,
                higher.can_execute_arbitrary_code,
            ),
        ];
        flags
            .into_iter()
            .find(|(_, lower, higher)| *lower && !*higher)
            .map(|(name, _, _)| name)
    }
}

/// Partial override of a [`PermissionPolicy`], as read from config.
///
/// `None` fields keep the reference value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOverride {
    /// Replaces the resource set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_resources: Option<Vec<ResourceName>>,
    /// Replaces the timeout ceiling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_execution_time_ms: Option<u64>,
    /// Replaces the concurrency ceiling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_executions: Option<u32>,
    /// Replaces the internal-access flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_access_internal_resources: Option<bool>,
    /// Replaces the rate-limit bypass flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_bypass_rate_limit: Option<bool>,
    /// Replaces the arbitrary-code flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_execute_arbitrary_code: Option<bool>,
}

impl PolicyOverride {
    /// Applies the set fields on top of `base`.
    #[must_use]
    pub fn apply(&self, mut base: PermissionPolicy) -> PermissionPolicy {
        if let Some(ref names) = self.allowed_resources {
            base.allowed_resources = names.iter().copied().collect();
        }
        if let Some(v) = self.max_execution_time_ms {
            base.max_execution_time_ms = v;
        }
        if let Some(v) = self.max_concurrent_executions {
            base.max_concurrent_executions = v;
        }
        if let Some(v) = self.can_access_internal_resources {
            base.can_access_internal_resources = v;
        }
        if let Some(v) = self.can_bypass_rate_limit {
            base.can_bypass_rate_limit = v;
        }
        if let Some(v) = self.can_execute_arbitrary_code {
            base.can_execute_arbitrary_code = v;
        }
        base
    }

    /// Merges `other` into `self`; fields set in `other` win.
    pub fn merge(&mut self, other: &Self) {
        if other.allowed_resources.is_some() {
            self.allowed_resources.clone_from(&other.allowed_resources);
        }
        if other.max_execution_time_ms.is_some() {
            self.max_execution_time_ms = other.max_execution_time_ms;
        }
        if other.max_concurrent_executions.is_some() {
            self.max_concurrent_executions = other.max_concurrent_executions;
        }
        if other.can_access_internal_resources.is_some() {
            self.can_access_internal_resources = other.can_access_internal_resources;
        }
        if other.can_bypass_rate_limit.is_some() {
            self.can_bypass_rate_limit = other.can_bypass_rate_limit;
        }
        if other.can_execute_arbitrary_code.is_some() {
            self.can_execute_arbitrary_code = other.can_execute_arbitrary_code;
        }
    }
}

/// Overrides for all three tiers (`[policy.*]` in config).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOverrides {
    /// `[policy.internal]`
    pub internal: PolicyOverride,
    /// `[policy.tenant]`
    pub tenant: PolicyOverride,
    /// `[policy.public]`
    pub public: PolicyOverride,
}

impl PolicyOverrides {
    /// Merges `other` into `self` per tier.
    pub fn merge(&mut self, other: &Self) {
        self.internal.merge(&other.internal);
        self.tenant.merge(&other.tenant);
        self.public.merge(&other.public);
    }
}

/// Reasons a policy table is refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// A lower tier exceeds a higher tier in `field`.
    #[error("policy not monotonic: {lower} exceeds {higher} in {field}")]
    NotMonotonic {
        /// The less trusted tier.
        lower: TrustTier,
        /// The more trusted tier.
        higher: TrustTier,
        /// Offending field.
        field: &'static str,
    },

    /// An internal-only resource is granted without internal access.
    #[error("{tier} grants internal resource {resource} without internal access")]
    InternalResourceWithoutAccess {
        /// Offending tier.
        tier: TrustTier,
        /// Offending resource.
        resource: ResourceName,
    },

    /// A ceiling is zero.
    #[error("{tier} has a zero {field}")]
    ZeroCeiling {
        /// Offending tier.
        tier: TrustTier,
        /// Offending field.
        field: &'static str,
    },
}

impl ErrorCode for PolicyError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotMonotonic { .. } => "POLICY_NOT_MONOTONIC",
            Self::InternalResourceWithoutAccess { .. } => "POLICY_INTERNAL_RESOURCE",
            Self::ZeroCeiling { .. } => "POLICY_ZERO_CEILING",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Validated tier → policy mapping.
///
/// # Example
///
/// ```
/// use tessera_auth::{PolicyTable, TrustTier};
/// use tessera_types::ResourceName;
///
/// let table = PolicyTable::reference();
/// assert!(table.policy_for(TrustTier::Tenant).allows(ResourceName::Email));
/// assert!(!table.policy_for(TrustTier::Public).can_execute_arbitrary_code);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyTable {
    internal: PermissionPolicy,
    tenant: PermissionPolicy,
    public: PermissionPolicy,
}

impl PolicyTable {
    /// Builds a table, verifying monotonicity.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] if the tiers are not monotonic, an
    /// internal-only resource is granted without internal access, or a
    /// ceiling is zero.
    pub fn new(
        internal: PermissionPolicy,
        tenant: PermissionPolicy,
        public: PermissionPolicy,
    ) -> Result<Self, PolicyError> {
        let table = Self {
            internal,
            tenant,
            public,
        };
        table.validate()?;
        Ok(table)
    }

    /// The reference envelope.
    #[must_use]
    pub fn reference() -> Self {
        Self {
            internal: PermissionPolicy::reference(TrustTier::Internal),
            tenant: PermissionPolicy::reference(TrustTier::Tenant),
            public: PermissionPolicy::reference(TrustTier::Public),
        }
    }

    /// The reference envelope with `overrides` applied.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] if the result is not a valid table.
    pub fn with_overrides(overrides: &PolicyOverrides) -> Result<Self, PolicyError> {
        Self::new(
            overrides
                .internal
                .apply(PermissionPolicy::reference(TrustTier::Internal)),
            overrides
                .tenant
                .apply(PermissionPolicy::reference(TrustTier::Tenant)),
            overrides
                .public
                .apply(PermissionPolicy::reference(TrustTier::Public)),
        )
    }

    /// Policy for `tier`.
    #[must_use]
    pub fn policy_for(&self, tier: TrustTier) -> &PermissionPolicy {
        match tier {
            TrustTier::Internal => &self.internal,
            TrustTier::Tenant => &self.tenant,
            TrustTier::Public => &self.public,
        }
    }

    fn validate(&self) -> Result<(), PolicyError> {
        for tier in TrustTier::ALL {
            let policy = self.policy_for(tier);
            if policy.max_execution_time_ms == 0 {
                return Err(PolicyError::ZeroCeiling {
                    tier,
                    field: "max_execution_time_ms",
                });
            }
            if policy.max_concurrent_executions == 0 {
                return Err(PolicyError::ZeroCeiling {
                    tier,
                    field: "max_concurrent_executions",
                });
            }
            if !policy.can_access_internal_resources {
                let leaked = policy.allowed_resources & ResourceSet::INTERNAL_ONLY;
                if let Some(resource) = leaked.resources().into_iter().next() {
                    return Err(PolicyError::InternalResourceWithoutAccess { tier, resource });
                }
            }
        }

        for pair in TrustTier::ALL.windows(2) {
            let (lower, higher) = (pair[0], pair[1]);
            if let Some(field) = self.policy_for(lower).exceeds(self.policy_for(higher)) {
                return Err(PolicyError::NotMonotonic {
                    lower,
                    higher,
                    field,
                });
            }
        }
        Ok(())
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::reference()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tessera_types::assert_error_codes;

    #[test]
    fn reference_table_is_valid() {
        let t = PolicyTable::reference();
        assert_eq!(
            PolicyTable::new(
                t.policy_for(TrustTier::Internal).clone(),
                t.policy_for(TrustTier::Tenant).clone(),
                t.policy_for(TrustTier::Public).clone(),
            ),
            Ok(t)
        );
    }

    #[test]
    fn reference_values() {
        let t = PolicyTable::reference();
        let tenant = t.policy_for(TrustTier::Tenant);
        assert_eq!(
            tenant.allowed_resources.resources(),
            vec![ResourceName::Db, ResourceName::Queue, ResourceName::Email]
        );
        assert_eq!(tenant.max_execution_time_ms, 30_000);
        assert_eq!(tenant.max_concurrent_executions, 10);

        let public = t.policy_for(TrustTier::Public);
        assert_eq!(public.allowed_resources, ResourceSet::DB);
        assert_eq!(public.max_execution_time_ms, 10_000);
        assert!(!public.can_execute_arbitrary_code);

        let internal = t.policy_for(TrustTier::Internal);
        assert_eq!(internal.allowed_resources, ResourceSet::all());
        assert!(internal.can_bypass_rate_limit);
    }

    #[test]
    fn subsets_hold_in_tier_order() {
        let t = PolicyTable::reference();
        for pair in TrustTier::ALL.windows(2) {
            let lower = t.policy_for(pair[0]).allowed_resources;
            let higher = t.policy_for(pair[1]).allowed_resources;
            assert!(higher.contains(lower), "{} vs {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn public_code_override_is_accepted() {
        let overrides = PolicyOverrides {
            public: PolicyOverride {
                can_execute_arbitrary_code: Some(true),
                ..PolicyOverride::default()
            },
            ..PolicyOverrides::default()
        };
        let t = PolicyTable::with_overrides(&overrides).expect("valid override");
        assert!(t.policy_for(TrustTier::Public).can_execute_arbitrary_code);
    }

    #[test]
    fn public_larger_than_tenant_is_refused() {
        let overrides = PolicyOverrides {
            public: PolicyOverride {
                max_execution_time_ms: Some(60_000),
                ..PolicyOverride::default()
            },
            ..PolicyOverrides::default()
        };
        assert_eq!(
            PolicyTable::with_overrides(&overrides),
            Err(PolicyError::NotMonotonic {
                lower: TrustTier::Public,
                higher: TrustTier::Tenant,
                field: "max_execution_time_ms",
            })
        );
    }

    #[test]
    fn tenant_resource_not_in_internal_is_refused() {
        let overrides = PolicyOverrides {
            internal: PolicyOverride {
                allowed_resources: Some(vec![
                    ResourceName::Db,
                    ResourceName::Email,
                    ResourceName::Auth,
                ]),
                ..PolicyOverride::default()
            },
            ..PolicyOverrides::default()
        };
        let err = PolicyTable::with_overrides(&overrides).expect_err("queue missing");
        assert!(matches!(
            err,
            PolicyError::NotMonotonic {
                field: "allowed_resources",
                ..
            }
        ));
    }

    #[test]
    fn internal_resource_for_tenant_is_refused() {
        let overrides = PolicyOverrides {
            tenant: PolicyOverride {
                allowed_resources: Some(vec![ResourceName::Db, ResourceName::Gateway]),
                ..PolicyOverride::default()
            },
            ..PolicyOverrides::default()
        };
        assert_eq!(
            PolicyTable::with_overrides(&overrides),
            Err(PolicyError::InternalResourceWithoutAccess {
                tier: TrustTier::Tenant,
                resource: ResourceName::Gateway,
            })
        );
    }

    #[test]
    fn zero_ceiling_is_refused() {
        let overrides = PolicyOverrides {
            public: PolicyOverride {
                max_concurrent_executions: Some(0),
                ..PolicyOverride::default()
            },
            ..PolicyOverrides::default()
        };
        assert!(matches!(
            PolicyTable::with_overrides(&overrides),
            Err(PolicyError::ZeroCeiling { .. })
        ));
    }

    #[test]
    fn override_merge_prefers_later_layer() {
        let mut base = PolicyOverride {
            max_execution_time_ms: Some(5_000),
            can_execute_arbitrary_code: Some(false),
            ..PolicyOverride::default()
        };
        base.merge(&PolicyOverride {
            can_execute_arbitrary_code: Some(true),
            ..PolicyOverride::default()
        });
        assert_eq!(base.max_execution_time_ms, Some(5_000));
        assert_eq!(base.can_execute_arbitrary_code, Some(true));
    }

    #[test]
    fn overrides_parse_from_toml() {
        let parsed: PolicyOverrides = toml::from_str(
            r#"
            [public]
            can_execute_arbitrary_code = true
            max_execution_time_ms = 5000

            [tenant]
            allowed_resources = ["db", "email"]
            "#,
        )
        .expect("parse overrides");
        assert_eq!(parsed.public.max_execution_time_ms, Some(5_000));
        assert_eq!(
            parsed.tenant.allowed_resources,
            Some(vec![ResourceName::Db, ResourceName::Email])
        );
        assert_eq!(parsed.internal, PolicyOverride::default());
    }

    #[test]
    fn error_codes() {
        assert_error_codes(
            &[
                PolicyError::NotMonotonic {
                    lower: TrustTier::Public,
                    higher: TrustTier::Tenant,
                    field: "x",
                },
                PolicyError::InternalResourceWithoutAccess {
                    tier: TrustTier::Public,
                    resource: ResourceName::Auth,
                },
                PolicyError::ZeroCeiling {
                    tier: TrustTier::Public,
                    field: "x",
                },
            ],
            "POLICY_",
        );
    }

    fn arb_override() -> impl Strategy<Value = PolicyOverride> {
        (
            proptest::option::of(proptest::sample::subsequence(
                ResourceName::ALL.to_vec(),
                0..=ResourceName::ALL.len(),
            )),
            proptest::option::of(0u64..200_000),
            proptest::option::of(0u32..200),
            proptest::option::of(any::<bool>()),
            proptest::option::of(any::<bool>()),
            proptest::option::of(any::<bool>()),
        )
            .prop_map(|(r, t, c, a, b, x)| PolicyOverride {
                allowed_resources: r,
                max_execution_time_ms: t,
                max_concurrent_executions: c,
                can_access_internal_resources: a,
                can_bypass_rate_limit: b,
                can_execute_arbitrary_code: x,
            })
    }

    proptest! {
        #[test]
        fn accepted_tables_are_monotonic(
            internal in arb_override(),
            tenant in arb_override(),
            public in arb_override(),
        ) {
            let overrides = PolicyOverrides { internal, tenant, public };
            if let Ok(t) = PolicyTable::with_overrides(&overrides) {
                for pair in TrustTier::ALL.windows(2) {
                    let lo = t.policy_for(pair[0]);
                    let hi = t.policy_for(pair[1]);
                    prop_assert!(hi.allowed_resources.contains(lo.allowed_resources));
                    prop_assert!(lo.max_execution_time_ms <= hi.max_execution_time_ms);
                    prop_assert!(lo.max_concurrent_executions <= hi.max_concurrent_executions);
                    prop_assert!(!lo.can_bypass_rate_limit || hi.can_bypass_rate_limit);
                    prop_assert!(!lo.can_execute_arbitrary_code || hi.can_execute_arbitrary_code);
                }
            }
        }
    }
}
