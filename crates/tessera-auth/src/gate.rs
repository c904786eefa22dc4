//! Execution authorization gate.
//!
//! [`authorize`] is pure: the same inputs always produce the same
//! [`AuthorizationDecision`]. Checks run in a fixed order and the first
//! failure wins:
//!
//! 1. plan restriction (restricted deployments only)
//! 2. resources outside the envelope
//! 3. timeout above the ceiling
//!
//! Rate limiting is a separate check owned by the runtime.

use crate::{AuthorizationDecision, DenialReason, PermissionPolicy, TrustTier};
use serde::{Deserialize, Serialize};
use tessera_types::{ExecutionRequest, Namespace, ResourceName};

/// Whether the arbitrary-code flag of a policy is enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Tiers without `can_execute_arbitrary_code` are refused.
    #[default]
    Restricted,
    /// The arbitrary-code flag is not enforced.
    Open,
}

impl std::str::FromStr for DeploymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "restricted" => Ok(Self::Restricted),
            "open" => Ok(Self::Open),
            other => Err(format!("unknown deployment mode: {other}")),
        }
    }
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Restricted => f.write_str("restricted"),
            Self::Open => f.write_str("open"),
        }
    }
}

/// Decides whether `request` may run under `tier`'s `policy`.
///
/// # Example
///
/// ```
/// use tessera_auth::{authorize, DeploymentMode, PolicyTable, TrustTier};
/// use tessera_types::{ExecutionRequest, Namespace, ResourceName};
///
/// let table = PolicyTable::reference();
/// let req = ExecutionRequest::new("return 1")
///     .with_resource(ResourceName::Auth)
///     .with_resource(ResourceName::Gateway);
///
/// let d = authorize(
///     &req,
///     TrustTier::Tenant,
///     &Namespace::tenant("acme"),
///     table.policy_for(TrustTier::Tenant),
///     DeploymentMode::Restricted,
/// );
/// assert!(!d.admitted);
/// let reason = d.reason.unwrap();
/// assert!(reason.contains("auth") && reason.contains("gateway"));
/// ```
#[must_use]
pub fn authorize(
    request: &ExecutionRequest,
    tier: TrustTier,
    namespace: &Namespace,
    policy: &PermissionPolicy,
    mode: DeploymentMode,
) -> AuthorizationDecision {
    let limit = policy.max_execution_time_ms;
    let effective = request.timeout_ms.unwrap_or(limit).min(limit);

    let denial = check(request, policy, mode);
    match denial {
        None => {
            tracing::debug!(%tier, %namespace, effective_timeout_ms = effective, "admitted");
            AuthorizationDecision::admit(tier, namespace.clone(), effective)
        }
        Some(reason) => {
            tracing::debug!(%tier, %namespace, %reason, "denied");
            AuthorizationDecision::deny(tier, namespace.clone(), effective, reason)
        }
    }
}

fn check(
    request: &ExecutionRequest,
    policy: &PermissionPolicy,
    mode: DeploymentMode,
) -> Option<DenialReason> {
    if mode == DeploymentMode::Restricted && !policy.can_execute_arbitrary_code {
        return Some(DenialReason::PlanRestricted);
    }

    let mut denied: Vec<ResourceName> = Vec::new();
    for r in &request.requested_resources {
        if !policy.allows(*r) && !denied.contains(r) {
            denied.push(*r);
        }
    }
    if !denied.is_empty() {
        return Some(DenialReason::ResourcesDenied { resources: denied });
    }

    match request.timeout_ms {
        Some(requested) if requested > policy.max_execution_time_ms => {
            Some(DenialReason::TimeoutExceeded {
                requested,
                limit: policy.max_execution_time_ms,
            })
        }
        _ => None,
    }
}
