//! Output of the authorization gate.

use crate::TrustTier;
use serde::{Deserialize, Serialize};
use tessera_types::{Namespace, ResourceName};

/// Why a request was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenialReason {
    /// The tier may not run code in a restricted deployment.
    PlanRestricted,
    /// Some requested resources are outside the tier's envelope.
    ResourcesDenied {
        /// Every denied resource, in request order.
        resources: Vec<ResourceName>,
    },
    /// The requested timeout is above the tier ceiling.
    TimeoutExceeded {
        /// Requested timeout.
        requested: u64,
        /// Tier ceiling.
        limit: u64,
    },
}

impl DenialReason {
    /// Human-readable reason.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::PlanRestricted => "Code execution is not available on your plan.".to_string(),
            Self::ResourcesDenied { resources } => {
                let names: Vec<&str> = resources.iter().map(|r| r.as_str()).collect();
                format!("Access denied to bindings: {}", names.join(", "))
            }
            Self::TimeoutExceeded { requested, limit } => {
                format!("Timeout {requested} exceeds limit {limit}")
            }
        }
    }
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

/// Result of authorizing one request. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationDecision {
    /// Whether the request may run.
    pub admitted: bool,
    /// Human-readable reason when rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// `min(requested ?? ceiling, ceiling)`.
    pub effective_timeout_ms: u64,
    /// Namespace the execution is confined to.
    pub resolved_namespace: Namespace,
    /// Tier the decision was made under.
    pub tier: TrustTier,
    /// Machine-readable reason when rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denial: Option<DenialReason>,
}

impl AuthorizationDecision {
    pub(crate) fn admit(tier: TrustTier, namespace: Namespace, effective_timeout_ms: u64) -> Self {
        Self {
            admitted: true,
            reason: None,
            effective_timeout_ms,
            resolved_namespace: namespace,
            tier,
            denial: None,
        }
    }

    pub(crate) fn deny(
        tier: TrustTier,
        namespace: Namespace,
        effective_timeout_ms: u64,
        denial: DenialReason,
    ) -> Self {
        Self {
            admitted: false,
            reason: Some(denial.message()),
            effective_timeout_ms,
            resolved_namespace: namespace,
            tier,
            denial: Some(denial),
        }
    }
}
