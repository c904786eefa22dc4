//! Principal (caller identity) types.
//!
//! A [`Principal`] is what the upstream authentication layer established
//! about a caller: who they are, which roles they hold, which capability
//! strings were granted, and (for tenant members) which tenant profile
//! they belong to.
//!
//! Identity is kept separate from trust: a principal never carries a
//! tier. The tier is *derived* from the principal by the resolver in
//! `tessera-auth`, so a client can never ask for one directly.

use crate::{PrincipalId, RequestId};
use serde::{Deserialize, Serialize};

/// Role attached to an authenticated principal.
///
/// Unknown role strings deserialize to [`Role::Other`] so that new roles
/// introduced upstream never widen access by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Platform operator.
    Admin,
    /// Internal service account.
    Service,
    /// Member of a tenant organisation.
    Tenant,
    /// Ordinary end user.
    User,
    /// Any role this crate does not know about.
    #[serde(other)]
    Other,
}

impl Role {
    /// Parses a role name, mapping unknown names to [`Role::Other`].
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_types::Role;
    ///
    /// assert_eq!(Role::parse("ADMIN"), Role::Admin);
    /// assert_eq!(Role::parse("auditor"), Role::Other);
    /// ```
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "admin" => Self::Admin,
            "service" => Self::Service,
            "tenant" => Self::Tenant,
            "user" => Self::User,
            _ => Self::Other,
        }
    }
}

/// An authenticated caller.
///
/// # Example
///
/// ```
/// use tessera_types::{Principal, Role};
///
/// let member = Principal::new("alice")
///     .with_role(Role::Tenant)
///     .with_tenant("acme");
///
/// assert!(member.has_role(Role::Tenant));
/// assert_eq!(member.tenant_id(), Some("acme"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    id: PrincipalId,
    #[serde(default)]
    roles: Vec<Role>,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tenant_id: Option<String>,
}

impl Principal {
    /// Creates a principal with no roles, capabilities or tenant.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: PrincipalId::new(id),
            roles: Vec::new(),
            capabilities: Vec::new(),
            tenant_id: None,
        }
    }

    /// Adds a role.
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
        self
    }

    /// Adds a capability string (e.g. `"tenant:write"`).
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Sets the tenant identifier from the principal's profile.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Returns the principal identifier.
    #[must_use]
    pub fn id(&self) -> &PrincipalId {
        &self.id
    }

    /// Returns the roles held by this principal.
    #[must_use]
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Returns the capability strings granted to this principal.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Returns `true` if the principal holds `role`.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Returns `true` if any capability starts with `prefix`.
    #[must_use]
    pub fn has_capability_prefix(&self, prefix: &str) -> bool {
        self.capabilities.iter().any(|c| c.starts_with(prefix))
    }

    /// Returns the tenant id if present and non-blank.
    ///
    /// A blank tenant id is treated as absent.
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Everything the core knows about the caller of one request.
///
/// Built by the transport adapter after authentication. `principal` is
/// `None` for unauthenticated callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerContext {
    /// Identifier of the request being served.
    pub request_id: RequestId,
    /// The authenticated principal, if any.
    #[serde(default)]
    pub principal: Option<Principal>,
}

impl CallerContext {
    /// Context for an unauthenticated caller.
    #[must_use]
    pub fn anonymous(request_id: RequestId) -> Self {
        Self {
            request_id,
            principal: None,
        }
    }

    /// Context for an authenticated caller.
    #[must_use]
    pub fn authenticated(request_id: RequestId, principal: Principal) -> Self {
        Self {
            request_id,
            principal: Some(principal),
        }
    }

    /// Returns `true` if the caller is authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }
}
