//! Tier and namespace resolution.
//!
//! Rules, first match wins:
//!
//! | # | Caller | Tier | Namespace |
//! |---|--------|------|-----------|
//! | a | unauthenticated | public | `session:<request id>` |
//! | b | role `admin` or `service` | internal | `*` |
//! | c | role `tenant` or a `tenant:*` capability, with a tenant id | tenant | `tenant:<tenant id>` |
//! | d | any other principal | public | `user:<principal id>` |
//!
//! A tenant claim without a tenant id falls through to rule d.

use crate::TrustTier;
use tessera_types::{CallerContext, Namespace, Principal, Role};

const TENANT_CAPABILITY_PREFIX: &str = "tenant:";

/// Tier and namespace derived for one caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Derived tier.
    pub tier: TrustTier,
    /// Derived namespace.
    pub namespace: Namespace,
}

/// Resolves tier and namespace together.
///
/// # Example
///
/// ```
/// use tessera_auth::{resolve, TrustTier};
/// use tessera_types::{CallerContext, Principal, RequestId, Role};
///
/// let ctx = CallerContext::authenticated(
///     RequestId::new(),
///     Principal::new("alice").with_role(Role::Tenant).with_tenant("acme"),
/// );
/// let r = resolve(&ctx);
/// assert_eq!(r.tier, TrustTier::Tenant);
/// assert_eq!(r.namespace.as_str(), "tenant:acme");
/// ```
#[must_use]
pub fn resolve(ctx: &CallerContext) -> Resolution {
    let resolution = match ctx.principal.as_ref() {
        None => Resolution {
            tier: TrustTier::Public,
            namespace: Namespace::session(&ctx.request_id),
        },
        Some(p) if is_internal(p) => Resolution {
            tier: TrustTier::Internal,
            namespace: Namespace::unrestricted(),
        },
        Some(p) => match tenant_of(p) {
            Some(tenant_id) => Resolution {
                tier: TrustTier::Tenant,
                namespace: Namespace::tenant(tenant_id),
            },
            None => Resolution {
                tier: TrustTier::Public,
                namespace: Namespace::user(p.id().as_str()),
            },
        },
    };
    tracing::debug!(
        request = %ctx.request_id,
        tier = %resolution.tier,
        namespace = %resolution.namespace,
        "resolved caller"
    );
    resolution
}

/// Tier for `ctx`. Same as `resolve(ctx).tier`.
#[must_use]
pub fn resolve_tier(ctx: &CallerContext) -> TrustTier {
    resolve(ctx).tier
}

/// Namespace for `ctx`. Same as `resolve(ctx).namespace`.
#[must_use]
pub fn resolve_namespace(ctx: &CallerContext) -> Namespace {
    resolve(ctx).namespace
}

fn is_internal(p: &Principal) -> bool {
    p.has_role(Role::Admin) || p.has_role(Role::Service)
}

fn tenant_of(p: &Principal) -> Option<&str> {
    let claims_tenant =
        p.has_role(Role::Tenant) || p.has_capability_prefix(TENANT_CAPABILITY_PREFIX);
    if claims_tenant {
        p.tenant_id()
    } else {
        None
    }
}
