//! Trust tiers, permission policy and the authorization gate.
//!
//! ```text
//! CallerContext ──resolve──► (TrustTier, Namespace)
//!                                  │
//!                PolicyTable ──policy_for──► PermissionPolicy
//!                                  │
//! ExecutionRequest ──authorize──► AuthorizationDecision
//! ```
//!
//! Everything in this crate is pure and synchronous. The stateful checks
//! (rate and concurrency limits) live in `tessera-runtime`.

mod decision;
mod error;
mod gate;
mod policy;
mod resolver;
mod resource_set;
mod tier;

pub use decision::{AuthorizationDecision, DenialReason};
pub use error::AuthorizationDenied;
pub use gate::{authorize, DeploymentMode};
pub use policy::{PermissionPolicy, PolicyError, PolicyOverride, PolicyOverrides, PolicyTable};
pub use resolver::{resolve, resolve_namespace, resolve_tier, Resolution};
pub use resource_set::ResourceSet;
pub use tier::TrustTier;
