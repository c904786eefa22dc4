//! Identifier types.
//!
//! Request identifiers are generated locally (UUID v4). Principal
//! identifiers come from the upstream identity provider and are carried
//! verbatim as strings.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for one code-execution request.
///
/// Unauthenticated callers are isolated per request, so this id also
/// names their ephemeral `session:` namespace.
///
/// # Example
///
/// ```
/// use tessera_types::RequestId;
///
/// let a = RequestId::new();
/// let b = RequestId::new();
/// assert_ne!(a, b);
/// assert!(a.to_string().starts_with("req:"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

#[allow(clippy::new_without_default)] // Default intentionally not implemented - ids are minted explicitly per request
impl RequestId {
    /// Creates a new [`RequestId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

// NOTE: RequestId intentionally does NOT implement Default.
// A defaulted id would silently merge unrelated anonymous sessions.

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req:{}", self.0)
    }
}

/// Identifier of an authenticated principal, as issued by the identity
/// provider.
///
/// # Example
///
/// ```
/// use tessera_types::PrincipalId;
///
/// let id = PrincipalId::new("alice");
/// assert_eq!(id.as_str(), "alice");
/// assert_eq!(id.to_string(), "principal:alice");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Wraps a provider-issued identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "principal:{}", self.0)
    }
}
