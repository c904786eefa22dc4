//! Trust tiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse trust classification of a caller.
///
/// Tiers are derived by the resolver and never accepted from a client.
/// The ordering is `Public < Tenant < Internal`; a higher tier's envelope
/// always contains a lower tier's.
///
/// # Example
///
/// ```
/// use tessera_auth::TrustTier;
///
/// assert!(TrustTier::Public < TrustTier::Tenant);
/// assert!(TrustTier::Tenant < TrustTier::Internal);
/// assert_eq!("tenant".parse::<TrustTier>(), Ok(TrustTier::Tenant));
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TrustTier {
    /// Untrusted callers.
    Public,
    /// Authenticated tenant members.
    Tenant,
    /// Platform services and operators.
    Internal,
}

impl TrustTier {
    /// All tiers, least trusted first.
    pub const ALL: [TrustTier; 3] = [Self::Public, Self::Tenant, Self::Internal];

    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Tenant => "tenant",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "tenant" => Ok(Self::Tenant),
            "internal" => Ok(Self::Internal),
            other => Err(format!("unknown trust tier: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_sorted() {
        let mut sorted = TrustTier::ALL;
        sorted.sort();
        assert_eq!(sorted, TrustTier::ALL);
    }

    #[test]
    fn serde_lowercase() {
        let json = serde_json::to_string(&TrustTier::Internal).expect("serialize");
        assert_eq!(json, "\"internal\"");
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!("root".parse::<TrustTier>().is_err());
    }
}
