//! Names of the backing services executed code may reach.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A resource (binding) that can be injected into an execution.
///
/// The set is closed: adding a resource means adding a variant here, which
/// forces every policy and scoping rule to consider it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceName {
    /// Relational storage.
    Db,
    /// Key-value storage.
    Kv,
    /// Message queue.
    Queue,
    /// Outbound notification.
    Email,
    /// Model inference.
    Ai,
    /// Identity service. Internal only.
    Auth,
    /// Service gateway. Internal only.
    Gateway,
}

impl ResourceName {
    /// Every resource, in declaration order.
    pub const ALL: [ResourceName; 7] = [
        Self::Db,
        Self::Kv,
        Self::Queue,
        Self::Email,
        Self::Ai,
        Self::Auth,
        Self::Gateway,
    ];

    /// Wire name of the resource.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Db => "db",
            Self::Kv => "kv",
            Self::Queue => "queue",
            Self::Email => "email",
            Self::Ai => "ai",
            Self::Auth => "auth",
            Self::Gateway => "gateway",
        }
    }

    /// Returns `true` for resources only internal callers may receive.
    #[must_use]
    pub fn is_internal_only(self) -> bool {
        matches!(self, Self::Auth | Self::Gateway)
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unknown resource name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownResource(pub String);

impl fmt::Display for UnknownResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown resource: {}", self.0)
    }
}

impl std::error::Error for UnknownResource {}

impl FromStr for ResourceName {
    type Err = UnknownResource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == lower)
            .ok_or_else(|| UnknownResource(s.to_string()))
    }
}
