//! Bit-set of [`ResourceName`]s.
//!
//! A [`ResourceSet`] is the `allowed_resources` half of a permission
//! policy. Set algebra is plain bit algebra:
//!
//! ```
//! use tessera_auth::ResourceSet;
//! use tessera_types::ResourceName;
//!
//! let tenant = ResourceSet::DB | ResourceSet::EMAIL | ResourceSet::QUEUE;
//! let public = ResourceSet::DB;
//!
//! assert!(tenant.contains(public));
//! assert!(tenant.allows(ResourceName::Queue));
//! assert!(!tenant.allows(ResourceName::Auth));
//! ```
//!
//! On the wire and in config files a set is a list of lowercase names,
//! e.g. `["db", "email", "queue"]`.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tessera_types::ResourceName;

bitflags! {
    /// Set of resources a tier may inject into an execution.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceSet: u8 {
        /// `db`
        const DB      = 0b0000_0001;
        /// `kv`
        const KV      = 0b0000_0010;
        /// `queue`
        const QUEUE   = 0b0000_0100;
        /// `email`
        const EMAIL   = 0b0000_1000;
        /// `ai`
        const AI      = 0b0001_0000;
        /// `auth` (internal only)
        const AUTH    = 0b0010_0000;
        /// `gateway` (internal only)
        const GATEWAY = 0b0100_0000;
    }
}

impl ResourceSet {
    /// Resources only internal callers may receive.
    pub const INTERNAL_ONLY: Self = Self::AUTH.union(Self::GATEWAY);

    /// The flag for a single resource.
    #[must_use]
    pub const fn of(resource: ResourceName) -> Self {
        match resource {
            ResourceName::Db => Self::DB,
            ResourceName::Kv => Self::KV,
            ResourceName::Queue => Self::QUEUE,
            ResourceName::Email => Self::EMAIL,
            ResourceName::Ai => Self::AI,
            ResourceName::Auth => Self::AUTH,
            ResourceName::Gateway => Self::GATEWAY,
        }
    }

    /// Returns `true` if `resource` is in the set.
    #[must_use]
    pub fn allows(self, resource: ResourceName) -> bool {
        self.contains(Self::of(resource))
    }

    /// Members of the set in [`ResourceName::ALL`] order.
    #[must_use]
    pub fn resources(self) -> Vec<ResourceName> {
        ResourceName::ALL
            .into_iter()
            .filter(|r| self.allows(*r))
            .collect()
    }
}

impl FromIterator<ResourceName> for ResourceSet {
    fn from_iter<I: IntoIterator<Item = ResourceName>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |acc, r| acc | Self::of(r))
    }
}

impl Serialize for ResourceSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.resources().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResourceSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<ResourceName>::deserialize(deserializer)?;
        Ok(names.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_resource_has_a_distinct_flag() {
        let all: ResourceSet = ResourceName::ALL.into_iter().collect();
        assert_eq!(all, ResourceSet::all());
        assert_eq!(all.resources(), ResourceName::ALL.to_vec());
    }

    #[test]
    fn internal_only_matches_resource_name() {
        for r in ResourceName::ALL {
            assert_eq!(
                ResourceSet::INTERNAL_ONLY.allows(r),
                r.is_internal_only(),
                "{r}"
            );
        }
    }

    #[test]
    fn serde_as_name_list() {
        let set = ResourceSet::EMAIL | ResourceSet::DB;
        let json = serde_json::to_string(&set).expect("serialize");
        assert_eq!(json, r#"["db","email"]"#);
        let back: ResourceSet = serde_json::from_str(r#"["email","db","db"]"#).expect("parse");
        assert_eq!(back, set);
    }
}
