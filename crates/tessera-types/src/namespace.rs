//! Isolation namespaces.
//!
//! Every admitted execution runs inside exactly one [`Namespace`]. All
//! resource access during that execution is confined to it by the
//! scoping proxy in `tessera-runtime`.
//!
//! # Forms
//!
//! | Form | Who |
//! |------|-----|
//! | `*` | internal callers (unrestricted) |
//! | `tenant:<id>` | tenant members |
//! | `user:<id>` | other authenticated principals |
//! | `session:<uuid>` | unauthenticated callers, one per request |
//!
//! Identifiers are percent-escaped before being embedded. `%`, `/`, `:`
//! and control characters are encoded, so two distinct identities never
//! produce the same namespace and a namespace never contains the `/`
//! separator used for key prefixes.

use crate::RequestId;
use serde::{Deserialize, Serialize};
use std::fmt;

const UNRESTRICTED: &str = "*";

/// The kind of isolation domain a [`Namespace`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
    /// `*`
    Unrestricted,
    /// `tenant:<id>`
    Tenant,
    /// `user:<id>`
    User,
    /// `session:<uuid>`
    Session,
}

impl NamespaceKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Unrestricted => "",
            Self::Tenant => "tenant:",
            Self::User => "user:",
            Self::Session => "session:",
        }
    }
}

/// An opaque isolation-domain identifier.
///
/// # Example
///
/// ```
/// use tessera_types::Namespace;
///
/// let ns = Namespace::tenant("acme");
/// assert_eq!(ns.as_str(), "tenant:acme");
/// assert_eq!(ns.key_prefix(), Some("tenant:acme/".to_string()));
///
/// // Separators inside identifiers are escaped.
/// assert_eq!(Namespace::user("a/b").as_str(), "user:a%2Fb");
///
/// assert!(Namespace::unrestricted().is_unrestricted());
/// assert_eq!(Namespace::unrestricted().key_prefix(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// The unrestricted namespace `*`.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self(UNRESTRICTED.to_string())
    }

    /// `tenant:<id>` with `id` escaped.
    #[must_use]
    pub fn tenant(id: &str) -> Self {
        Self::scoped(NamespaceKind::Tenant, id)
    }

    /// `user:<id>` with `id` escaped.
    #[must_use]
    pub fn user(id: &str) -> Self {
        Self::scoped(NamespaceKind::User, id)
    }

    /// `session:<uuid>` for an unauthenticated request.
    #[must_use]
    pub fn session(request_id: &RequestId) -> Self {
        Self::scoped(NamespaceKind::Session, &request_id.uuid().to_string())
    }

    fn scoped(kind: NamespaceKind, id: &str) -> Self {
        let mut s = String::with_capacity(kind.prefix().len() + id.len());
        s.push_str(kind.prefix());
        escape_into(id, &mut s);
        Self(s)
    }

    /// Returns the namespace as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the kind of this namespace.
    #[must_use]
    pub fn kind(&self) -> NamespaceKind {
        if self.0 == UNRESTRICTED {
            NamespaceKind::Unrestricted
        } else if self.0.starts_with(NamespaceKind::Tenant.prefix()) {
            NamespaceKind::Tenant
        } else if self.0.starts_with(NamespaceKind::User.prefix()) {
            NamespaceKind::User
        } else {
            NamespaceKind::Session
        }
    }

    /// Returns `true` for `*`.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.0 == UNRESTRICTED
    }

    /// Key prefix used by prefix-scoped resources: `<namespace>/`.
    ///
    /// `None` for the unrestricted namespace, which is never prefixed.
    #[must_use]
    pub fn key_prefix(&self) -> Option<String> {
        if self.is_unrestricted() {
            None
        } else {
            Some(format!("{}/", self.0))
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

/// Error returned when a string is not a well-formed namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidNamespace(pub String);

impl fmt::Display for InvalidNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid namespace: {:?}", self.0)
    }
}

impl std::error::Error for InvalidNamespace {}

impl TryFrom<String> for Namespace {
    type Error = InvalidNamespace;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s == UNRESTRICTED {
            return Ok(Self(s));
        }
        let body = [
            NamespaceKind::Tenant,
            NamespaceKind::User,
            NamespaceKind::Session,
        ]
        .iter()
        .find_map(|k| s.strip_prefix(k.prefix()));
        match body {
            Some(b) if is_escaped(b) => Ok(Self(s)),
            _ => Err(InvalidNamespace(s)),
        }
    }
}

impl std::str::FromStr for Namespace {
    type Err = InvalidNamespace;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

fn needs_escape(c: char) -> bool {
    matches!(c, '%' | '/' | ':') || c.is_control()
}

fn escape_into(id: &str, out: &mut String) {
    for c in id.chars() {
        if needs_escape(c) {
            let mut buf = [0u8; 4];
            for b in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{b:02X}"));
            }
        } else {
            out.push(c);
        }
    }
}

/// Checks that `body` could have been produced by [`escape_into`].
fn is_escaped(body: &str) -> bool {
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes.get(i + 1..i + 3);
                if !hex.is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit)) {
                    return false;
                }
                i += 3;
            }
            b'/' | b':' => return false,
            b if b.is_ascii_control() => return false,
            _ => i += 1,
        }
    }
    true
}
