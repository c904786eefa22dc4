//! Backing-service handles.
//!
//! Executed code never talks to a backend directly. It receives a
//! [`CapabilityTable`] of [`ResourceHandle`]s that were scoped to its
//! namespace before injection (see [`crate::scope`]).
//!
//! Every operation takes and returns a JSON object:
//!
//! ```text
//! invoke("put", {"key": "a", "value": 1})  →  {"ok": true}
//! ```

mod memory;

pub use memory::{MemoryKv, MemoryQueue, MemoryTable, OutboxMailer, SentEmail};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tessera_types::{ErrorCode, ResourceName};
use thiserror::Error;

/// Errors raised by resource operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// The handle does not support the operation.
    #[error("unknown operation '{operation}' on {resource}")]
    UnknownOperation {
        /// Resource the call was made on.
        resource: ResourceName,
        /// Requested operation.
        operation: String,
    },

    /// Arguments are missing or have the wrong shape.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A requested resource has no backing handle.
    #[error("resource '{0}' is not provisioned")]
    Unavailable(ResourceName),

    /// The backend failed.
    #[error("backend error: {0}")]
    Backend(String),
}

impl ResourceError {
    /// Creates an invalid argument error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl ErrorCode for ResourceError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownOperation { .. } => "RESOURCE_UNKNOWN_OPERATION",
            Self::InvalidArgument(_) => "RESOURCE_INVALID_ARGUMENT",
            Self::Unavailable(_) => "RESOURCE_UNAVAILABLE",
            Self::Backend(_) => "RESOURCE_BACKEND",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// A handle to a backing service.
///
/// Implementations must be cheap to share; they are held in `Arc`s and
/// invoked from the sandbox thread.
#[async_trait]
pub trait ResourceHandle: Send + Sync + fmt::Debug {
    /// Which resource this handle serves.
    fn resource(&self) -> ResourceName;

    /// Operation names exposed to executed code.
    fn operations(&self) -> &'static [&'static str];

    /// Runs `operation` with a JSON object of arguments.
    async fn invoke(&self, operation: &str, args: Value) -> Result<Value, ResourceError>;
}

/// Per-request set of raw (unscoped) handles, keyed by resource.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    handles: HashMap<ResourceName, Arc<dyn ResourceHandle>>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with fresh in-memory `db`, `kv`, `queue` and `email`
    /// backends.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new()
            .with(Arc::new(MemoryTable::new()))
            .with(Arc::new(MemoryKv::new()))
            .with(Arc::new(MemoryQueue::new()))
            .with(Arc::new(OutboxMailer::new()))
    }

    /// Adds or replaces the handle for its resource.
    #[must_use]
    pub fn with(mut self, handle: Arc<dyn ResourceHandle>) -> Self {
        self.insert(handle);
        self
    }

    /// Adds or replaces the handle for its resource.
    pub fn insert(&mut self, handle: Arc<dyn ResourceHandle>) {
        self.handles.insert(handle.resource(), handle);
    }

    /// Handle for `name`, if provisioned.
    #[must_use]
    pub fn get(&self, name: ResourceName) -> Option<&Arc<dyn ResourceHandle>> {
        self.handles.get(&name)
    }
}

/// Handles injected into one execution, already scoped.
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    entries: BTreeMap<ResourceName, Arc<dyn ResourceHandle>>,
}

impl CapabilityTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handle under `name`.
    pub fn insert(&mut self, name: ResourceName, handle: Arc<dyn ResourceHandle>) {
        self.entries.insert(name, handle);
    }

    /// Handle for `name`.
    #[must_use]
    pub fn get(&self, name: ResourceName) -> Option<&Arc<dyn ResourceHandle>> {
        self.entries.get(&name)
    }

    /// Injected resource names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<ResourceName> {
        self.entries.keys().copied().collect()
    }

    /// Iterates over `(name, handle)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceName, &Arc<dyn ResourceHandle>)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Number of injected resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is injected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads a required string field from an argument object.
pub(crate) fn str_arg<'a>(args: &'a Value, field: &str) -> Result<&'a str, ResourceError> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ResourceError::invalid(format!("'{field}' must be a string")))
}
