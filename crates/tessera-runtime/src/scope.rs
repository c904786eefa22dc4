//! Resource scoping proxy.
//!
//! Wraps a raw backend handle so that everything executed code does
//! through it stays inside one [`Namespace`]. Each resource has an
//! explicit rule:
//!
//! | Resource | Rule |
//! |----------|------|
//! | `db` | partition on the `_namespace` column |
//! | `kv` | `<namespace>/` prefix on `key` and `prefix` |
//! | `queue` | `<namespace>/` prefix on `queue` |
//! | `email`, `ai`, `auth`, `gateway` | passed through |
//!
//! The unrestricted namespace `*` always gets the raw handle.
//!
//! Rewrites are applied to arguments before the call and to results
//! after it, so identifiers guessed by the caller can never name another
//! namespace's data.

use crate::resource::{CapabilityTable, ResourceError, ResourceHandle, ResourceRegistry};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tessera_types::{Namespace, ResourceName};

/// Column that carries the owning namespace of a `db` row.
pub const NAMESPACE_COLUMN: &str = "_namespace";

/// How a handle is confined to a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeRule {
    /// Calls are forwarded unchanged.
    Passthrough,
    /// Rows are tagged and filtered by [`NAMESPACE_COLUMN`].
    Partition,
    /// The listed string arguments are prefixed with `<namespace>/`.
    Prefix {
        /// Argument fields that name keys.
        fields: &'static [&'static str],
    },
}

/// The confinement rule for `resource`.
#[must_use]
pub fn rule_for(resource: ResourceName) -> ScopeRule {
    match resource {
        ResourceName::Db => ScopeRule::Partition,
        ResourceName::Kv => ScopeRule::Prefix {
            fields: &["key", "prefix"],
        },
        ResourceName::Queue => ScopeRule::Prefix { fields: &["queue"] },
        ResourceName::Email | ResourceName::Ai | ResourceName::Auth | ResourceName::Gateway => {
            ScopeRule::Passthrough
        }
    }
}

/// A handle confined to one namespace.
#[derive(Debug)]
pub struct ScopedHandle {
    inner: Arc<dyn ResourceHandle>,
    namespace: Namespace,
    rule: ScopeRule,
}

/// Wraps `raw` for use under `namespace`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tessera_runtime::resource::{MemoryKv, ResourceHandle};
/// use tessera_runtime::scope::{scope, ScopeRule};
/// use tessera_types::{Namespace, ResourceName};
///
/// let raw: Arc<dyn ResourceHandle> = Arc::new(MemoryKv::new());
/// let scoped = scope(ResourceName::Kv, Arc::clone(&raw), &Namespace::tenant("acme"));
/// assert!(matches!(scoped.rule(), ScopeRule::Prefix { .. }));
///
/// let open = scope(ResourceName::Kv, raw, &Namespace::unrestricted());
/// assert_eq!(open.rule(), ScopeRule::Passthrough);
/// ```
#[must_use]
pub fn scope(resource: ResourceName, raw: Arc<dyn ResourceHandle>, namespace: &Namespace) -> ScopedHandle {
    let rule = if namespace.is_unrestricted() {
        ScopeRule::Passthrough
    } else {
        rule_for(resource)
    };
    ScopedHandle {
        inner: raw,
        namespace: namespace.clone(),
        rule,
    }
}

/// Builds the capability table for one execution.
///
/// Only `requested` resources are injected, each scoped to `namespace`.
///
/// # Errors
///
/// Returns [`ResourceError::Unavailable`] when a requested resource has no
/// handle in `registry`.
pub fn scope_capabilities(
    registry: &ResourceRegistry,
    requested: &[ResourceName],
    namespace: &Namespace,
) -> Result<CapabilityTable, ResourceError> {
    let mut table = CapabilityTable::new();
    for &name in requested {
        if table.get(name).is_some() {
            continue;
        }
        let raw = registry
            .get(name)
            .ok_or(ResourceError::Unavailable(name))?;
        let handle: Arc<dyn ResourceHandle> = if namespace.is_unrestricted() {
            Arc::clone(raw)
        } else {
            Arc::new(scope(name, Arc::clone(raw), namespace))
        };
        table.insert(name, handle);
    }
    tracing::debug!(%namespace, resources = ?table.names(), "scoped capabilities");
    Ok(table)
}

impl ScopedHandle {
    /// The rule in effect.
    #[must_use]
    pub fn rule(&self) -> ScopeRule {
        self.rule
    }

    /// The namespace this handle is confined to.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The wrapped raw handle.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn ResourceHandle> {
        &self.inner
    }

    fn prefix(&self) -> String {
        format!("{}/", self.namespace)
    }

    fn partition_args(&self, args: &mut Map<String, Value>) -> Result<(), ResourceError> {
        let tag = Value::String(self.namespace.to_string());

        match args.get_mut("row") {
            None | Some(Value::Null) => {}
            Some(Value::Object(row)) => {
                row.insert(NAMESPACE_COLUMN.to_string(), tag.clone());
            }
            Some(_) => return Err(ResourceError::invalid("'row' must be an object")),
        }

        match args.get_mut("rows") {
            None | Some(Value::Null) => {}
            Some(Value::Array(rows)) => {
                for row in rows {
                    let row = row
                        .as_object_mut()
                        .ok_or_else(|| ResourceError::invalid("'rows' must contain objects"))?;
                    row.insert(NAMESPACE_COLUMN.to_string(), tag.clone());
                }
            }
            Some(_) => return Err(ResourceError::invalid("'rows' must be an array")),
        }

        match args.get_mut("set") {
            None | Some(Value::Null) => {}
            Some(Value::Object(set)) => {
                set.remove(NAMESPACE_COLUMN);
            }
            Some(_) => return Err(ResourceError::invalid("'set' must be an object")),
        }

        let filter = args
            .entry("where")
            .or_insert_with(|| Value::Object(Map::new()));
        if filter.is_null() {
            *filter = Value::Object(Map::new());
        }
        let filter = filter
            .as_object_mut()
            .ok_or_else(|| ResourceError::invalid("'where' must be an object"))?;
        filter.insert(NAMESPACE_COLUMN.to_string(), tag);
        Ok(())
    }

    fn prefix_args(
        &self,
        args: &mut Map<String, Value>,
        fields: &[&str],
    ) -> Result<(), ResourceError> {
        let prefix = self.prefix();
        for field in fields {
            let scoped = match args.get(*field) {
                None | Some(Value::Null) => prefix.clone(),
                Some(Value::String(s)) => format!("{prefix}{s}"),
                Some(_) => {
                    return Err(ResourceError::invalid(format!("'{field}' must be a string")))
                }
            };
            args.insert((*field).to_string(), Value::String(scoped));
        }
        Ok(())
    }

    fn strip_partition(result: &mut Value) {
        if let Some(rows) = result.get_mut("rows").and_then(Value::as_array_mut) {
            for row in rows.iter_mut().filter_map(Value::as_object_mut) {
                row.remove(NAMESPACE_COLUMN);
            }
        }
    }

    fn strip_prefix(&self, result: &mut Value, fields: &[&str]) {
        let prefix = self.prefix();
        let Some(obj) = result.as_object_mut() else {
            return;
        };
        for field in fields {
            if let Some(v) = obj.get_mut(*field) {
                *v = match v.as_str().and_then(|s| s.strip_prefix(prefix.as_str())) {
                    Some(local) => Value::String(local.to_string()),
                    None => Value::Null,
                };
            }
        }
        if let Some(keys) = obj.get_mut("keys").and_then(Value::as_array_mut) {
            let local: Vec<Value> = keys
                .iter()
                .filter_map(|k| k.as_str()?.strip_prefix(prefix.as_str()))
                .map(|k| Value::String(k.to_string()))
                .collect();
            *keys = local;
        }
    }
}

fn args_object(args: Value) -> Result<Map<String, Value>, ResourceError> {
    match args {
        Value::Null => Ok(Map::new()),
        Value::Object(m) => Ok(m),
        _ => Err(ResourceError::invalid("arguments must be an object")),
    }
}

#[async_trait]
impl ResourceHandle for ScopedHandle {
    fn resource(&self) -> ResourceName {
        self.inner.resource()
    }

    fn operations(&self) -> &'static [&'static str] {
        self.inner.operations()
    }

    async fn invoke(&self, operation: &str, args: Value) -> Result<Value, ResourceError> {
        match self.rule {
            ScopeRule::Passthrough => self.inner.invoke(operation, args).await,
            ScopeRule::Partition => {
                let mut map = args_object(args)?;
                self.partition_args(&mut map)?;
                let mut result = self.inner.invoke(operation, Value::Object(map)).await?;
                Self::strip_partition(&mut result);
                Ok(result)
            }
            ScopeRule::Prefix { fields } => {
                let mut map = args_object(args)?;
                self.prefix_args(&mut map, fields)?;
                let mut result = self.inner.invoke(operation, Value::Object(map)).await?;
                self.strip_prefix(&mut result, fields);
                Ok(result)
            }
        }
    }
}
