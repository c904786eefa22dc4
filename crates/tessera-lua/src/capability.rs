//! Binding of scoped resource handles into the sandbox.
//!
//! Each capability becomes a table with one function per operation:
//!
//! ```lua
//! local out = db.select({ table = "users", where = { active = true } })
//! kv.put({ key = "greeting", value = "hi" })
//! ```
//!
//! Method-call syntax (`db:select{...}`) is accepted too. Arguments and
//! results cross the boundary as JSON.
//!
//! Without async the handle's future is polled exactly once; a backend
//! that cannot answer immediately raises a Lua error instead of blocking
//! the sandbox thread.

use crate::convert::{json_to_lua, lua_to_json};
use futures::FutureExt;
use mlua::{Function, Lua, MultiValue, Table, Value};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tessera_runtime::{CapabilityTable, ResourceError, ResourceHandle};
use tessera_types::ResourceName;

/// Raised when a synchronous chunk touches a capability that would suspend.
pub const ASYNC_DISABLED_MESSAGE: &str = "asynchronous value awaited while async is disabled";

/// Field identifying a binding table, used to recognise method calls.
const RESOURCE_FIELD: &str = "__resource";

/// Installs one table per capability into `env`.
pub(crate) fn install(
    lua: &Lua,
    env: &Table,
    capabilities: &CapabilityTable,
    allow_async: bool,
) -> mlua::Result<()> {
    for (name, handle) in capabilities.iter() {
        let binding = lua.create_table()?;
        binding.raw_set(RESOURCE_FIELD, name.as_str())?;
        for &operation in handle.operations() {
            let function = if allow_async {
                async_operation(lua, name, Arc::clone(handle), operation)?
            } else {
                sync_operation(lua, name, Arc::clone(handle), operation)?
            };
            binding.raw_set(operation, function)?;
        }
        env.set(name.as_str(), binding)?;
    }
    Ok(())
}

fn sync_operation(
    lua: &Lua,
    resource: ResourceName,
    handle: Arc<dyn ResourceHandle>,
    operation: &'static str,
) -> mlua::Result<Function> {
    lua.create_function(move |lua, args: MultiValue| {
        let request = call_args(resource, args)?;
        match handle.invoke(operation, request).now_or_never() {
            Some(Ok(response)) => json_to_lua(lua, &response),
            Some(Err(e)) => Err(operation_error(resource, operation, &e)),
            None => Err(mlua::Error::RuntimeError(ASYNC_DISABLED_MESSAGE.to_string())),
        }
    })
}

fn async_operation(
    lua: &Lua,
    resource: ResourceName,
    handle: Arc<dyn ResourceHandle>,
    operation: &'static str,
) -> mlua::Result<Function> {
    lua.create_async_function(move |lua, args: MultiValue| {
        let handle = Arc::clone(&handle);
        let request = call_args(resource, args);
        async move {
            let response = handle
                .invoke(operation, request?)
                .await
                .map_err(|e| operation_error(resource, operation, &e))?;
            json_to_lua(&lua, &response)
        }
    })
}

/// Picks the argument table, skipping the binding itself on method calls.
fn call_args(resource: ResourceName, args: MultiValue) -> mlua::Result<JsonValue> {
    let mut values = args.into_iter();
    let mut first = values.next();
    if let Some(Value::Table(t)) = &first {
        if t.raw_get::<Option<String>>(RESOURCE_FIELD)?.as_deref() == Some(resource.as_str()) {
            first = values.next();
        }
    }
    match first {
        None | Some(Value::Nil) => Ok(JsonValue::Object(serde_json::Map::new())),
        Some(v) => lua_to_json(&v),
    }
}

fn operation_error(resource: ResourceName, operation: &str, err: &ResourceError) -> mlua::Error {
    mlua::Error::RuntimeError(format!("{resource}.{operation}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tessera_runtime::resource::MemoryKv;

    /// A backend that never answers on the first poll.
    #[derive(Debug)]
    struct Slow;

    #[async_trait]
    impl ResourceHandle for Slow {
        fn resource(&self) -> ResourceName {
            ResourceName::Queue
        }

        fn operations(&self) -> &'static [&'static str] {
            &["send"]
        }

        async fn invoke(&self, _operation: &str, _args: JsonValue) -> Result<JsonValue, ResourceError> {
            futures::future::pending::<()>().await;
            Ok(JsonValue::Null)
        }
    }

    fn env_with(lua: &Lua, caps: &CapabilityTable) -> Table {
        let env = lua.create_table().expect("env");
        install(lua, &env, caps, false).expect("install");
        env
    }

    #[test]
    fn sync_calls_reach_the_handle() {
        let lua = Lua::new();
        let mut caps = CapabilityTable::new();
        caps.insert(ResourceName::Kv, Arc::new(MemoryKv::new()));
        let env = env_with(&lua, &caps);

        let value: String = lua
            .load(
                r#"
                kv.put({ key = "a", value = "one" })
                return kv:get({ key = "a" }).value
                "#,
            )
            .set_environment(env)
            .eval()
            .expect("eval");
        assert_eq!(value, "one");
    }

    #[test]
    fn pending_backend_raises_async_disabled() {
        let lua = Lua::new();
        let mut caps = CapabilityTable::new();
        caps.insert(ResourceName::Queue, Arc::new(Slow));
        let env = env_with(&lua, &caps);

        let err = lua
            .load(r#"queue.send({ queue = "q" })"#)
            .set_environment(env)
            .exec()
            .expect_err("must fail");
        assert!(err.to_string().contains(ASYNC_DISABLED_MESSAGE));
    }

    #[test]
    fn backend_errors_name_the_operation() {
        let lua = Lua::new();
        let mut caps = CapabilityTable::new();
        caps.insert(ResourceName::Kv, Arc::new(MemoryKv::new()));
        let env = env_with(&lua, &caps);

        let err = lua
            .load(r#"kv.get({})"#)
            .set_environment(env)
            .exec()
            .expect_err("missing key");
        assert!(err.to_string().contains("kv.get"));
    }

    #[test]
    fn only_granted_resources_are_bound() {
        let lua = Lua::new();
        let mut caps = CapabilityTable::new();
        caps.insert(ResourceName::Kv, Arc::new(MemoryKv::new()));
        let env = env_with(&lua, &caps);
        assert!(env.get::<Value>("kv").expect("kv").is_table());
        assert!(env.get::<Value>("db").expect("db").is_nil());
    }
}
