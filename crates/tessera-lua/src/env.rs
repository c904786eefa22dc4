//! Allow-list environment for guest chunks.
//!
//! The chunk's `_ENV` is a fresh table populated only with the names
//! below. Nothing is deleted from the real globals; anything not copied
//! here is simply unreachable from guest code.

use crate::{capability, console, json};
use futures::future::try_join_all;
use mlua::{Function, Lua, Table, Value, Variadic};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tessera_runtime::{CapabilityTable, ConsoleBuffer};

/// Base functions copied from the VM globals.
pub const BASE_FUNCTIONS: &[&str] = &[
    "assert",
    "error",
    "ipairs",
    "next",
    "pairs",
    "select",
    "tonumber",
    "tostring",
    "type",
    "rawequal",
    "rawget",
    "rawlen",
    "rawset",
    "setmetatable",
    "getmetatable",
];

/// `os` functions exposed to guests.
pub const OS_FUNCTIONS: &[&str] = &["time", "clock", "date", "difftime"];

/// Message raised once the deadline has passed.
pub(crate) const TIMEOUT_MESSAGE: &str = "execution timed out";

/// `pcall`/`xpcall` wrappers that re-raise after an interrupt, so a guest
/// cannot swallow the deadline error and keep running.
const PROTECTED_CALLS: &str = r#"
local raw_pcall, raw_xpcall, check, pack, unpack = ...
local function settle(results)
    check()
    return unpack(results, 1, results.n)
end
return function(...) return settle(pack(raw_pcall(...))) end,
    function(...) return settle(pack(raw_xpcall(...))) end
"#;

/// What goes into one environment.
pub(crate) struct Sandbox<'a> {
    pub console: &'a ConsoleBuffer,
    pub capabilities: &'a CapabilityTable,
    pub allow_async: bool,
    pub interrupted: Arc<AtomicBool>,
}

/// Builds the `_ENV` table for one chunk.
pub(crate) fn build(lua: &Lua, sandbox: &Sandbox<'_>) -> mlua::Result<Table> {
    let globals = lua.globals();
    let env = lua.create_table()?;

    for name in BASE_FUNCTIONS {
        let value: Value = globals.get(*name)?;
        if !value.is_nil() {
            env.set(*name, value)?;
        }
    }
    install_protected_calls(lua, &globals, &env, Arc::clone(&sandbox.interrupted))?;

    let string = copy_library(lua, &globals, "string", |name| name != "dump")?;
    lock_string_metatable(lua, &string)?;
    env.set("string", string)?;
    for lib in ["table", "math", "utf8"] {
        env.set(lib, copy_library(lua, &globals, lib, |_| true)?)?;
    }
    env.set(
        "os",
        copy_library(lua, &globals, "os", |name| OS_FUNCTIONS.contains(&name))?,
    )?;

    env.set("json", json::table(lua)?)?;
    console::install(lua, &env, sandbox.console)?;
    if sandbox.allow_async {
        env.set("async", async_table(lua)?)?;
    }
    capability::install(lua, &env, sandbox.capabilities, sandbox.allow_async)?;

    Ok(env)
}

fn copy_library(
    lua: &Lua,
    globals: &Table,
    name: &str,
    keep: impl Fn(&str) -> bool,
) -> mlua::Result<Table> {
    let copy = lua.create_table()?;
    let Some(source) = globals.get::<Option<Table>>(name)? else {
        return Ok(copy);
    };
    for pair in source.pairs::<String, Value>() {
        let (key, value) = pair?;
        if keep(&key) {
            copy.raw_set(key, value)?;
        }
    }
    Ok(copy)
}

/// Points string methods at the filtered copy and hides the metatable.
fn lock_string_metatable(lua: &Lua, string: &Table) -> mlua::Result<()> {
    let meta: Table = lua.load("return getmetatable('')").eval()?;
    meta.raw_set("__index", string.clone())?;
    meta.raw_set("__metatable", false)?;
    Ok(())
}

fn install_protected_calls(
    lua: &Lua,
    globals: &Table,
    env: &Table,
    interrupted: Arc<AtomicBool>,
) -> mlua::Result<()> {
    let check = lua.create_function(move |_, ()| {
        if interrupted.load(Ordering::Relaxed) {
            return Err(mlua::Error::RuntimeError(TIMEOUT_MESSAGE.to_string()));
        }
        Ok(())
    })?;
    let table: Table = globals.get("table")?;
    let (pcall, xpcall): (Function, Function) = lua
        .load(PROTECTED_CALLS)
        .set_name("=protect")
        .call((
            globals.get::<Function>("pcall")?,
            globals.get::<Function>("xpcall")?,
            check,
            table.get::<Function>("pack")?,
            table.get::<Function>("unpack")?,
        ))?;
    env.set("pcall", pcall)?;
    env.set("xpcall", xpcall)?;
    Ok(())
}

/// `async.sleep(ms)` and `async.all(f1, f2, ...)`.
fn async_table(lua: &Lua) -> mlua::Result<Table> {
    let table = lua.create_table()?;

    let sleep = lua.create_async_function(|_, ms: u64| async move {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    })?;
    table.set("sleep", sleep)?;

    let all = lua.create_async_function(|lua, functions: Variadic<Function>| async move {
        let calls = functions.iter().map(|f| f.call_async::<Value>(()));
        let results = try_join_all(calls).await?;
        lua.create_sequence_from(results)
    })?;
    table.set("all", all)?;

    Ok(table)
}
