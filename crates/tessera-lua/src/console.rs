//! `console.*` and `print` bindings.

use crate::convert::display;
use mlua::{Function, Lua, MultiValue, Table, Value};
use tessera_runtime::{ConsoleBuffer, LogLevel};

/// Installs `console.{log,info,warn,error,debug}` and `print` into `env`.
///
/// Calls are recorded in order on `console`. A disabled or full buffer
/// turns every function into a no-op that skips argument rendering, and
/// each argument is rendered only up to the bytes the buffer can still
/// take.
pub(crate) fn install(lua: &Lua, env: &Table, console: &ConsoleBuffer) -> mlua::Result<()> {
    let table = lua.create_table()?;
    for level in LogLevel::ALL {
        table.set(level.as_str(), log_function(lua, console.clone(), level)?)?;
    }
    env.set("console", table)?;
    env.set("print", log_function(lua, console.clone(), LogLevel::Log)?)?;
    Ok(())
}

fn log_function(lua: &Lua, console: ConsoleBuffer, level: LogLevel) -> mlua::Result<Function> {
    lua.create_function(move |_, args: MultiValue| {
        if !console.is_enabled() {
            return Ok(());
        }
        let mut budget = console.remaining_bytes();
        if budget == 0 {
            console.discard(args.iter().map(raw_len).sum());
            return Ok(());
        }

        let mut rendered = Vec::with_capacity(args.len());
        let mut cut = 0;
        for value in args.iter() {
            if budget == 0 {
                cut += raw_len(value);
                continue;
            }
            let (text, omitted) = display(value, budget);
            budget -= text.len().min(budget);
            cut += omitted;
            rendered.push(text);
        }
        console.add_dropped_bytes(cut);
        console.push(level, rendered);
        Ok(())
    })
}

/// Size of an argument that was never rendered. Only strings are
/// measured.
fn raw_len(value: &Value) -> usize {
    match value {
        Value::String(s) => s.as_bytes().len(),
        _ => 0,
    }
}
