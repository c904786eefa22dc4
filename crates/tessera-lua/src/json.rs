//! `json.encode` / `json.decode` bindings.

use crate::convert::{json_to_lua, lua_to_json};
use mlua::{Lua, Table, Value};

/// Builds the `json` table.
pub(crate) fn table(lua: &Lua) -> mlua::Result<Table> {
    let json = lua.create_table()?;

    let encode = lua.create_function(|_, value: Value| {
        let json = lua_to_json(&value)?;
        serde_json::to_string(&json).map_err(|e| mlua::Error::SerializeError(e.to_string()))
    })?;
    json.set("encode", encode)?;

    let decode = lua.create_function(|lua, text: String| {
        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| mlua::Error::RuntimeError(format!("json.decode: {e}")))?;
        json_to_lua(lua, &value)
    })?;
    json.set("decode", decode)?;

    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_and_decode() {
        let lua = Lua::new();
        lua.globals().set("json", table(&lua).expect("json")).expect("set");

        let text: String = lua
            .load(r#"return json.encode({1, 2, 3})"#)
            .eval()
            .expect("encode");
        assert_eq!(text, "[1,2,3]");

        let name: String = lua
            .load(r#"return json.decode('{"user":{"name":"ada"}}').user.name"#)
            .eval()
            .expect("decode");
        assert_eq!(name, "ada");
    }

    #[test]
    fn decode_error_is_a_lua_error() {
        let lua = Lua::new();
        lua.globals().set("json", table(&lua).expect("json")).expect("set");
        let err = lua
            .load(r#"return json.decode("{nope")"#)
            .exec()
            .expect_err("must fail");
        assert!(err.to_string().contains("json.decode"));
    }
}
