//! Conversion between Lua values and JSON.
//!
//! JSON is the wire format for capability arguments, capability results
//! and the chunk's return value. Tables with a contiguous `1..n` sequence
//! and no other keys become arrays; every other table becomes an object.

use mlua::{Lua, Table, Value};
use serde_json::Value as JsonValue;
use std::ffi::c_void;

/// Nesting depth at which conversion gives up.
const MAX_DEPTH: usize = 64;

/// Values a single conversion may visit, counting every visit of a
/// shared table.
const MAX_NODES: usize = 100_000;

/// String bytes a single conversion may copy out of the Lua heap.
const MAX_BYTES: usize = 32 * 1024 * 1024;

/// Converts a Lua value to JSON.
///
/// # Errors
///
/// Fails for functions, threads, userdata, non-finite numbers, tables
/// with non-string/non-number keys, cyclic tables, and structures that
/// are nested too deeply or too large to copy out of the Lua state.
pub fn lua_to_json(value: &Value) -> mlua::Result<JsonValue> {
    Encoder::new(MAX_BYTES).encode(value)
}

/// Walks a value tree against a running budget.
///
/// Tables on the current path are tracked by identity, so a cycle fails
/// on first revisit. A table shared between siblings is expanded once per
/// reference and each expansion is charged.
struct Encoder {
    path: Vec<*const c_void>,
    nodes: usize,
    bytes: usize,
    max_bytes: usize,
}

impl Encoder {
    fn new(max_bytes: usize) -> Self {
        Self {
            path: Vec::new(),
            nodes: 0,
            bytes: 0,
            max_bytes,
        }
    }

    fn charge(&mut self, bytes: usize) -> mlua::Result<()> {
        self.nodes += 1;
        self.bytes = self.bytes.saturating_add(bytes);
        if self.nodes > MAX_NODES || self.bytes > self.max_bytes {
            return Err(mlua::Error::SerializeError(
                "value too large to serialize".into(),
            ));
        }
        Ok(())
    }

    fn encode(&mut self, value: &Value) -> mlua::Result<JsonValue> {
        match value {
            Value::Nil => self.charge(0).map(|()| JsonValue::Null),
            Value::Boolean(b) => self.charge(0).map(|()| JsonValue::Bool(*b)),
            Value::Integer(i) => self.charge(0).map(|()| JsonValue::Number((*i).into())),
            Value::Number(n) => {
                self.charge(0)?;
                serde_json::Number::from_f64(*n)
                    .map(JsonValue::Number)
                    .ok_or_else(|| mlua::Error::SerializeError(format!("cannot encode number {n}")))
            }
            Value::String(s) => {
                self.charge(s.as_bytes().len())?;
                Ok(JsonValue::String(s.to_str()?.to_string()))
            }
            Value::Table(table) => self.encode_table(table),
            other => Err(mlua::Error::SerializeError(format!(
                "cannot encode {} as JSON",
                other.type_name()
            ))),
        }
    }

    fn encode_table(&mut self, table: &Table) -> mlua::Result<JsonValue> {
        self.charge(0)?;
        if self.path.len() >= MAX_DEPTH {
            return Err(mlua::Error::SerializeError("table nested too deeply".into()));
        }
        let id = table.to_pointer();
        if self.path.contains(&id) {
            return Err(mlua::Error::SerializeError(
                "cannot serialize cyclic table".into(),
            ));
        }

        self.path.push(id);
        let encoded = self.encode_entries(table);
        self.path.pop();
        encoded
    }

    fn encode_entries(&mut self, table: &Table) -> mlua::Result<JsonValue> {
        let len = table.raw_len();
        let mut entries = Vec::new();
        for pair in table.clone().pairs::<Value, Value>() {
            if self.nodes + entries.len() >= MAX_NODES {
                return Err(mlua::Error::SerializeError(
                    "value too large to serialize".into(),
                ));
            }
            entries.push(pair?);
        }

        if len > 0 && entries.len() == len {
            let mut arr = Vec::with_capacity(len);
            for i in 1..=len {
                let v: Value = table.raw_get(i)?;
                arr.push(self.encode(&v)?);
            }
            return Ok(JsonValue::Array(arr));
        }

        let mut map = serde_json::Map::new();
        for (k, v) in entries {
            let key = object_key(&k)?;
            self.bytes = self.bytes.saturating_add(key.len());
            map.insert(key, self.encode(&v)?);
        }
        Ok(JsonValue::Object(map))
    }
}

fn object_key(key: &Value) -> mlua::Result<String> {
    match key {
        Value::String(s) => Ok(s.to_str()?.to_string()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(mlua::Error::SerializeError(format!(
            "cannot use {} as an object key",
            other.type_name()
        ))),
    }
}

/// Converts JSON to a Lua value. `null` becomes `nil`.
///
/// # Errors
///
/// Fails only when the Lua state cannot allocate.
pub fn json_to_lua(lua: &Lua, value: &JsonValue) -> mlua::Result<Value> {
    match value {
        JsonValue::Null => Ok(Value::Nil),
        JsonValue::Bool(b) => Ok(Value::Boolean(*b)),
        JsonValue::Number(n) => Ok(match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        }),
        JsonValue::String(s) => Ok(Value::String(lua.create_string(s)?)),
        JsonValue::Array(items) => {
            let table = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i + 1, json_to_lua(lua, item)?)?;
            }
            Ok(Value::Table(table))
        }
        JsonValue::Object(map) => {
            let table = lua.create_table()?;
            for (k, v) in map {
                table.raw_set(k.as_str(), json_to_lua(lua, v)?)?;
            }
            Ok(Value::Table(table))
        }
    }
}

/// Renders a value the way console capture records it, keeping at most
/// `max_bytes` bytes.
///
/// Strings are kept verbatim, tables become JSON text, everything else
/// follows Lua's `tostring` conventions. Returns the text and the number
/// of bytes cut from it. Only the kept prefix of a long string is copied.
pub(crate) fn display(value: &Value, max_bytes: usize) -> (String, usize) {
    match value {
        Value::Nil => clip("nil".to_string(), max_bytes),
        Value::Boolean(b) => clip(b.to_string(), max_bytes),
        Value::Integer(i) => clip(i.to_string(), max_bytes),
        Value::Number(n) => clip(format_number(*n), max_bytes),
        Value::String(s) => {
            let bytes = s.as_bytes();
            if bytes.len() <= max_bytes {
                return (String::from_utf8_lossy(&bytes).into_owned(), 0);
            }
            let prefix = String::from_utf8_lossy(&bytes[..max_bytes]).into_owned();
            let (text, _) = clip(prefix, max_bytes);
            let omitted = bytes.len() - text.len();
            (text, omitted)
        }
        Value::Table(_) => match Encoder::new(max_bytes).encode(value) {
            Ok(json) => clip(json.to_string(), max_bytes),
            Err(_) => clip("table".to_string(), max_bytes),
        },
        other => clip(other.type_name().to_string(), max_bytes),
    }
}

/// Cuts `text` to at most `max_bytes` on a char boundary.
fn clip(mut text: String, max_bytes: usize) -> (String, usize) {
    if text.len() <= max_bytes {
        return (text, 0);
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let omitted = text.len() - end;
    text.truncate(end);
    (text, omitted)
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.1}")
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(lua: &Lua, code: &str) -> Value {
        lua.load(code).eval().expect("eval")
    }

    #[test]
    fn sequences_become_arrays() {
        let lua = Lua::new();
        let v = eval(&lua, "return {1, 'two', true}");
        assert_eq!(lua_to_json(&v).expect("json"), json!([1, "two", true]));
    }

    #[test]
    fn mixed_tables_become_objects() {
        let lua = Lua::new();
        let v = eval(&lua, "return {1, 2, name = 'x'}");
        assert_eq!(
            lua_to_json(&v).expect("json"),
            json!({"1": 1, "2": 2, "name": "x"})
        );
    }

    #[test]
    fn empty_table_is_object() {
        let lua = Lua::new();
        let v = eval(&lua, "return {}");
        assert_eq!(lua_to_json(&v).expect("json"), json!({}));
    }

    #[test]
    fn functions_and_cycles_are_rejected() {
        let lua = Lua::new();
        let f = eval(&lua, "return function() end");
        assert!(lua_to_json(&f).is_err());

        let cyclic = eval(&lua, "local t = {} t.self = t return t");
        assert!(lua_to_json(&cyclic).is_err());

        let nan = eval(&lua, "return 0/0");
        assert!(lua_to_json(&nan).is_err());
    }

    #[test]
    fn json_to_lua_preserves_shape() {
        let lua = Lua::new();
        let input = json!({"rows": [{"id": 1, "ok": true}], "missing": null, "ratio": 0.5});
        let v = json_to_lua(&lua, &input).expect("to lua");
        lua.globals().set("v", v).expect("set");

        let id: i64 = eval(&lua, "return v.rows[1].id").as_i64().expect("int");
        assert_eq!(id, 1);
        assert!(eval(&lua, "return v.missing").is_nil());
        assert_eq!(eval(&lua, "return v.ratio").as_f64(), Some(0.5));
    }

    #[test]
    fn display_matches_console_conventions() {
        let lua = Lua::new();
        let shown = |code: &str| display(&eval(&lua, code), 1024).0;
        assert_eq!(shown("return 'hi'"), "hi");
        assert_eq!(shown("return 3"), "3");
        assert_eq!(shown("return 3.0"), "3.0");
        assert_eq!(shown("return 0.25"), "0.25");
        assert_eq!(shown("return nil"), "nil");
        assert_eq!(shown("return {a = 1}"), r#"{"a":1}"#);
        assert_eq!(shown("return print"), "function");
    }

    #[test]
    fn shared_subtables_are_expanded_per_reference() {
        let lua = Lua::new();
        let v = eval(&lua, "local leaf = {1} return {a = leaf, b = leaf}");
        assert_eq!(
            lua_to_json(&v).expect("json"),
            json!({"a": [1], "b": [1]})
        );
    }

    #[test]
    fn exponential_shared_tree_is_rejected() {
        let lua = Lua::new();
        let v = eval(
            &lua,
            "local t = {} for i = 1, 40 do t = { a = t, b = t } end return t",
        );
        let started = std::time::Instant::now();
        let err = lua_to_json(&v).expect_err("too large");
        assert!(err.to_string().contains("too large"), "{err}");
        assert!(started.elapsed() < std::time::Duration::from_secs(5));

        let (text, _) = display(&v, 1024);
        assert_eq!(text, "table");
    }

    #[test]
    fn cycles_are_reported_as_cycles() {
        let lua = Lua::new();
        let v = eval(&lua, "local a = {} local b = {a = a} a.b = b return a");
        let err = lua_to_json(&v).expect_err("cyclic");
        assert!(err.to_string().contains("cyclic"), "{err}");
    }

    #[test]
    fn repeated_large_strings_exhaust_the_byte_allowance() {
        let lua = Lua::new();
        let v = eval(
            &lua,
            "local s = string.rep('x', 1024 * 1024) \
             local t = {} for i = 1, 64 do t[i] = s end return t",
        );
        assert!(lua_to_json(&v).is_err());
    }

    #[test]
    fn display_copies_only_the_kept_prefix() {
        let lua = Lua::new();
        let v = eval(&lua, "return string.rep('ab', 1000)");
        let (text, omitted) = display(&v, 11);
        assert_eq!(text, "abababababa");
        assert_eq!(omitted, 2000 - 11);

        let v = eval(&lua, "return 'héllo'");
        let (text, omitted) = display(&v, 2);
        assert_eq!(text, "h");
        assert_eq!(omitted, "héllo".len() - 1);
    }
}
