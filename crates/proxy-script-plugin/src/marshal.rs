//! Marshalling between [`Record`]s and Lua values.
//!
//! Records cross into the interpreter through `mlua`'s serde bridge:
//! structs become plain tables, lists become tables carrying the array
//! metatable (so empty lists survive the round trip) and `Value::Null`
//! becomes the `null` sentinel.
//!
//! The way back walks tables by hand so that no key is ever dropped. A table
//! with an array part must hold exactly the keys `1..=n`; anything else
//! (string keys next to list items, holes) is rejected instead of being
//! truncated. Functions, userdata, threads, non-string record keys,
//! non-UTF-8 strings, NaN/inf and cyclic tables are rejected too.

use std::ffi::c_void;

use mlua::Lua;
use mlua::LuaSerdeExt;
use mlua::Table;
use mlua::Value as LuaValue;

use crate::value::Record;
use crate::value::Value;

/// Convert a record into a Lua table.
pub fn record_to_lua(lua: &Lua, record: &Record) -> mlua::Result<LuaValue> {
    lua.to_value(record)
}

/// Convert a single value into its Lua counterpart.
pub fn value_to_lua(lua: &Lua, value: &Value) -> mlua::Result<LuaValue> {
    lua.to_value(value)
}

/// Convert a Lua table back into a record.
///
/// Fails when `value` is not a string-keyed table or when any nested value
/// falls outside the Structured Record value set.
pub fn lua_to_record(lua: &Lua, value: LuaValue) -> mlua::Result<Record> {
    let from = lua_type_name(&value);
    match lua_to_value(lua, value)? {
        Value::Struct(record) => Ok(record),
        other => {
            let got = if from == "table" { other.type_name() } else { from };
            Err(invalid(format!("expected a string-keyed table, got {got}")))
        }
    }
}

/// Convert any Lua value into a [`Value`]. `nil` and `null` both map to
/// [`Value::Null`]; tables with an array part or the array metatable become
/// [`Value::List`].
pub fn lua_to_value(lua: &Lua, value: LuaValue) -> mlua::Result<Value> {
    let mut path = Vec::new();
    convert(lua, value, &mut path)
}

/// Script-facing type name, folding integers into `number` and naming the
/// `null` sentinel.
pub fn lua_type_name(value: &LuaValue) -> &'static str {
    match value {
        LuaValue::Integer(_) | LuaValue::Number(_) => "number",
        v if *v == LuaValue::NULL => "null",
        other => other.type_name(),
    }
}

fn invalid(message: impl Into<String>) -> mlua::Error {
    mlua::Error::RuntimeError(message.into())
}

/// `path` holds the tables currently being walked, for cycle detection.
fn convert(lua: &Lua, value: LuaValue, path: &mut Vec<*const c_void>) -> mlua::Result<Value> {
    match value {
        LuaValue::Nil => Ok(Value::Null),
        v if v == LuaValue::NULL => Ok(Value::Null),
        LuaValue::Boolean(b) => Ok(Value::Bool(b)),
        LuaValue::Integer(i) => Ok(Value::Number(i as f64)),
        LuaValue::Number(n) if n.is_finite() => Ok(Value::Number(n)),
        LuaValue::Number(n) => Err(invalid(format!("non-finite number {n} is not allowed"))),
        LuaValue::String(s) => String::from_utf8(s.as_bytes().to_vec())
            .map(Value::String)
            .map_err(|_| invalid("string is not valid UTF-8 (encode binary data with btoa)")),
        LuaValue::Table(table) => {
            let ptr = table.to_pointer();
            if path.contains(&ptr) {
                return Err(invalid("cyclic table cannot be converted"));
            }
            path.push(ptr);
            let result = convert_table(lua, table, path);
            path.pop();
            result
        }
        other => Err(invalid(format!("cannot convert {} to a record value", other.type_name()))),
    }
}

fn convert_table(lua: &Lua, table: Table, path: &mut Vec<*const c_void>) -> mlua::Result<Value> {
    let len = table.raw_len();
    let mut entries = Vec::new();
    for pair in table.clone().pairs::<LuaValue, LuaValue>() {
        entries.push(pair?);
    }

    if entries.is_empty() {
        // Only the array metatable tells `{}` from an empty list.
        return lua.from_value(LuaValue::Table(table));
    }

    if len > 0 {
        let count = entries.len();
        let mut items = vec![Value::Null; len];
        for (key, value) in entries {
            let index = match key {
                LuaValue::Integer(i) if i >= 1 && (i as usize) <= len => i as usize - 1,
                LuaValue::Integer(_) => return Err(invalid("sparse list: keys must be 1..n without holes")),
                _ => return Err(invalid("table mixes list and map keys")),
            };
            items[index] = convert(lua, value, path)?;
        }
        if count != len {
            return Err(invalid("sparse list: keys must be 1..n without holes"));
        }
        return Ok(Value::List(items));
    }

    let mut record = Record::new();
    for (key, value) in entries {
        let key = match key {
            LuaValue::String(s) => String::from_utf8(s.as_bytes().to_vec())
                .map_err(|_| invalid("record key is not valid UTF-8"))?,
            LuaValue::Integer(_) => return Err(invalid("sparse list: keys must be 1..n without holes")),
            other => return Err(invalid(format!("record keys must be strings, got {}", lua_type_name(&other)))),
        };
        let value = convert(lua, value, path)?;
        record.insert(key, value);
    }
    Ok(Value::Struct(record))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: serde_json::Value) -> Record {
        serde_json::from_value(value).expect("valid record JSON")
    }

    fn roundtrip(lua: &Lua, rec: &Record) -> Record {
        let table = record_to_lua(lua, rec).expect("record_to_lua");
        lua_to_record(lua, table).expect("lua_to_record")
    }

    #[test]
    fn nested_record_survives_roundtrip() {
        let lua = Lua::new();
        let rec = record(json!({
            "query": "SELECT 1",
            "port": 5432,
            "ratio": 0.5,
            "tls": false,
            "tags": ["a", "b"],
            "empty": [],
            "missing": null,
            "client": {"remote": "10.0.0.1", "nested": {"deep": 1}}
        }));
        assert_eq!(roundtrip(&lua, &rec), rec);
    }

    #[test]
    fn integral_numbers_become_lua_integers() {
        let lua = Lua::new();
        let table = record_to_lua(&lua, &Record::new().with("n", 3)).expect("record_to_lua");
        let LuaValue::Table(table) = table else {
            panic!("expected table");
        };
        assert_eq!(table.get::<LuaValue>("n").expect("get"), LuaValue::Integer(3));
    }

    #[test]
    fn null_field_is_visible_to_scripts() {
        let lua = Lua::new();
        let table = record_to_lua(&lua, &Record::new().with("gone", Value::Null)).expect("record_to_lua");
        lua.globals().set("rec", table).expect("set global");
        let has_key: bool = lua.load("return rec.gone ~= nil").eval().expect("eval");
        assert!(has_key, "null must not collapse to nil");
    }

    #[test]
    fn script_built_table_converts() {
        let lua = Lua::new();
        let value: LuaValue = lua.load(r#"return { name = "x", list = {1, 2, 3}, sub = { ok = true } }"#).eval().expect("eval");
        let rec = lua_to_record(&lua, value).expect("lua_to_record");
        assert_eq!(rec, record(json!({"name": "x", "list": [1, 2, 3], "sub": {"ok": true}})));
    }

    #[test]
    fn function_field_is_rejected() {
        let lua = Lua::new();
        let value: LuaValue = lua.load("return { f = function() end }").eval().expect("eval");
        assert!(lua_to_record(&lua, value).is_err());
    }

    #[test]
    fn non_string_key_is_rejected() {
        let lua = Lua::new();
        let value: LuaValue = lua.load("return { [true] = 1 }").eval().expect("eval");
        assert!(lua_to_record(&lua, value).is_err());
    }

    #[test]
    fn cyclic_table_is_rejected() {
        let lua = Lua::new();
        let value: LuaValue = lua.load("local t = { a = 1 }; t.self = t; return t").eval().expect("eval");
        assert!(lua_to_record(&lua, value).is_err());
    }

    #[test]
    fn non_table_is_not_a_record() {
        let lua = Lua::new();
        assert!(lua_to_record(&lua, LuaValue::Integer(42)).is_err());
        assert!(lua_to_record(&lua, LuaValue::Nil).is_err());
        let list: LuaValue = lua.load("return {1, 2}").eval().expect("eval");
        assert!(lua_to_record(&lua, list).is_err());
    }

    #[test]
    fn mixed_table_is_rejected() {
        let lua = Lua::new();
        let value: LuaValue = lua.load("return { sub = { 1, 2, name = 'kept?' } }").eval().expect("eval");
        let err = lua_to_record(&lua, value).expect_err("mixed table must not convert");
        assert!(err.to_string().contains("table mixes list and map keys"), "unexpected error: {err}");
    }

    #[test]
    fn sparse_list_is_rejected() {
        let lua = Lua::new();
        for source in ["return { l = { 1, nil, 3 } }", "local m = {}; m[1] = 'a'; m[3] = 'c'; return { m = m }"] {
            let value: LuaValue = lua.load(source).eval().expect("eval");
            let err = lua_to_record(&lua, value).expect_err("sparse list must not convert");
            assert!(err.to_string().contains("sparse list"), "unexpected error for {source}: {err}");
        }
    }

    #[test]
    fn integer_key_on_record_is_rejected() {
        let lua = Lua::new();
        let value: LuaValue = lua.load("local r = { key = 'value' }; r[1] = 'x'; return r").eval().expect("eval");
        assert!(lua_to_record(&lua, value).is_err());

        let gap: LuaValue = lua.load("return { [2] = 'x' }").eval().expect("eval");
        assert!(lua_to_value(&lua, gap).is_err());
    }

    #[test]
    fn shared_subtable_is_not_a_cycle() {
        let lua = Lua::new();
        let value: LuaValue = lua.load("local s = { x = 1 }; return { a = s, b = s }").eval().expect("eval");
        let rec = lua_to_record(&lua, value).expect("lua_to_record");
        assert_eq!(rec, record(json!({"a": {"x": 1}, "b": {"x": 1}})));
    }

    #[test]
    fn list_built_by_index_converts() {
        let lua = Lua::new();
        let value: LuaValue = lua.load("local l = {}; l[1] = 'a'; l[2] = 'b'; return l").eval().expect("eval");
        assert_eq!(lua_to_value(&lua, value).expect("lua_to_value"), Value::List(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn negative_zero_survives_roundtrip() {
        let lua = Lua::new();
        let back = roundtrip(&lua, &Record::new().with("z", -0.0));
        let z = back.get("z").and_then(Value::as_f64).expect("number");
        assert!(z == 0.0 && z.is_sign_negative(), "sign lost: {z}");
    }

    #[test]
    fn type_names() {
        let lua = Lua::new();
        let map: LuaValue = lua.load("return {a = 1}").eval().expect("eval");
        assert_eq!(lua_type_name(&map), "table");
        assert_eq!(lua_type_name(&LuaValue::Integer(1)), "number");
        assert_eq!(lua_type_name(&LuaValue::Number(1.5)), "number");
        assert_eq!(lua_type_name(&LuaValue::Nil), "nil");
        assert_eq!(lua_type_name(&LuaValue::NULL), "null");
        assert_eq!(lua_type_name(&LuaValue::Boolean(true)), "boolean");
    }

    #[test]
    fn empty_list_keeps_its_shape() {
        let lua = Lua::new();
        let empty = value_to_lua(&lua, &Value::List(vec![])).expect("value_to_lua");
        assert_eq!(lua_to_value(&lua, empty).expect("lua_to_value"), Value::List(vec![]));
        let bare: LuaValue = lua.load("return {}").eval().expect("eval");
        assert_eq!(lua_to_value(&lua, bare).expect("lua_to_value"), Value::Struct(Record::new()));
    }

    #[test]
    fn lua_to_value_maps_nil_to_null() {
        let lua = Lua::new();
        assert_eq!(lua_to_value(&lua, LuaValue::Nil).expect("nil"), Value::Null);
        assert_eq!(lua_to_value(&lua, LuaValue::NULL).expect("null"), Value::Null);
        assert_eq!(lua_to_value(&lua, LuaValue::Integer(2)).expect("int"), Value::Number(2.0));
    }

    #[test]
    fn value_to_lua_scalars() {
        let lua = Lua::new();
        let v = value_to_lua(&lua, &Value::from("hi")).expect("value_to_lua");
        assert!(matches!(v, LuaValue::String(_)));
        assert_eq!(lua_to_value(&lua, v).expect("lua_to_value"), Value::from("hi"));
    }
}
