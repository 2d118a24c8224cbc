//! Helper globals installed into the interpreter before the script runs.
//!
//! | Global | Behaviour |
//! |--------|-----------|
//! | `btoa(s)` | base64 (standard alphabet, padded) of the bytes of `s` |
//! | `atob(s)` | inverse of `btoa`; returns a binary-safe string |
//! | `parseSQL(sql)` | JSON text of the PostgreSQL AST for `sql` |
//! | `Value(x)` | validates `x` against the Structured Record value set |
//! | `null` | sentinel for an explicit null field |
//! | `console.*` | `log`, `info`, `debug`, `warn`, `error` routed to `tracing` |
//!
//! Helpers raise ordinary Lua errors on bad input, so a script can `pcall`
//! them; an unhandled one surfaces as a script fault of the calling hook.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mlua::Function;
use mlua::Lua;
use mlua::LuaSerdeExt;
use mlua::Value as LuaValue;
use mlua::Variadic;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::marshal;

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Severity of a `console.*` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Forward one console line from the script to the structured logger.
pub fn log_script_message(plugin_name: &str, level: ConsoleLevel, message: &str) {
    match level {
        ConsoleLevel::Debug => tracing::debug!(plugin = plugin_name, script_message = %message, "script console"),
        ConsoleLevel::Info => tracing::info!(plugin = plugin_name, script_message = %message, "script console"),
        ConsoleLevel::Warn => tracing::warn!(plugin = plugin_name, script_message = %message, "script console"),
        ConsoleLevel::Error => tracing::error!(plugin = plugin_name, script_message = %message, "script console"),
    }
}

// ---------------------------------------------------------------------------
// Encoding and parsing
// ---------------------------------------------------------------------------

/// Base64-encode bytes.
pub fn btoa(input: &[u8]) -> String {
    STANDARD.encode(input)
}

/// Base64-decode text produced by [`btoa`].
pub fn atob(input: &[u8]) -> Result<Vec<u8>, String> {
    STANDARD.decode(input).map_err(|e| format!("atob: invalid base64 input: {e}"))
}

/// Parse PostgreSQL text and return the statement list as JSON.
pub fn parse_sql(sql: &str) -> Result<String, String> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql).map_err(|e| format!("parseSQL: {e}"))?;
    serde_json::to_string(&statements).map_err(|e| format!("parseSQL: failed to encode AST: {e}"))
}

fn missing_argument(helper: &str) -> mlua::Error {
    mlua::Error::RuntimeError(format!("{helper} requires 1 argument"))
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Install every helper global into `lua`.
///
/// Must run before the user script is executed so top-level script code can
/// already use the helpers.
pub fn install_helpers(lua: &Lua, plugin_name: &str) -> anyhow::Result<()> {
    let globals = lua.globals();

    // -- Base64 --
    let btoa_fn = lua
        .create_function(|_, input: Option<mlua::String>| {
            let input = input.ok_or_else(|| missing_argument("btoa"))?;
            Ok(btoa(&input.as_bytes()))
        })
        .map_err(|e| anyhow::anyhow!("failed to create btoa: {e}"))?;
    globals.set("btoa", btoa_fn).map_err(|e| anyhow::anyhow!("failed to register btoa: {e}"))?;

    let atob_fn = lua
        .create_function(|lua, input: Option<mlua::String>| {
            let input = input.ok_or_else(|| missing_argument("atob"))?;
            let decoded = atob(&input.as_bytes()).map_err(mlua::Error::RuntimeError)?;
            lua.create_string(decoded)
        })
        .map_err(|e| anyhow::anyhow!("failed to create atob: {e}"))?;
    globals.set("atob", atob_fn).map_err(|e| anyhow::anyhow!("failed to register atob: {e}"))?;

    // -- SQL --
    let parse_sql_fn = lua
        .create_function(|_, sql: Option<String>| {
            let sql = sql.ok_or_else(|| missing_argument("parseSQL"))?;
            parse_sql(&sql).map_err(mlua::Error::RuntimeError)
        })
        .map_err(|e| anyhow::anyhow!("failed to create parseSQL: {e}"))?;
    globals.set("parseSQL", parse_sql_fn).map_err(|e| anyhow::anyhow!("failed to register parseSQL: {e}"))?;

    // -- Values --
    let value_fn = lua
        .create_function(|lua, input: LuaValue| {
            let value = marshal::lua_to_value(lua, input).map_err(|e| mlua::Error::RuntimeError(format!("Value: {e}")))?;
            lua.to_value(&value)
        })
        .map_err(|e| anyhow::anyhow!("failed to create Value: {e}"))?;
    globals.set("Value", value_fn).map_err(|e| anyhow::anyhow!("failed to register Value: {e}"))?;
    globals.set("null", lua.null()).map_err(|e| anyhow::anyhow!("failed to register null: {e}"))?;

    // -- Console --
    let console = lua.create_table().map_err(|e| anyhow::anyhow!("failed to create console: {e}"))?;
    let plugin_name: Arc<str> = Arc::from(plugin_name);
    for (method, level) in [
        ("log", ConsoleLevel::Info),
        ("info", ConsoleLevel::Info),
        ("debug", ConsoleLevel::Debug),
        ("warn", ConsoleLevel::Warn),
        ("error", ConsoleLevel::Error),
    ] {
        let name = Arc::clone(&plugin_name);
        let func = lua
            .create_function(move |lua, args: Variadic<LuaValue>| {
                let tostring: Function = lua.globals().get("tostring")?;
                let parts = args.into_iter().map(|arg| tostring.call::<String>(arg)).collect::<mlua::Result<Vec<_>>>()?;
                log_script_message(&name, level, &parts.join(" "));
                Ok(())
            })
            .map_err(|e| anyhow::anyhow!("failed to create console.{method}: {e}"))?;
        console.set(method, func).map_err(|e| anyhow::anyhow!("failed to register console.{method}: {e}"))?;
    }
    globals.set("console", console).map_err(|e| anyhow::anyhow!("failed to register console: {e}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lua() -> Lua {
        let lua = Lua::new();
        install_helpers(&lua, "test-plugin").expect("helpers install");
        lua
    }

    #[test]
    fn btoa_matches_standard_alphabet() {
        assert_eq!(btoa(b"hello"), "aGVsbG8=");
        assert_eq!(btoa(b""), "");
        let lua = lua();
        let out: String = lua.load(r#"return btoa("hello")"#).eval().expect("eval");
        assert_eq!(out, "aGVsbG8=");
    }

    #[test]
    fn atob_reverses_btoa() {
        let lua = lua();
        let out: String = lua.load(r#"return atob(btoa("SELECT 1"))"#).eval().expect("eval");
        assert_eq!(out, "SELECT 1");
    }

    #[test]
    fn atob_is_binary_safe() {
        let lua = lua();
        let len: i64 = lua.load(r#"return #atob("AP8A")"#).eval().expect("eval");
        assert_eq!(len, 3);
    }

    #[test]
    fn atob_rejects_invalid_input() {
        assert!(atob(b"not base64!").is_err());
        let lua = lua();
        let err = lua.load(r#"return atob("%%%")"#).eval::<String>().expect_err("invalid input");
        assert!(err.to_string().contains("atob: invalid base64 input"), "unexpected error: {err}");
    }

    #[test]
    fn helpers_require_an_argument() {
        let lua = lua();
        for helper in ["btoa", "atob", "parseSQL"] {
            let err = lua.load(format!("return {helper}()")).eval::<LuaValue>().expect_err("missing argument");
            assert!(err.to_string().contains(&format!("{helper} requires 1 argument")), "unexpected error: {err}");
        }
    }

    #[test]
    fn parse_sql_returns_json_ast() {
        let json = parse_sql("SELECT id FROM users WHERE id = 1").expect("valid SQL");
        let ast: serde_json::Value = serde_json::from_str(&json).expect("AST is JSON");
        assert_eq!(ast.as_array().map(Vec::len), Some(1));

        let lua = lua();
        let from_script: String = lua.load(r#"return parseSQL("SELECT 1")"#).eval().expect("eval");
        assert!(from_script.starts_with('['));
    }

    #[test]
    fn parse_sql_rejects_invalid_sql() {
        let err = parse_sql("SELEC FROM").expect_err("invalid SQL");
        assert!(err.starts_with("parseSQL: "));
        let lua = lua();
        let ok: bool = lua.load(r#"return (pcall(parseSQL, "SELEC FROM"))"#).eval().expect("eval");
        assert!(!ok);
    }

    #[test]
    fn value_normalizes_and_validates() {
        let lua = lua();
        let is_null: bool = lua.load("return Value(nil) == null").eval().expect("eval");
        assert!(is_null);
        let n: i64 = lua.load("return Value(7)").eval().expect("eval");
        assert_eq!(n, 7);
        let nested: String = lua.load(r#"return Value({ a = { b = "c" } }).a.b"#).eval().expect("eval");
        assert_eq!(nested, "c");
        let err = lua.load("return Value(function() end)").eval::<LuaValue>().expect_err("functions rejected");
        assert!(err.to_string().contains("Value:"), "unexpected error: {err}");
        let err = lua.load("return Value({ 1, 2, name = 'x' })").eval::<LuaValue>().expect_err("mixed table rejected");
        assert!(err.to_string().contains("table mixes list and map keys"), "unexpected error: {err}");
    }

    #[test]
    fn console_accepts_any_arguments() {
        let lua = lua();
        lua.load(r#"console.log("a", 1, true, nil); console.warn({}); console.error(); console.debug("d"); console.info("i")"#)
            .exec()
            .expect("console calls succeed");
    }
}
