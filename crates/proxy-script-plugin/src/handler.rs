//! Hook invoker: runs one bound script function with passthrough semantics.
//!
//! Every invocation is counted before anything else happens. Unbound hooks
//! hand the request straight back. Bound hooks run under the interpreter
//! mutex with `(ctx, req)` as their only arguments; any fault (a Lua error,
//! a panic escaping a helper, a return value that is not a Structured
//! Record) is logged and reported alongside the original, untouched
//! request. Nothing is retried.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Mutex;

use mlua::Lua;
use mlua::Value as LuaValue;
use tracing::error;
use tracing::trace;

use crate::context::ExecutionContext;
use crate::error::PluginError;
use crate::hooks::HookName;
use crate::marshal;
use crate::metrics::HookCounters;
use crate::registry::Binding;
use crate::registry::FunctionRegistry;
use crate::value::Record;
use crate::value::Value;

/// Outcome of one hook call.
///
/// `record` is always usable: either the script's transformed record or,
/// when `error` is set, the original request unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct HookReply {
    pub record: Record,
    pub error: Option<PluginError>,
}

impl HookReply {
    pub fn ok(record: Record) -> Self {
        Self { record, error: None }
    }

    pub fn failed(original: Record, error: PluginError) -> Self {
        Self {
            record: original,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Drop the passthrough record on failure.
    pub fn into_result(self) -> Result<Record, PluginError> {
        match self.error {
            None => Ok(self.record),
            Some(e) => Err(e),
        }
    }
}

/// Dispatches hook calls into the shared interpreter.
///
/// Cheap to clone; clones share the interpreter, bindings and counters.
#[derive(Clone)]
pub struct HookInvoker {
    /// The interpreter. `std::sync::Mutex` because script calls are blocking.
    lua: Arc<Mutex<Lua>>,
    registry: Arc<FunctionRegistry>,
    counters: Arc<HookCounters>,
}

impl HookInvoker {
    pub fn new(lua: Arc<Mutex<Lua>>, registry: Arc<FunctionRegistry>, counters: Arc<HookCounters>) -> Self {
        Self { lua, registry, counters }
    }

    pub fn counters(&self) -> &Arc<HookCounters> {
        &self.counters
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// Invoke the script function bound to `hook`.
    ///
    /// Blocks on the interpreter mutex when the hook is bound. Never fails:
    /// errors come back inside the [`HookReply`] together with `req`.
    pub fn invoke(&self, hook: HookName, ctx: &ExecutionContext, req: Record) -> HookReply {
        self.counters.record(hook);

        let Some(binding) = self.registry.function(hook) else {
            trace!(hook = %hook, "no script function bound, passing request through");
            return HookReply::ok(req);
        };

        match self.call(hook, &binding, ctx, &req) {
            Ok(record) => HookReply::ok(record),
            Err(e) => {
                error!(hook = %hook, error = %e, "script hook failed, passing request through");
                HookReply::failed(req, e)
            }
        }
    }

    fn call(&self, hook: HookName, binding: &Binding, ctx: &ExecutionContext, req: &Record) -> Result<Record, PluginError> {
        let lua = self.lua.lock().map_err(|e| PluginError::InterpreterUnavailable(format!("interpreter mutex poisoned: {e}")))?;

        // The guard stays outside the unwind boundary, so a panic caught
        // here never poisons the interpreter mutex.
        match std::panic::catch_unwind(AssertUnwindSafe(|| call_script(&lua, hook, binding, ctx, req))) {
            Ok(result) => result,
            Err(panic) => Err(PluginError::Script {
                hook: hook.to_string(),
                message: format!("panic in script call: {}", panic_message(panic.as_ref())),
            }),
        }
    }
}

fn call_script(
    lua: &Lua,
    hook: HookName,
    binding: &Binding,
    ctx: &ExecutionContext,
    req: &Record,
) -> Result<Record, PluginError> {
    let script_error = |e: mlua::Error| PluginError::Script {
        hook: hook.to_string(),
        message: e.to_string(),
    };

    let func = binding.function(lua).map_err(script_error)?;
    let ctx_value = ctx.to_lua(lua, hook).map_err(|e| PluginError::Marshal(format!("execution context: {e}")))?;
    let req_value = marshal::record_to_lua(lua, req).map_err(|e| PluginError::Marshal(format!("request: {e}")))?;

    let ret: LuaValue = func.call((ctx_value, req_value)).map_err(script_error)?;

    let return_type = |got: &str| PluginError::ReturnType {
        hook: hook.to_string(),
        got: got.to_string(),
    };

    if !matches!(ret, LuaValue::Table(_)) {
        return Err(return_type(marshal::lua_type_name(&ret)));
    }
    match marshal::lua_to_value(lua, ret) {
        Ok(Value::Struct(record)) => Ok(record),
        Ok(other) => Err(return_type(other.type_name())),
        Err(e) => Err(PluginError::Marshal(format!("return value of '{hook}': {e}"))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
