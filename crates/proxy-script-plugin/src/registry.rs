//! Function registry: which hooks the loaded script implements.
//!
//! After the script has run, every hook name is looked up as a global of
//! the same name. Functions are pinned in the Lua registry so later
//! reassignment of the global by the script does not change dispatch;
//! anything else (missing, a table, a number) leaves the hook unbound.
//! Unbound hooks are passthroughs, never errors.
//!
//! The registry also answers the host's capability query.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use mlua::Function;
use mlua::Lua;
use mlua::RegistryKey;
use mlua::Value as LuaValue;
use tracing::debug;
use tracing::trace;

use crate::error::PluginError;
use crate::hooks::HookName;

/// A script function pinned in the Lua registry.
///
/// Only valid for the `Lua` state that created it.
#[derive(Debug, Clone)]
pub struct Binding {
    key: Arc<RegistryKey>,
}

impl Binding {
    /// Resolve the bound function in `lua`.
    pub fn function(&self, lua: &Lua) -> mlua::Result<Function> {
        lua.registry_value(&self.key)
    }
}

/// Hook name → bound script function.
///
/// Lookups take a read lock only, so the invoker can check for a binding
/// without touching the interpreter.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    bindings: RwLock<HashMap<HookName, Binding>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every hook in `names` that the script defines as a global
    /// function. Existing bindings for those names are replaced or cleared.
    pub fn register_all(&self, lua: &Lua, names: &[HookName]) -> Result<(), PluginError> {
        for &name in names {
            self.register(lua, name)?;
        }
        debug!(bound = self.len(), "registered script functions");
        Ok(())
    }

    /// Bind a single hook. Returns whether the script defines it.
    pub fn register(&self, lua: &Lua, name: HookName) -> Result<bool, PluginError> {
        // Raw lookup: a strict-mode `__index` on `_G` must not turn an
        // undefined hook into a load failure.
        let global: LuaValue = match lua.globals().raw_get(name.as_str()) {
            Ok(value) => value,
            Err(e) => {
                trace!(hook = %name, error = %e, "global lookup failed, treating hook as absent");
                LuaValue::Nil
            }
        };

        let binding = match global {
            LuaValue::Function(func) => {
                let key = lua
                    .create_registry_value(func)
                    .map_err(|e| PluginError::Load(format!("failed to pin function '{name}': {e}")))?;
                trace!(hook = %name, "script function bound");
                Some(Binding { key: Arc::new(key) })
            }
            other => {
                trace!(hook = %name, found = other.type_name(), "script function not defined");
                None
            }
        };

        let mut bindings = self.bindings.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(match binding {
            Some(binding) => {
                bindings.insert(name, binding);
                true
            }
            None => {
                bindings.remove(&name);
                false
            }
        })
    }

    /// The binding for `name`, if the script defines it.
    pub fn function(&self, name: HookName) -> Option<Binding> {
        self.read().get(&name).cloned()
    }

    pub fn is_bound(&self, name: HookName) -> bool {
        self.read().contains_key(&name)
    }

    /// External identifiers of every bound hook, in hook declaration order.
    ///
    /// Computed from the current bindings on every call.
    pub fn capabilities(&self) -> Vec<i32> {
        let bindings = self.read();
        HookName::ALL.into_iter().filter(|hook| bindings.contains_key(hook)).map(|hook| hook.id()).collect()
    }

    /// Names of every bound hook, in hook declaration order.
    pub fn bound_hooks(&self) -> Vec<HookName> {
        let bindings = self.read();
        HookName::ALL.into_iter().filter(|hook| bindings.contains_key(hook)).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<HookName, Binding>> {
        // The map is consistent after any completed insert or remove.
        self.bindings.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lua_with(source: &str) -> Lua {
        let lua = Lua::new();
        lua.load(source).exec().expect("script should load");
        lua
    }

    #[test]
    fn defined_functions_are_bound() {
        let lua = lua_with("function onBooted(ctx, req) return req end\nfunction onTick(ctx, req) return req end");
        let registry = FunctionRegistry::new();
        registry.register_all(&lua, &HookName::ALL).expect("register_all");
        assert!(registry.is_bound(HookName::OnBooted));
        assert!(registry.is_bound(HookName::OnTick));
        assert!(!registry.is_bound(HookName::OnShutdown));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn strict_globals_metatable_does_not_fail_registration() {
        let lua = lua_with(
            "function onBooted(ctx, req) return req end\n\
             setmetatable(_G, { __index = function(_, k) error('variable ' .. k .. ' is not declared', 2) end })",
        );
        let registry = FunctionRegistry::new();
        registry.register_all(&lua, &HookName::ALL).expect("register_all");
        assert_eq!(registry.bound_hooks(), vec![HookName::OnBooted]);
    }

    #[test]
    fn non_function_globals_are_unbound() {
        let lua = lua_with("onBooted = 42\nonTick = { }\nonRun = 'nope'");
        let registry = FunctionRegistry::new();
        registry.register_all(&lua, &HookName::ALL).expect("register_all");
        assert!(registry.is_empty());
        assert!(registry.capabilities().is_empty());
    }

    #[test]
    fn capabilities_follow_declaration_order() {
        let lua = lua_with(
            "function onTrafficToClient(c, r) return r end\n\
             function onConfigLoaded(c, r) return r end\n\
             function onTrafficFromClient(c, r) return r end",
        );
        let registry = FunctionRegistry::new();
        registry.register_all(&lua, &HookName::ALL).expect("register_all");
        assert_eq!(registry.capabilities(), vec![
            HookName::OnConfigLoaded.id(),
            HookName::OnTrafficFromClient.id(),
            HookName::OnTrafficToClient.id(),
        ]);
        assert_eq!(registry.bound_hooks(), vec![
            HookName::OnConfigLoaded,
            HookName::OnTrafficFromClient,
            HookName::OnTrafficToClient,
        ]);
    }

    #[test]
    fn register_subset_only_touches_named_hooks() {
        let lua = lua_with("function onBooted(c, r) return r end\nfunction onRun(c, r) return r end");
        let registry = FunctionRegistry::new();
        registry.register_all(&lua, &[HookName::OnBooted]).expect("register_all");
        assert!(registry.is_bound(HookName::OnBooted));
        assert!(!registry.is_bound(HookName::OnRun));
    }

    #[test]
    fn reregistration_replaces_and_clears() {
        let lua = lua_with("function onBooted(c, r) return r end");
        let registry = FunctionRegistry::new();
        assert!(registry.register(&lua, HookName::OnBooted).expect("register"));

        lua.load("onBooted = nil\nfunction onRun(c, r) return r end").exec().expect("exec");
        registry.register_all(&lua, &HookName::ALL).expect("register_all");
        assert!(!registry.is_bound(HookName::OnBooted));
        assert!(registry.is_bound(HookName::OnRun));
    }

    #[test]
    fn binding_is_pinned_against_global_reassignment() {
        let lua = lua_with("function onTick(c, r) return { pinned = true } end");
        let registry = FunctionRegistry::new();
        registry.register(&lua, HookName::OnTick).expect("register");
        lua.load("onTick = function(c, r) return { pinned = false } end").exec().expect("exec");

        let func = registry.function(HookName::OnTick).expect("bound").function(&lua).expect("resolve");
        let out: mlua::Table = func.call((LuaValue::Nil, LuaValue::Nil)).expect("call");
        assert!(out.get::<bool>("pinned").expect("field"));
    }
}
