//! The plugin instance: one interpreter, its bindings and its counters.
//!
//! Loading happens in three steps, in this order:
//!
//! 1. helper globals are installed into a fresh interpreter
//! 2. the script source is executed once (top-level code runs here)
//! 3. every hook name is resolved against the script's globals
//!
//! After that the instance only dispatches. Interpreter work from async
//! callers runs through `spawn_blocking`, since script calls block on the
//! interpreter mutex.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use mlua::Lua;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::PluginDescriptor;
use crate::config::Settings;
use crate::context::ExecutionContext;
use crate::error::PluginError;
use crate::handler::HookInvoker;
use crate::handler::HookReply;
use crate::hooks::HookName;
use crate::host;
use crate::metrics::HookCounters;
use crate::registry::FunctionRegistry;
use crate::service::HookService;
use crate::value::Record;

/// A loaded user script exposed as a set of hooks.
pub struct ScriptPlugin {
    lua: Arc<Mutex<Lua>>,
    invoker: HookInvoker,
    settings: Settings,
    descriptor: PluginDescriptor,
}

impl ScriptPlugin {
    /// Create an instance with helpers installed and no script loaded.
    pub fn new(settings: Settings) -> Result<Self, PluginError> {
        Self::with_counters(settings, Arc::new(HookCounters::new()))
    }

    /// Like [`ScriptPlugin::new`], recording calls into `counters`.
    pub fn with_counters(settings: Settings, counters: Arc<HookCounters>) -> Result<Self, PluginError> {
        let descriptor = PluginDescriptor::default();
        let lua = Lua::new();
        host::install_helpers(&lua, &descriptor.name).map_err(|e| PluginError::Load(format!("{e:#}")))?;

        let lua = Arc::new(Mutex::new(lua));
        let invoker = HookInvoker::new(Arc::clone(&lua), Arc::new(FunctionRegistry::new()), counters);
        Ok(Self {
            lua,
            invoker,
            settings,
            descriptor,
        })
    }

    /// Create an instance, run `source` and bind every hook it defines.
    pub fn load(settings: Settings, source: &str) -> Result<Self, PluginError> {
        let plugin = Self::new(settings)?;
        let chunk_name = plugin.settings.script_path.display().to_string();
        plugin.exec(source, &chunk_name)?;
        plugin.register_functions()?;
        info!(
            plugin = %plugin.descriptor.name,
            script = %chunk_name,
            bytes = source.len(),
            hooks = ?plugin.invoker.registry().bound_hooks(),
            "script loaded"
        );
        Ok(plugin)
    }

    /// Execute script source in the interpreter.
    ///
    /// Does not touch bindings; call [`ScriptPlugin::register_functions`]
    /// afterwards to pick up newly defined hooks.
    pub fn exec(&self, source: &str, chunk_name: &str) -> Result<(), PluginError> {
        let lua = self.lock()?;
        lua.load(source).set_name(chunk_name).exec().map_err(|e| PluginError::Load(format!("{chunk_name}: {e}")))?;
        debug!(script = %chunk_name, bytes = source.len(), "script executed");
        Ok(())
    }

    /// Resolve every hook name against the script's globals.
    pub fn register_functions(&self) -> Result<(), PluginError> {
        self.register(&HookName::ALL)
    }

    /// Resolve the given hook names against the script's globals.
    pub fn register(&self, names: &[HookName]) -> Result<(), PluginError> {
        let lua = self.lock()?;
        self.invoker.registry().register_all(&lua, names)
    }

    /// Invoke a hook on the calling thread.
    pub fn invoke(&self, hook: HookName, ctx: &ExecutionContext, req: Record) -> HookReply {
        self.invoker.invoke(hook, ctx, req)
    }

    /// External identifiers of the hooks the script implements.
    pub fn capabilities(&self) -> Vec<i32> {
        self.invoker.registry().capabilities()
    }

    pub fn is_bound(&self, hook: HookName) -> bool {
        self.invoker.registry().is_bound(hook)
    }

    /// Handshake record: identity, settings and current capabilities.
    pub fn plugin_config(&self) -> Record {
        self.invoker.counters().record_plugin_config();
        self.descriptor.to_record(&self.settings, &self.capabilities())
    }

    pub fn counters(&self) -> &Arc<HookCounters> {
        self.invoker.counters()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Lua>, PluginError> {
        self.lua.lock().map_err(|e| PluginError::InterpreterUnavailable(format!("interpreter mutex poisoned: {e}")))
    }
}

#[async_trait]
impl HookService for ScriptPlugin {
    async fn dispatch(&self, hook: HookName, ctx: ExecutionContext, req: Record) -> HookReply {
        // Unbound hooks never touch the interpreter.
        if !self.is_bound(hook) {
            return self.invoker.invoke(hook, &ctx, req);
        }

        let invoker = self.invoker.clone();
        let original = req.clone();
        match tokio::task::spawn_blocking(move || invoker.invoke(hook, &ctx, req)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(hook = %hook, error = %e, "script task failed, passing request through");
                HookReply::failed(original, PluginError::Script {
                    hook: hook.to_string(),
                    message: format!("script task failed: {e}"),
                })
            }
        }
    }

    async fn get_plugin_config(&self, _ctx: ExecutionContext) -> Result<Record, PluginError> {
        Ok(self.plugin_config())
    }
}
