//! Lua hook dispatch bridge for database-proxy plugins.
//!
//! Loads a user script into an embedded Lua interpreter, discovers which of
//! the proxy's lifecycle and traffic hooks the script implements, and
//! dispatches host events to those functions.
//!
//! ## Dispatch contract
//!
//! 1. Every call is counted in [`HookCounters`], bound or not
//! 2. Hooks the script does not define pass the request through untouched
//! 3. Bound hooks receive `(ctx, req)` and must return a Structured Record
//! 4. Any fault returns the original request together with a [`PluginError`]
//!
//! ## Script helpers
//!
//! Scripts can use `btoa`, `atob`, `parseSQL`, `Value`, `null` and
//! `console.*`. See the `host` module for details.

pub mod config;
pub mod context;
pub mod error;
mod handler;
pub mod hooks;
mod host;
pub mod marshal;
pub mod metrics;
mod plugin;
mod registry;
pub mod service;
pub mod value;

pub use config::PluginDescriptor;
pub use config::Settings;
pub use context::ExecutionContext;
pub use error::PluginError;
pub use handler::HookInvoker;
pub use handler::HookReply;
pub use hooks::HookName;
pub use metrics::HookCounters;
pub use plugin::ScriptPlugin;
pub use registry::FunctionRegistry;
pub use service::HookService;
pub use value::Record;
pub use value::Value;

/// Test utilities for loading scripts in integration tests.
///
/// Provides [`load_script`](test_support::load_script), which builds a
/// plugin from inline source with default settings, a counters-sharing
/// variant, and a request builder.
#[cfg(any(test, feature = "testing"))]
pub mod test_support {
    use std::sync::Arc;

    use crate::HookCounters;
    use crate::PluginError;
    use crate::Record;
    use crate::ScriptPlugin;
    use crate::Settings;

    /// Load `source` as a plugin with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Load`] if the script does not compile or its
    /// top-level code raises.
    pub fn load_script(source: &str) -> Result<ScriptPlugin, PluginError> {
        ScriptPlugin::load(Settings::default(), source)
    }

    /// Load `source` recording calls into the returned counters.
    pub fn load_script_with_counters(source: &str) -> Result<(ScriptPlugin, Arc<HookCounters>), PluginError> {
        let counters = Arc::new(HookCounters::new());
        let plugin = ScriptPlugin::with_counters(Settings::default(), Arc::clone(&counters))?;
        plugin.exec(source, "test")?;
        plugin.register_functions()?;
        Ok((plugin, counters))
    }

    /// A request shaped like a client query forwarded by the proxy.
    pub fn sample_request() -> Record {
        Record::new()
            .with("client", Record::new().with("local", "127.0.0.1:15432").with("remote", "127.0.0.1:50000"))
            .with("request", crate::host::btoa(b"SELECT 1"))
    }
}
