//! Plugin settings and the descriptor returned on the configuration
//! handshake.
//!
//! Settings come from environment variables (`SCRIPT_PATH`,
//! `METRICS_ENABLED`, `METRICS_UNIX_DOMAIN_SOCKET`, `METRICS_ENDPOINT`)
//! through the `config` crate; every field has a default.

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::error::PluginError;
use crate::value::Record;
use crate::value::Value;

pub const PLUGIN_NAME: &str = "proxy-script-plugin";
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const REMOTE_URL: &str = "github.com/proxy-script-plugin/proxy-script-plugin";
pub const PROJECT_URL: &str = "https://github.com/proxy-script-plugin/proxy-script-plugin";
pub const LICENSE: &str = "Apache 2.0";

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Script loaded at startup.
    #[serde(default = "default_script_path")]
    pub script_path: PathBuf,
    /// Whether the host should scrape this plugin's counters.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    #[serde(default = "default_metrics_socket")]
    pub metrics_unix_domain_socket: PathBuf,
    #[serde(default = "default_metrics_endpoint")]
    pub metrics_endpoint: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            script_path: default_script_path(),
            metrics_enabled: default_true(),
            metrics_unix_domain_socket: default_metrics_socket(),
            metrics_endpoint: default_metrics_endpoint(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, PluginError> {
        Self::from_environment(config::Environment::default())
    }

    /// Read settings from an explicit variable map instead of the process
    /// environment.
    pub fn from_vars(vars: config::Map<String, String>) -> Result<Self, PluginError> {
        Self::from_environment(config::Environment::default().source(Some(vars)))
    }

    fn from_environment(env: config::Environment) -> Result<Self, PluginError> {
        let config = config::Config::builder()
            .add_source(env.try_parsing(true))
            .build()
            .map_err(|e| PluginError::Config(format!("failed to build settings: {e}")))?;

        config.try_deserialize().map_err(|e| PluginError::Config(format!("failed to deserialize settings: {e}")))
    }

    /// Settings as reported in the descriptor's `config` field.
    ///
    /// Values are strings, matching the host's string-map view of plugin
    /// configuration.
    pub fn to_record(&self) -> Record {
        Record::new()
            .with("metricsEnabled", self.metrics_enabled.to_string())
            .with("metricsUnixDomainSocket", self.metrics_unix_domain_socket.display().to_string())
            .with("metricsEndpoint", self.metrics_endpoint.clone())
            .with("scriptPath", self.script_path.display().to_string())
    }
}

fn default_script_path() -> PathBuf {
    PathBuf::from("./scripts/index.lua")
}

fn default_true() -> bool {
    true
}

fn default_metrics_socket() -> PathBuf {
    PathBuf::from("/tmp/proxy-script-plugin.sock")
}

fn default_metrics_endpoint() -> String {
    "/metrics".to_string()
}

/// Static identity of the plugin, combined with live settings and
/// capabilities when the host asks for the plugin configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    pub remote_url: String,
    pub description: String,
    pub authors: Vec<String>,
    pub license: String,
    pub project_url: String,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
}

impl Default for PluginDescriptor {
    fn default() -> Self {
        Self {
            name: PLUGIN_NAME.to_string(),
            version: PLUGIN_VERSION.to_string(),
            remote_url: REMOTE_URL.to_string(),
            description: "Database proxy plugin for running Lua functions as hooks".to_string(),
            authors: vec!["proxy-script-plugin contributors".to_string()],
            license: LICENSE.to_string(),
            project_url: PROJECT_URL.to_string(),
            tags: vec!["plugin".to_string(), "lua".to_string(), "script".to_string()],
            categories: vec!["builtin".to_string()],
        }
    }
}

impl PluginDescriptor {
    /// Build the handshake record.
    ///
    /// `hooks` is the capability list at the time of the call.
    pub fn to_record(&self, settings: &Settings, hooks: &[i32]) -> Record {
        let strings = |items: &[String]| Value::List(items.iter().map(|s| Value::from(s.as_str())).collect());

        let id = Record::new()
            .with("name", self.name.as_str())
            .with("version", self.version.as_str())
            .with("remoteUrl", self.remote_url.as_str());

        Record::new()
            .with("id", id)
            .with("description", self.description.as_str())
            .with("authors", strings(&self.authors))
            .with("license", self.license.as_str())
            .with("projectUrl", self.project_url.as_str())
            .with("config", settings.to_record())
            .with("hooks", Value::List(hooks.iter().map(|&id| Value::from(id)).collect()))
            .with("tags", strings(&self.tags))
            .with("categories", strings(&self.categories))
    }
}
