//! Error types for script loading and hook dispatch.

use thiserror::Error;

/// Errors produced by the plugin.
///
/// Invocation errors (`Script`, `ReturnType`, `Marshal`,
/// `InterpreterUnavailable`, `UnknownHook`) never travel alone: the invoker
/// always pairs them with the original, unmodified request in a
/// [`HookReply`](crate::HookReply).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    /// The script raised an error or a helper faulted while it ran.
    #[error("script function '{hook}' failed: {message}")]
    Script {
        /// Hook whose function faulted.
        hook: String,
        /// Fault detail reported by the interpreter.
        message: String,
    },

    /// The script returned something other than a Structured Record.
    #[error("script function '{hook}' returned an invalid value: expected Structured Record, got {got}")]
    ReturnType {
        /// Hook whose function misbehaved.
        hook: String,
        /// Script type name of the returned value.
        got: String,
    },

    /// A value could not cross the script boundary.
    #[error("marshalling failed: {0}")]
    Marshal(String),

    /// The interpreter lock is poisoned and the interpreter can no longer be used.
    #[error("script interpreter unavailable: {0}")]
    InterpreterUnavailable(String),

    /// The hook name or identifier is not part of the dispatch table.
    #[error("unknown hook: {0}")]
    UnknownHook(String),

    /// The script or its helpers could not be loaded.
    #[error("failed to load script: {0}")]
    Load(String),

    /// Settings could not be read.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<config::ConfigError> for PluginError {
    fn from(err: config::ConfigError) -> Self {
        PluginError::Config(err.to_string())
    }
}
