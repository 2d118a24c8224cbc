//! Hook names and the host dispatch table.
//!
//! Every lifecycle or traffic event the host can forward to this plugin is
//! a [`HookName`]. Each name maps to exactly one external numeric
//! identifier understood by the host; the same mapping is used to
//! advertise capabilities and to route incoming host calls.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::error::PluginError;

/// All hooks a script may implement.
///
/// The serde representation is the script-facing function name
/// (`onTrafficFromClient`), which is also what [`HookName::as_str`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookName {
    // -- Configuration and startup --
    /// Global config has been loaded by the host.
    OnConfigLoaded,
    /// A logger was created.
    OnNewLogger,
    /// A connection pool was created.
    OnNewPool,
    /// A backend client was created.
    OnNewClient,
    /// A proxy was created.
    OnNewProxy,
    /// A server was created.
    OnNewServer,
    /// The host received an OS signal.
    OnSignal,
    /// The host started running.
    OnRun,
    /// The host is booting.
    OnBooting,
    /// The host finished booting.
    OnBooted,

    // -- Client connections --
    /// A client connection is being opened.
    OnOpening,
    /// A client connection was opened.
    OnOpened,
    /// A client connection is being closed.
    OnClosing,
    /// A client connection was closed.
    OnClosed,

    // -- Traffic --
    /// Traffic was received from a client.
    OnTraffic,
    /// A request arrived from the client.
    OnTrafficFromClient,
    /// A request is about to be sent to the server.
    OnTrafficToServer,
    /// A response arrived from the server.
    OnTrafficFromServer,
    /// A response is about to be sent to the client.
    OnTrafficToClient,

    // -- Shutdown and housekeeping --
    /// The host is shutting down.
    OnShutdown,
    /// Periodic tick, when enabled on the host.
    OnTick,
}

impl HookName {
    /// Number of hooks.
    pub const COUNT: usize = 21;

    /// Every hook, in declaration order.
    pub const ALL: [HookName; Self::COUNT] = [
        Self::OnConfigLoaded,
        Self::OnNewLogger,
        Self::OnNewPool,
        Self::OnNewClient,
        Self::OnNewProxy,
        Self::OnNewServer,
        Self::OnSignal,
        Self::OnRun,
        Self::OnBooting,
        Self::OnBooted,
        Self::OnOpening,
        Self::OnOpened,
        Self::OnClosing,
        Self::OnClosed,
        Self::OnTraffic,
        Self::OnTrafficFromClient,
        Self::OnTrafficToServer,
        Self::OnTrafficFromServer,
        Self::OnTrafficToClient,
        Self::OnShutdown,
        Self::OnTick,
    ];

    /// Name of the global script function that implements this hook.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnConfigLoaded => "onConfigLoaded",
            Self::OnNewLogger => "onNewLogger",
            Self::OnNewPool => "onNewPool",
            Self::OnNewClient => "onNewClient",
            Self::OnNewProxy => "onNewProxy",
            Self::OnNewServer => "onNewServer",
            Self::OnSignal => "onSignal",
            Self::OnRun => "onRun",
            Self::OnBooting => "onBooting",
            Self::OnBooted => "onBooted",
            Self::OnOpening => "onOpening",
            Self::OnOpened => "onOpened",
            Self::OnClosing => "onClosing",
            Self::OnClosed => "onClosed",
            Self::OnTraffic => "onTraffic",
            Self::OnTrafficFromClient => "onTrafficFromClient",
            Self::OnTrafficToServer => "onTrafficToServer",
            Self::OnTrafficFromServer => "onTrafficFromServer",
            Self::OnTrafficToClient => "onTrafficToClient",
            Self::OnShutdown => "onShutdown",
            Self::OnTick => "onTick",
        }
    }

    /// External identifier of this hook in the host's plugin protocol.
    #[must_use]
    pub fn id(&self) -> i32 {
        match self {
            Self::OnConfigLoaded => 1,
            Self::OnNewLogger => 2,
            Self::OnNewPool => 3,
            Self::OnNewClient => 4,
            Self::OnNewProxy => 5,
            Self::OnNewServer => 6,
            Self::OnSignal => 7,
            Self::OnRun => 8,
            Self::OnBooting => 9,
            Self::OnBooted => 10,
            Self::OnOpening => 11,
            Self::OnOpened => 12,
            Self::OnClosing => 13,
            Self::OnClosed => 14,
            Self::OnTraffic => 15,
            Self::OnTrafficFromClient => 16,
            Self::OnTrafficToServer => 17,
            Self::OnTrafficFromServer => 18,
            Self::OnTrafficToClient => 19,
            Self::OnShutdown => 20,
            Self::OnTick => 21,
        }
    }

    /// Looks up a hook by its external identifier.
    #[must_use]
    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|hook| hook.id() == id)
    }

    /// Returns `true` for hooks whose result the host treats as a
    /// notification: the script runs and its return value is validated the
    /// same way, but the host does not apply mutations it makes.
    #[must_use]
    pub fn is_notification(&self) -> bool {
        matches!(
            self,
            Self::OnNewLogger
                | Self::OnNewPool
                | Self::OnNewClient
                | Self::OnNewProxy
                | Self::OnNewServer
                | Self::OnSignal
                | Self::OnTraffic
        )
    }

    /// Position of this hook in [`HookName::ALL`].
    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl FromStr for HookName {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|hook| hook.as_str() == s)
            .ok_or_else(|| PluginError::UnknownHook(s.to_string()))
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
