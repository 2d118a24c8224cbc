//! Per-hook call counters.
//!
//! Counters are plain atomics so the invoker can bump them without taking
//! the interpreter lock. They only ever grow; exposition is left to the
//! host's metrics endpoint, which reads them through [`HookCounters::snapshot`].

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Serialize;

use crate::hooks::HookName;

/// One monotonically increasing counter per hook, plus one for
/// configuration handshakes.
#[derive(Debug, Default)]
pub struct HookCounters {
    hooks: [AtomicU64; HookName::COUNT],
    plugin_config: AtomicU64,
}

/// Point-in-time copy of every counter, in hook declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub hooks: Vec<(HookName, u64)>,
    pub plugin_config: u64,
}

impl CounterSnapshot {
    /// Total number of hook invocation attempts.
    pub fn total(&self) -> u64 {
        self.hooks.iter().map(|(_, count)| count).sum()
    }
}

impl HookCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one invocation attempt of `hook`.
    pub fn record(&self, hook: HookName) {
        self.hooks[hook.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Record one configuration handshake.
    pub fn record_plugin_config(&self) {
        self.plugin_config.fetch_add(1, Ordering::Relaxed);
    }

    /// Current count for `hook`.
    pub fn get(&self, hook: HookName) -> u64 {
        self.hooks[hook.index()].load(Ordering::Relaxed)
    }

    /// Number of configuration handshakes served.
    pub fn plugin_config_requests(&self) -> u64 {
        self.plugin_config.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            hooks: HookName::ALL.into_iter().map(|hook| (hook, self.get(hook))).collect(),
            plugin_config: self.plugin_config_requests(),
        }
    }
}
