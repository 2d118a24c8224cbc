//! Per-call execution context handed to every hook.
//!
//! The context carries an optional deadline and a cancellation flag owned by
//! the host. Scripts only ever see a snapshot table built right before the
//! call; nothing they do to it flows back.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use mlua::Lua;
use mlua::LuaSerdeExt;
use serde::Serialize;

use crate::hooks::HookName;

/// Deadline and cancellation state for one host call.
///
/// Clones share the cancellation flag, so a host can keep one clone and
/// cancel while another is in flight. The deadline is advisory: a running
/// script is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

/// What the script sees as its first argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSnapshot {
    pub hook: &'static str,
    pub deadline_ms: Option<u64>,
    pub remaining_ms: Option<u64>,
    pub cancelled: bool,
}

impl ExecutionContext {
    /// A context with no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, saturating at zero.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|r| r.is_zero())
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self, hook: HookName) -> ContextSnapshot {
        let remaining = self.remaining();
        ContextSnapshot {
            hook: hook.as_str(),
            deadline_ms: remaining.map(|r| now_ms().saturating_add(r.as_millis() as u64)),
            remaining_ms: remaining.map(|r| r.as_millis() as u64),
            cancelled: self.is_cancelled(),
        }
    }

    /// Build the table passed to the script as `ctx`.
    pub(crate) fn to_lua(&self, lua: &Lua, hook: HookName) -> mlua::Result<mlua::Value> {
        lua.to_value(&self.snapshot(hook))
    }
}

/// Wall-clock time as milliseconds since the Unix epoch.
fn now_ms() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
