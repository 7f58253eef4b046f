//! Scheduler collaborator
//!
//! The queue never schedules anything itself. It asks the scheduler who is
//! running, how important that task is, and to suspend or resume it.
//!
//! ## Contract:
//! - `block_current` may return early (spurious wake); callers re-check state
//! - an `unblock` delivered before the target blocks must not be lost
//! - `uptime` is monotonic

use core::fmt;
use core::time::Duration;

#[cfg(feature = "std")]
mod host;

#[cfg(feature = "std")]
pub use host::HostScheduler;

/// Scheduler-assigned task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Task priority (higher = woken first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u8);

impl Priority {
    pub const IDLE: Priority = Priority(0);
    pub const LOW: Priority = Priority(64);
    pub const NORMAL: Priority = Priority(128);
    pub const HIGH: Priority = Priority(192);
    pub const REALTIME: Priority = Priority(255);
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NORMAL
    }
}

/// Suspend/resume primitives the queue delegates to
pub trait Scheduler: Send + Sync {
    /// Task making the current call
    fn current_task(&self) -> TaskId;

    /// Priority used to order waiters
    fn priority_of(&self, task: TaskId) -> Priority;

    /// Suspend the calling task until unblocked, or until `timeout` elapses
    fn block_current(&self, timeout: Option<Duration>);

    /// Make a blocked task runnable again
    fn unblock(&self, task: TaskId);

    /// Monotonic time since the scheduler started
    fn uptime(&self) -> Duration;
}
