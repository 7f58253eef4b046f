//! IPC - fixed-size message queues
//!
//! - [`ring`]: slot storage backing one queue
//! - [`queue`]: the [`MessageQueue`] state machine and transfer paths
//! - [`registry`]: diagnostic hooks notified on create/rename/destroy
//! - [`codec`]: typed send/receive through `postcard`
//! - [`stats`]: per-queue counters

pub mod codec;
pub mod queue;
pub mod registry;
pub mod ring;
pub mod stats;

pub use queue::{BlockingMode, MessagePriority, MessageQueue, QueueState};
pub use registry::{NameRegistry, QueueInfo, QueueRegistry};
pub use ring::SlotRing;
pub use stats::{QueueStats, QueueStatsSnapshot};

use core::fmt;

/// Queue handle, unique within one [`OsContext`](crate::OsContext)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueId(pub u64);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue#{}", self.0)
    }
}
