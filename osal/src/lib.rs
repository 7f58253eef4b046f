//! Exo-OSAL - OS abstraction layer message queues
//!
//! Fixed-capacity, fixed-item-size FIFO channels for exchanging serialized
//! messages between tasks of a preemptive, priority-based scheduler.
//!
//! ## Layout:
//! - [`context`]: process-wide [`OsContext`] (scheduler, registry, counters, memory budget)
//! - [`scheduler`]: the [`Scheduler`] collaborator trait (+ [`HostScheduler`] with `std`)
//! - [`sync`]: priority-ordered wait queues used to suspend and wake tasks
//! - [`ipc`]: the [`MessageQueue`] itself, its slot ring, registry hooks and codec
//!
//! ```ignore
//! use exo_osal::{BlockingMode, MessageQueue, OsContext};
//!
//! let context = OsContext::host();
//! let queue = MessageQueue::new(&context);
//! queue.initialize("telemetry", 8, 64)?;
//!
//! queue.send(b"hello", BlockingMode::NonBlocking)?;
//! let mut buf = [0u8; 64];
//! let len = queue.receive(&mut buf, BlockingMode::Blocking)?;
//! assert_eq!(&buf[..len], b"hello");
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod config;
pub mod context;
pub mod error;
pub mod ipc;
pub mod scheduler;
pub mod sync;

pub use config::{QueueConfig, MAX_QUEUE_NAME_LEN};
pub use context::{OsContext, OsContextBuilder};
pub use error::{QueueError, QueueResult, RegistryError};
pub use ipc::{
    BlockingMode, MessagePriority, MessageQueue, NameRegistry, QueueId, QueueInfo, QueueRegistry,
    QueueState, QueueStatsSnapshot,
};
pub use scheduler::{Priority, Scheduler, TaskId};
#[cfg(feature = "std")]
pub use scheduler::HostScheduler;
