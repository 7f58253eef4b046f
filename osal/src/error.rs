//! Queue Error Handling
//!
//! Typed, recoverable failures for every queue operation. None of these abort:
//! the only fatal path is an internal slot-accounting breach, which goes
//! through [`invariant_violation`].

use core::fmt;

/// Standard result type for queue operations
pub type QueueResult<T> = core::result::Result<T, QueueError>;

/// Queue error types with the numbers that caused them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    // ═══════════════════════════════════════════════════════════════
    // Creation Errors
    // ═══════════════════════════════════════════════════════════════

    /// Capacity or item size is zero
    InvalidConfiguration { capacity: usize, item_size: usize },

    /// Backing storage could not be allocated (or the memory budget is spent)
    ResourceExhausted { requested: usize },

    /// Geometry change attempted while messages are still queued
    BusyCannotResize { occupancy: usize },

    // ═══════════════════════════════════════════════════════════════
    // Transfer Errors
    // ═══════════════════════════════════════════════════════════════

    /// Operation before initialize or after destroy
    NotReady,

    /// Zero-length payload
    EmptyPayload,

    /// Payload larger than the item size, or receive buffer smaller than it
    SizeMismatch { len: usize, item_size: usize },

    /// Non-blocking send on a full queue
    Full,

    /// Non-blocking receive on an empty queue
    NoMessage,

    /// Woken by teardown while blocked
    Destroyed,

    /// Bounded wait expired
    TimedOut,

    // ═══════════════════════════════════════════════════════════════
    // Codec Errors
    // ═══════════════════════════════════════════════════════════════

    /// Value could not be encoded
    Serialization,

    /// Received bytes could not be decoded
    Deserialization,
}

impl QueueError {
    /// Short identifier used in log lines
    pub const fn as_str(&self) -> &'static str {
        match self {
            QueueError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            QueueError::ResourceExhausted { .. } => "RESOURCE_EXHAUSTED",
            QueueError::BusyCannotResize { .. } => "BUSY_CANNOT_RESIZE",
            QueueError::NotReady => "NOT_READY",
            QueueError::EmptyPayload => "EMPTY_PAYLOAD",
            QueueError::SizeMismatch { .. } => "SIZE_MISMATCH",
            QueueError::Full => "FULL",
            QueueError::NoMessage => "NO_MESSAGE",
            QueueError::Destroyed => "DESTROYED",
            QueueError::TimedOut => "TIMED_OUT",
            QueueError::Serialization => "SERIALIZATION",
            QueueError::Deserialization => "DESERIALIZATION",
        }
    }
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::InvalidConfiguration { capacity, item_size } => write!(
                f,
                "Invalid queue configuration: capacity {} item size {}",
                capacity, item_size
            ),
            QueueError::ResourceExhausted { requested } => {
                write!(f, "Could not allocate {} bytes of queue storage", requested)
            }
            QueueError::BusyCannotResize { occupancy } => {
                write!(f, "Cannot resize queue holding {} messages", occupancy)
            }
            QueueError::NotReady => write!(f, "Queue not initialized"),
            QueueError::EmptyPayload => write!(f, "Empty payload"),
            QueueError::SizeMismatch { len, item_size } => {
                write!(f, "Size mismatch: {} bytes against item size {}", len, item_size)
            }
            QueueError::Full => write!(f, "Queue full"),
            QueueError::NoMessage => write!(f, "No message available"),
            QueueError::Destroyed => write!(f, "Queue destroyed while waiting"),
            QueueError::TimedOut => write!(f, "Operation timed out"),
            QueueError::Serialization => write!(f, "Message serialization failed"),
            QueueError::Deserialization => write!(f, "Message deserialization failed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for QueueError {}

/// Registry hook failures; logged by the queue, never propagated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// Registry has no room for another entry
    Full { limit: usize },
    /// Queue id not registered
    UnknownQueue { id: u64 },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Full { limit } => write!(f, "Registry full ({} entries)", limit),
            RegistryError::UnknownQueue { id } => write!(f, "Queue {} not registered", id),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RegistryError {}

/// Slot accounting no longer adds up. Continuing would hand out corrupt data.
///
/// With `std` the process aborts after logging, whatever the panic strategy.
/// Without `std` this panics; the kernel's panic handler (or `panic = "abort"`)
/// stops the system. Unit tests of this crate get the panic so it can be caught.
#[cold]
#[inline(never)]
pub(crate) fn invariant_violation(what: &'static str) -> ! {
    log::error!("queue invariant violated: {}", what);

    #[cfg(all(feature = "std", not(test)))]
    std::process::abort();

    #[cfg(any(not(feature = "std"), test))]
    panic!("queue invariant violated: {}", what);
}
