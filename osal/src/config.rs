//! Queue configuration
//!
//! The three values recognized at creation: a diagnostic name, the slot count
//! and the maximum bytes per message.

use alloc::string::String;

use crate::error::{QueueError, QueueResult};

/// Longest queue name kept, in bytes. Longer names are clamped.
pub const MAX_QUEUE_NAME_LEN: usize = 32;

/// Creation parameters for a [`MessageQueue`](crate::MessageQueue)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Diagnostic label
    pub name: String,
    /// Slot count
    pub capacity: usize,
    /// Maximum bytes per message
    pub item_size: usize,
}

impl QueueConfig {
    pub fn new(name: &str, capacity: usize, item_size: usize) -> Self {
        Self {
            name: String::from(name),
            capacity,
            item_size,
        }
    }

    /// Reject zero capacity or zero item size
    pub fn validate(&self) -> QueueResult<()> {
        validate_geometry(self.capacity, self.item_size)
    }

    /// Bytes of slot storage this configuration needs, `None` on overflow
    pub fn storage_bytes(&self) -> Option<usize> {
        self.capacity.checked_mul(self.item_size)
    }
}

pub(crate) fn validate_geometry(capacity: usize, item_size: usize) -> QueueResult<()> {
    if capacity == 0 || item_size == 0 {
        return Err(QueueError::InvalidConfiguration {
            capacity,
            item_size,
        });
    }
    Ok(())
}

/// Clamp a name to [`MAX_QUEUE_NAME_LEN`] bytes on a character boundary
pub(crate) fn clamp_name(name: &str) -> &str {
    if name.len() <= MAX_QUEUE_NAME_LEN {
        return name;
    }

    let mut end = MAX_QUEUE_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    log::warn!(
        "queue name of {} bytes clamped to {} bytes",
        name.len(),
        end
    );
    &name[..end]
}
