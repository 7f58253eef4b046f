//! Typed messages over a byte queue
//!
//! Values are encoded with `postcard`. The encoded form must fit in one slot;
//! a value that does not is rejected with `SizeMismatch` like any oversized
//! payload.

use alloc::vec;
use alloc::vec::Vec;
use core::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::queue::{BlockingMode, MessageQueue};
use crate::error::{QueueError, QueueResult};

/// Encode `value` into a fresh buffer
pub fn encode<T: Serialize + ?Sized>(value: &T) -> QueueResult<Vec<u8>> {
    postcard::to_allocvec(value).map_err(|e| {
        log::debug!("message encode failed: {}", e);
        QueueError::Serialization
    })
}

/// Decode one message
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> QueueResult<T> {
    postcard::from_bytes(bytes).map_err(|e| {
        log::debug!("message decode failed ({} bytes): {}", bytes.len(), e);
        QueueError::Deserialization
    })
}

impl MessageQueue {
    pub fn send_value<T: Serialize + ?Sized>(&self, value: &T, mode: BlockingMode) -> QueueResult<()> {
        let bytes = encode(value)?;
        self.send(&bytes, mode)
    }

    pub fn send_value_timeout<T: Serialize + ?Sized>(
        &self,
        value: &T,
        timeout: Duration,
    ) -> QueueResult<()> {
        let bytes = encode(value)?;
        self.send_timeout(&bytes, timeout)
    }

    /// Receive one message and decode it as `T`
    pub fn receive_value<T: DeserializeOwned>(&self, mode: BlockingMode) -> QueueResult<T> {
        let mut buf = self.slot_buffer()?;
        let len = self.receive(&mut buf, mode)?;
        decode(&buf[..len])
    }

    pub fn receive_value_timeout<T: DeserializeOwned>(&self, timeout: Duration) -> QueueResult<T> {
        let mut buf = self.slot_buffer()?;
        let len = self.receive_timeout(&mut buf, timeout)?;
        decode(&buf[..len])
    }

    fn slot_buffer(&self) -> QueueResult<Vec<u8>> {
        let item_size = self.item_size().ok_or(QueueError::NotReady)?;
        Ok(vec![0u8; item_size])
    }
}
