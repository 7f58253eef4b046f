//! Slot Ring - fixed-capacity storage behind one message queue
//!
//! `capacity` slots of `item_size` bytes each, plus the actual length of the
//! message held in every slot. Storage is allocated once, fallibly, and never
//! grows.
//!
//! ## Memory Layout:
//! ```text
//! storage: | slot 0 (item_size) | slot 1 | ... | slot N-1 |
//! lengths: | len 0              | len 1  | ... | len N-1  |
//!            ^ head                  ^ head + count (next free)
//! ```

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::config::validate_geometry;
use crate::error::{invariant_violation, QueueError, QueueResult};

/// Circular buffer of fixed-size slots
pub struct SlotRing {
    storage: Box<[u8]>,
    lengths: Box<[usize]>,
    capacity: usize,
    item_size: usize,
    head: usize,
    count: usize,
    high_water: usize,
}

impl SlotRing {
    /// Allocate `capacity * item_size` bytes of slots
    pub fn try_new(capacity: usize, item_size: usize) -> QueueResult<Self> {
        validate_geometry(capacity, item_size)?;
        let bytes = capacity
            .checked_mul(item_size)
            .ok_or(QueueError::ResourceExhausted {
                requested: usize::MAX,
            })?;

        let storage = try_alloc_zeroed::<u8>(bytes)
            .ok_or(QueueError::ResourceExhausted { requested: bytes })?;
        let lengths = try_alloc_zeroed::<usize>(capacity).ok_or(QueueError::ResourceExhausted {
            requested: capacity.saturating_mul(core::mem::size_of::<usize>()),
        })?;

        Ok(Self {
            storage,
            lengths,
            capacity,
            item_size,
            head: 0,
            count: 0,
            high_water: 0,
        })
    }

    /// Copy `payload` into the next free slot. Returns false when full.
    pub fn push(&mut self, payload: &[u8]) -> bool {
        if payload.len() > self.item_size {
            invariant_violation("payload larger than slot");
        }
        if self.is_full() {
            return false;
        }

        let tail = (self.head + self.count) % self.capacity;
        let start = tail * self.item_size;
        self.storage[start..start + payload.len()].copy_from_slice(payload);
        self.lengths[tail] = payload.len();

        self.count += 1;
        if self.count > self.high_water {
            self.high_water = self.count;
        }
        true
    }

    /// Copy the oldest message into `buf` and free its slot. Returns its length.
    pub fn pop_into(&mut self, buf: &mut [u8]) -> Option<usize> {
        if self.count == 0 {
            return None;
        }

        let len = self.lengths[self.head];
        if len > self.item_size {
            invariant_violation("slot length exceeds item size");
        }
        if len > buf.len() {
            invariant_violation("receive buffer smaller than stored message");
        }

        let start = self.head * self.item_size;
        buf[..len].copy_from_slice(&self.storage[start..start + len]);

        self.head = (self.head + 1) % self.capacity;
        self.count -= 1;
        Some(len)
    }

    /// Drop every queued message, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.count;
        self.head = 0;
        self.count = 0;
        dropped
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count >= self.capacity
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Peak occupancy since allocation
    #[inline]
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Bytes of slot storage held
    #[inline]
    pub fn storage_bytes(&self) -> usize {
        self.storage.len()
    }
}

fn try_alloc_zeroed<T: Clone + Default>(len: usize) -> Option<Box<[T]>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).ok()?;
    buf.resize(len, T::default());
    Some(buf.into_boxed_slice())
}
