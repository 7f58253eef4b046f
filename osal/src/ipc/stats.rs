//! Per-queue counters
//!
//! Relaxed atomics, bumped on the transfer paths. Read through
//! [`QueueStats::snapshot`]; individual fields may be mutually inconsistent
//! while traffic is flowing.

use core::sync::atomic::{AtomicU64, Ordering};

/// Queue statistics for diagnostics
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Successful sends
    pub sends: AtomicU64,
    /// Successful receives
    pub receives: AtomicU64,
    /// Send calls that had to block
    pub send_waits: AtomicU64,
    /// Receive calls that had to block
    pub recv_waits: AtomicU64,
    /// Non-blocking sends rejected with FULL
    pub full_rejections: AtomicU64,
    /// Non-blocking receives rejected with NO_MESSAGE
    pub empty_rejections: AtomicU64,
    /// Woke up with nothing to do
    pub spurious_wakes: AtomicU64,
    /// Messages discarded by destroy
    pub dropped_on_destroy: AtomicU64,
}

/// Point-in-time copy of [`QueueStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatsSnapshot {
    pub sends: u64,
    pub receives: u64,
    pub send_waits: u64,
    pub recv_waits: u64,
    pub full_rejections: u64,
    pub empty_rejections: u64,
    pub spurious_wakes: u64,
    pub dropped_on_destroy: u64,
}

impl QueueStats {
    pub const fn new() -> Self {
        Self {
            sends: AtomicU64::new(0),
            receives: AtomicU64::new(0),
            send_waits: AtomicU64::new(0),
            recv_waits: AtomicU64::new(0),
            full_rejections: AtomicU64::new(0),
            empty_rejections: AtomicU64::new(0),
            spurious_wakes: AtomicU64::new(0),
            dropped_on_destroy: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        if n > 0 {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            sends: self.sends.load(Ordering::Relaxed),
            receives: self.receives.load(Ordering::Relaxed),
            send_waits: self.send_waits.load(Ordering::Relaxed),
            recv_waits: self.recv_waits.load(Ordering::Relaxed),
            full_rejections: self.full_rejections.load(Ordering::Relaxed),
            empty_rejections: self.empty_rejections.load(Ordering::Relaxed),
            spurious_wakes: self.spurious_wakes.load(Ordering::Relaxed),
            dropped_on_destroy: self.dropped_on_destroy.load(Ordering::Relaxed),
        }
    }
}
