//! Wait Queue - Priority-ordered task blocking for queue operations
//!
//! One `WaitQueue` per side of a channel (blocked senders, blocked receivers).
//! The list itself is not locked: it lives inside the owning queue's critical
//! section. Only the per-node wake state is atomic, because the sleeping task
//! polls it after the critical section has been released.
//!
//! ## Ordering:
//! - higher [`Priority`] first
//! - equal priority: lower ticket (earlier arrival) first
//! - a woken waiter that lost the race re-enters with its original ticket

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU8, Ordering};
use core::time::Duration;

use crate::scheduler::{Priority, Scheduler, TaskId};

const PENDING: u8 = 0;
const READY: u8 = 1;
const DESTROYED: u8 = 2;

/// Reason for wake-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// Data available / space available
    Ready,
    /// Owning queue torn down
    Destroyed,
}

/// Wait node for a single blocked task
#[derive(Debug)]
pub struct WaitNode {
    task: TaskId,
    priority: Priority,
    ticket: u64,
    state: AtomicU8,
}

impl WaitNode {
    pub fn new(task: TaskId, priority: Priority, ticket: u64) -> Self {
        Self {
            task,
            priority,
            ticket,
            state: AtomicU8::new(PENDING),
        }
    }

    #[inline]
    pub fn task(&self) -> TaskId {
        self.task
    }

    #[inline]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    #[inline]
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// `None` while still waiting
    #[inline]
    pub fn wake_reason(&self) -> Option<WakeReason> {
        match self.state.load(Ordering::Acquire) {
            READY => Some(WakeReason::Ready),
            DESTROYED => Some(WakeReason::Destroyed),
            _ => None,
        }
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.wake_reason().is_none()
    }

    fn signal(&self, reason: WakeReason) {
        let state = match reason {
            WakeReason::Ready => READY,
            WakeReason::Destroyed => DESTROYED,
        };
        self.state.store(state, Ordering::Release);
    }

    fn rearm(&self) {
        self.state.store(PENDING, Ordering::Release);
    }

    /// Orders before `other` in a wait list
    fn precedes(&self, other: &WaitNode) -> bool {
        self.priority > other.priority
            || (self.priority == other.priority && self.ticket < other.ticket)
    }
}

/// Queue of blocked tasks for one side of a channel
#[derive(Debug, Default)]
pub struct WaitQueue {
    waiters: Vec<Arc<WaitNode>>,
    next_ticket: u64,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            waiters: Vec::new(),
            next_ticket: 0,
        }
    }

    /// Arrival ticket for a new waiter
    pub fn next_ticket(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);
        ticket
    }

    /// Register a waiter at its priority/arrival position
    pub fn enqueue(&mut self, node: Arc<WaitNode>) {
        node.rearm();
        let pos = self
            .waiters
            .iter()
            .position(|w| node.precedes(w))
            .unwrap_or(self.waiters.len());
        self.waiters.insert(pos, node);
    }

    /// Remove a waiter that gave up. Returns false if it was already woken.
    pub fn remove(&mut self, node: &WaitNode) -> bool {
        match self
            .waiters
            .iter()
            .position(|w| core::ptr::eq(Arc::as_ptr(w), node))
        {
            Some(pos) => {
                self.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Wake the first waiter
    pub fn wake_one(&mut self, reason: WakeReason, scheduler: &dyn Scheduler) -> Option<TaskId> {
        if self.waiters.is_empty() {
            return None;
        }
        let node = self.waiters.remove(0);
        node.signal(reason);
        scheduler.unblock(node.task);
        Some(node.task)
    }

    /// Wake every waiter, in list order
    pub fn wake_all(&mut self, reason: WakeReason, scheduler: &dyn Scheduler) -> usize {
        let count = self.waiters.len();
        for node in self.waiters.drain(..) {
            node.signal(reason);
            scheduler.unblock(node.task);
        }
        count
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

/// Outcome of [`park`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParkResult {
    /// `None` when the deadline passed with the node still pending
    pub woken: Option<WakeReason>,
    /// Returns from `block_current` that found the node still pending
    pub spurious: u32,
}

/// Block the calling task until `node` is woken or `deadline` (scheduler uptime) passes
pub fn park(node: &WaitNode, scheduler: &dyn Scheduler, deadline: Option<Duration>) -> ParkResult {
    let mut spurious = 0;
    loop {
        if let Some(reason) = node.wake_reason() {
            return ParkResult {
                woken: Some(reason),
                spurious,
            };
        }

        match deadline {
            None => scheduler.block_current(None),
            Some(deadline) => {
                let now = scheduler.uptime();
                if now >= deadline {
                    return ParkResult {
                        woken: None,
                        spurious,
                    };
                }
                scheduler.block_current(Some(deadline - now));
            }
        }

        if node.is_pending() {
            spurious += 1;
        }
    }
}
