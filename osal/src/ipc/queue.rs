//! Message Queue - bounded FIFO of fixed-size messages between tasks
//!
//! A queue starts UNINITIALIZED, becomes READY on [`MessageQueue::initialize`]
//! and ends DESTROYED. Every transfer copies bytes in or out of the slot ring
//! inside a short critical section; blocked callers sleep outside of it on a
//! [`WaitQueue`] and retry when woken.
//!
//! ## Re-initialization:
//! - same capacity and item size: keep the channel and its messages, update the name
//! - different geometry: replace the channel, only while it is empty
//!
//! ## Teardown:
//! [`MessageQueue::destroy`] (or drop) releases the channel even if messages
//! are still queued. Those messages are lost; the count is logged and kept in
//! [`QueueStatsSnapshot::dropped_on_destroy`]. Tasks blocked on the queue
//! return [`QueueError::Destroyed`].

use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;

use spin::Mutex;

use super::registry::QueueInfo;
use super::ring::SlotRing;
use super::stats::{QueueStats, QueueStatsSnapshot};
use super::QueueId;
use crate::config::{clamp_name, validate_geometry, QueueConfig};
use crate::context::OsContext;
use crate::error::{QueueError, QueueResult};
use crate::sync::wait_queue::{park, WaitNode, WaitQueue, WakeReason};

/// What a send/receive does when it cannot complete immediately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingMode {
    /// Suspend until the operation can complete or the queue is destroyed
    Blocking,
    /// Fail at once with FULL / NO_MESSAGE
    NonBlocking,
}

/// Send priority, accepted for interface compatibility. Delivery stays FIFO.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct MessagePriority(pub i32);

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Uninitialized,
    Ready,
    Destroyed,
}

enum Channel {
    Uninitialized,
    Ready(SlotRing),
    Destroyed,
}

impl Channel {
    fn state(&self) -> QueueState {
        match self {
            Channel::Uninitialized => QueueState::Uninitialized,
            Channel::Ready(_) => QueueState::Ready,
            Channel::Destroyed => QueueState::Destroyed,
        }
    }

    fn ring(&self) -> Option<&SlotRing> {
        match self {
            Channel::Ready(ring) => Some(ring),
            _ => None,
        }
    }
}

#[derive(Clone, Copy)]
enum Wait {
    Never,
    Forever,
    /// Deadline in scheduler uptime
    Until(Duration),
}

impl From<BlockingMode> for Wait {
    fn from(mode: BlockingMode) -> Self {
        match mode {
            BlockingMode::Blocking => Wait::Forever,
            BlockingMode::NonBlocking => Wait::Never,
        }
    }
}

#[derive(Clone, Copy)]
enum Side {
    Send,
    Receive,
}

/// Outcome of the locked part of initialize
enum Lifecycle {
    Unchanged,
    Renamed(QueueInfo),
    Created(QueueInfo),
    Replaced(QueueInfo),
}

struct QueueInner {
    channel: Channel,
    name: String,
    senders: WaitQueue,
    receivers: WaitQueue,
}

impl QueueInner {
    fn waiters(&mut self, side: Side) -> &mut WaitQueue {
        match side {
            Side::Send => &mut self.senders,
            Side::Receive => &mut self.receivers,
        }
    }

    fn info(&self, id: QueueId) -> Option<QueueInfo> {
        self.channel.ring().map(|ring| QueueInfo {
            id,
            name: self.name.clone(),
            capacity: ring.capacity(),
            item_size: ring.item_size(),
        })
    }
}

/// Fixed-capacity, fixed-item-size FIFO channel
pub struct MessageQueue {
    id: QueueId,
    context: OsContext,
    inner: Mutex<QueueInner>,
    /// Mirror of the ring occupancy, readable without the lock
    depth: AtomicUsize,
    stats: QueueStats,
}

impl MessageQueue {
    /// Queue in UNINITIALIZED state; no storage yet
    pub fn new(context: &OsContext) -> Self {
        Self {
            id: context.allocate_queue_id(),
            context: context.clone(),
            inner: Mutex::new(QueueInner {
                channel: Channel::Uninitialized,
                name: String::new(),
                senders: WaitQueue::new(),
                receivers: WaitQueue::new(),
            }),
            depth: AtomicUsize::new(0),
            stats: QueueStats::new(),
        }
    }

    /// Construct and initialize in one step
    pub fn create(context: &OsContext, config: &QueueConfig) -> QueueResult<Self> {
        let queue = Self::new(context);
        queue.initialize_with(config)?;
        Ok(queue)
    }

    pub fn initialize_with(&self, config: &QueueConfig) -> QueueResult<()> {
        self.initialize(&config.name, config.capacity, config.item_size)
    }

    /// Create the channel, or re-create it in place.
    ///
    /// # Errors
    /// - `InvalidConfiguration` if `capacity` or `item_size` is zero (nothing touched)
    /// - `ResourceExhausted` if storage cannot be allocated
    /// - `BusyCannotResize` if the geometry changes while messages are queued
    /// - `NotReady` if the queue was destroyed
    pub fn initialize(&self, name: &str, capacity: usize, item_size: usize) -> QueueResult<()> {
        validate_geometry(capacity, item_size)?;
        let name = clamp_name(name);

        let lifecycle = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            match &inner.channel {
                Channel::Destroyed => return Err(QueueError::NotReady),
                Channel::Ready(ring)
                    if ring.capacity() == capacity && ring.item_size() == item_size =>
                {
                    if inner.name == name {
                        Lifecycle::Unchanged
                    } else {
                        inner.name = String::from(name);
                        self.lifecycle_info(inner, Lifecycle::Renamed)
                    }
                }
                Channel::Ready(ring) => {
                    if !ring.is_empty() {
                        return Err(QueueError::BusyCannotResize {
                            occupancy: ring.len(),
                        });
                    }
                    // New storage first: on failure the old channel stays in service
                    let replacement = self.allocate(capacity, item_size, ring.storage_bytes())?;
                    inner.channel = Channel::Ready(replacement);
                    inner.name = String::from(name);
                    self.depth.store(0, Ordering::Release);
                    // Senders left over from the old geometry retry against the new one
                    let retried = inner
                        .senders
                        .wake_all(WakeReason::Ready, self.context.scheduler());
                    if retried > 0 {
                        log::debug!("{}: {} blocked senders retry after resize", self.id, retried);
                    }
                    self.lifecycle_info(inner, Lifecycle::Replaced)
                }
                Channel::Uninitialized => {
                    let ring = self.allocate(capacity, item_size, 0)?;
                    inner.channel = Channel::Ready(ring);
                    inner.name = String::from(name);
                    self.depth.store(0, Ordering::Release);
                    self.lifecycle_info(inner, Lifecycle::Created)
                }
            }
        };

        match lifecycle {
            Lifecycle::Unchanged => {}
            Lifecycle::Renamed(info) => {
                log::debug!("{} renamed to '{}'", self.id, info.name);
                if let Some(registry) = self.context.registry() {
                    if let Err(e) = registry.on_rename(&info) {
                        log::warn!("{}: registry rename hook failed: {}", self.id, e);
                    }
                }
            }
            Lifecycle::Created(info) => {
                self.context.queue_created();
                self.announce(&info);
            }
            Lifecycle::Replaced(info) => self.announce(&info),
        }
        Ok(())
    }

    fn lifecycle_info(
        &self,
        inner: &QueueInner,
        kind: fn(QueueInfo) -> Lifecycle,
    ) -> Lifecycle {
        match inner.info(self.id) {
            Some(info) => kind(info),
            None => Lifecycle::Unchanged,
        }
    }

    fn announce(&self, info: &QueueInfo) {
        log::debug!(
            "{} '{}' ready: {} slots x {} bytes",
            self.id,
            info.name,
            info.capacity,
            info.item_size
        );
        if let Some(registry) = self.context.registry() {
            if let Err(e) = registry.on_create(info) {
                log::warn!("{}: registry create hook failed: {}", self.id, e);
            }
        }
    }

    /// Reserve budget and allocate a ring, handing back `release` bytes on success
    fn allocate(&self, capacity: usize, item_size: usize, release: usize) -> QueueResult<SlotRing> {
        let bytes = capacity
            .checked_mul(item_size)
            .ok_or(QueueError::ResourceExhausted {
                requested: usize::MAX,
            })?;

        let memory = self.context.memory();
        if !memory.exchange(release, bytes) {
            log::warn!(
                "{}: {} bytes of queue storage exceed the budget ({} reserved)",
                self.id,
                bytes,
                memory.reserved()
            );
            return Err(QueueError::ResourceExhausted { requested: bytes });
        }

        SlotRing::try_new(capacity, item_size).map_err(|e| {
            memory.restore(bytes, release);
            log::warn!("{}: slot storage allocation failed: {}", self.id, e);
            e
        })
    }

    // ========================================================================
    // SEND OPERATIONS
    // ========================================================================

    /// Copy `payload` into the queue.
    ///
    /// # Errors
    /// `NotReady`, `EmptyPayload`, `SizeMismatch` (checked in that order), then
    /// `Full` in non-blocking mode or `Destroyed` if torn down while blocked.
    pub fn send(&self, payload: &[u8], mode: BlockingMode) -> QueueResult<()> {
        self.send_inner(payload, Wait::from(mode))
    }

    /// Same as [`send`](Self::send). `priority` does not reorder delivery.
    pub fn send_with_priority(
        &self,
        payload: &[u8],
        priority: MessagePriority,
        mode: BlockingMode,
    ) -> QueueResult<()> {
        log::trace!("{}: send priority {} ignored, FIFO delivery", self.id, priority.0);
        self.send_inner(payload, Wait::from(mode))
    }

    /// Blocking send giving up with `TimedOut` after `timeout`
    pub fn send_timeout(&self, payload: &[u8], timeout: Duration) -> QueueResult<()> {
        let deadline = self.context.scheduler().uptime().saturating_add(timeout);
        self.send_inner(payload, Wait::Until(deadline))
    }

    fn send_inner(&self, payload: &[u8], wait: Wait) -> QueueResult<()> {
        let scheduler = self.context.scheduler();
        let mut waiter: Option<Arc<WaitNode>> = None;

        loop {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            let ring = match &mut inner.channel {
                Channel::Ready(ring) => ring,
                Channel::Destroyed if waiter.is_some() => return Err(QueueError::Destroyed),
                _ => return Err(QueueError::NotReady),
            };

            if payload.is_empty() {
                return Err(QueueError::EmptyPayload);
            }
            if payload.len() > ring.item_size() {
                // Re-sized while we slept: leave the freed slot to the next sender
                if waiter.is_some() && !ring.is_full() {
                    inner.senders.wake_one(WakeReason::Ready, scheduler);
                }
                return Err(QueueError::SizeMismatch {
                    len: payload.len(),
                    item_size: ring.item_size(),
                });
            }

            if ring.push(payload) {
                self.depth.store(ring.len(), Ordering::Release);
                inner.receivers.wake_one(WakeReason::Ready, scheduler);
                QueueStats::bump(&self.stats.sends);
                return Ok(());
            }

            let deadline = match wait {
                Wait::Never => {
                    QueueStats::bump(&self.stats.full_rejections);
                    return Err(QueueError::Full);
                }
                Wait::Forever => None,
                Wait::Until(deadline) if scheduler.uptime() >= deadline => {
                    return Err(QueueError::TimedOut);
                }
                Wait::Until(deadline) => Some(deadline),
            };

            if waiter.is_none() {
                QueueStats::bump(&self.stats.send_waits);
            }
            let node = waiter
                .get_or_insert_with(|| {
                    let task = scheduler.current_task();
                    let ticket = inner.senders.next_ticket();
                    Arc::new(WaitNode::new(task, scheduler.priority_of(task), ticket))
                })
                .clone();
            inner.senders.enqueue(node.clone());
            drop(guard);

            log::trace!(
                "{}: {} waiting for a free slot (priority {}, ticket {})",
                self.id,
                node.task(),
                node.priority().0,
                node.ticket()
            );
            match self.wait_for(&node, Side::Send, deadline) {
                Some(WakeReason::Ready) => continue,
                Some(WakeReason::Destroyed) => return Err(QueueError::Destroyed),
                None => return Err(QueueError::TimedOut),
            }
        }
    }

    // ========================================================================
    // RECEIVE OPERATIONS
    // ========================================================================

    /// Copy the oldest message into `buf` and return its length.
    ///
    /// `buf` must hold a worst-case message (`buf.len() >= item_size`).
    ///
    /// # Errors
    /// `NotReady`, `SizeMismatch`, then `NoMessage` in non-blocking mode or
    /// `Destroyed` if torn down while blocked.
    pub fn receive(&self, buf: &mut [u8], mode: BlockingMode) -> QueueResult<usize> {
        self.receive_inner(buf, Wait::from(mode))
    }

    /// Blocking receive giving up with `TimedOut` after `timeout`
    pub fn receive_timeout(&self, buf: &mut [u8], timeout: Duration) -> QueueResult<usize> {
        let deadline = self.context.scheduler().uptime().saturating_add(timeout);
        self.receive_inner(buf, Wait::Until(deadline))
    }

    fn receive_inner(&self, buf: &mut [u8], wait: Wait) -> QueueResult<usize> {
        let scheduler = self.context.scheduler();
        let mut waiter: Option<Arc<WaitNode>> = None;

        loop {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            let ring = match &mut inner.channel {
                Channel::Ready(ring) => ring,
                Channel::Destroyed if waiter.is_some() => return Err(QueueError::Destroyed),
                _ => return Err(QueueError::NotReady),
            };

            if buf.len() < ring.item_size() {
                if waiter.is_some() && !ring.is_empty() {
                    inner.receivers.wake_one(WakeReason::Ready, scheduler);
                }
                return Err(QueueError::SizeMismatch {
                    len: buf.len(),
                    item_size: ring.item_size(),
                });
            }

            if let Some(len) = ring.pop_into(buf) {
                self.depth.store(ring.len(), Ordering::Release);
                inner.senders.wake_one(WakeReason::Ready, scheduler);
                QueueStats::bump(&self.stats.receives);
                return Ok(len);
            }

            let deadline = match wait {
                Wait::Never => {
                    QueueStats::bump(&self.stats.empty_rejections);
                    return Err(QueueError::NoMessage);
                }
                Wait::Forever => None,
                Wait::Until(deadline) if scheduler.uptime() >= deadline => {
                    return Err(QueueError::TimedOut);
                }
                Wait::Until(deadline) => Some(deadline),
            };

            if waiter.is_none() {
                QueueStats::bump(&self.stats.recv_waits);
            }
            let node = waiter
                .get_or_insert_with(|| {
                    let task = scheduler.current_task();
                    let ticket = inner.receivers.next_ticket();
                    Arc::new(WaitNode::new(task, scheduler.priority_of(task), ticket))
                })
                .clone();
            inner.receivers.enqueue(node.clone());
            drop(guard);

            log::trace!(
                "{}: {} waiting for a message (priority {}, ticket {})",
                self.id,
                node.task(),
                node.priority().0,
                node.ticket()
            );
            match self.wait_for(&node, Side::Receive, deadline) {
                Some(WakeReason::Ready) => continue,
                Some(WakeReason::Destroyed) => return Err(QueueError::Destroyed),
                None => return Err(QueueError::TimedOut),
            }
        }
    }

    /// Sleep on `node`. `None` means the deadline passed and the node was withdrawn.
    fn wait_for(&self, node: &WaitNode, side: Side, deadline: Option<Duration>) -> Option<WakeReason> {
        let scheduler = self.context.scheduler();
        loop {
            let parked = park(node, scheduler, deadline);
            QueueStats::add(&self.stats.spurious_wakes, u64::from(parked.spurious));

            if let Some(reason) = parked.woken {
                return Some(reason);
            }

            // Deadline hit. Withdraw unless a wake raced in before we got the lock.
            let mut guard = self.inner.lock();
            if guard.waiters(side).remove(node) {
                return None;
            }
        }
    }

    // ========================================================================
    // INTROSPECTION & TEARDOWN
    // ========================================================================

    /// Queued message count. Lock-free; a hint while other tasks are active.
    #[inline]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Slot count, `None` unless READY
    pub fn capacity(&self) -> Option<usize> {
        self.inner.lock().channel.ring().map(SlotRing::capacity)
    }

    /// Maximum message size, `None` unless READY
    pub fn item_size(&self) -> Option<usize> {
        self.inner.lock().channel.ring().map(SlotRing::item_size)
    }

    /// Peak occupancy of the current channel, `None` unless READY
    pub fn high_water_mark(&self) -> Option<usize> {
        self.inner.lock().channel.ring().map(SlotRing::high_water)
    }

    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    #[inline]
    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn state(&self) -> QueueState {
        self.inner.lock().channel.state()
    }

    /// Tasks blocked in send
    pub fn waiting_senders(&self) -> usize {
        self.inner.lock().senders.len()
    }

    /// Tasks blocked in receive
    pub fn waiting_receivers(&self) -> usize {
        self.inner.lock().receivers.len()
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn context(&self) -> &OsContext {
        &self.context
    }

    /// Release the channel and wake every blocked task with `Destroyed`.
    ///
    /// Unreceived messages are dropped. Idempotent.
    pub fn destroy(&self) {
        let scheduler = self.context.scheduler();

        let (previous, name, woken) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let previous = core::mem::replace(&mut inner.channel, Channel::Destroyed);
            let woken = inner.senders.wake_all(WakeReason::Destroyed, scheduler)
                + inner.receivers.wake_all(WakeReason::Destroyed, scheduler);
            self.depth.store(0, Ordering::Release);
            (previous, inner.name.clone(), woken)
        };

        let mut ring = match previous {
            Channel::Ready(ring) => ring,
            Channel::Uninitialized | Channel::Destroyed => return,
        };

        let dropped = ring.clear();
        if dropped > 0 {
            log::warn!(
                "{} '{}' destroyed with {} unreceived messages, dropping them",
                self.id,
                name,
                dropped
            );
            QueueStats::add(&self.stats.dropped_on_destroy, dropped as u64);
        }
        if woken > 0 {
            log::debug!("{}: woke {} blocked tasks on destroy", self.id, woken);
        }

        self.context.memory().release(ring.storage_bytes());
        drop(ring);
        self.context.queue_destroyed();

        if let Some(registry) = self.context.registry() {
            if let Err(e) = registry.on_destroy(self.id) {
                log::warn!("{}: registry destroy hook failed: {}", self.id, e);
            }
        }
    }
}

impl Drop for MessageQueue {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MessageQueue")
            .field("id", &self.id)
            .field("name", &inner.name)
            .field("state", &inner.channel.state())
            .field("depth", &self.current_depth())
            .field("capacity", &inner.channel.ring().map(SlotRing::capacity))
            .field("item_size", &inner.channel.ring().map(SlotRing::item_size))
            .finish()
    }
}
