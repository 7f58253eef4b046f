//! OS context
//!
//! Everything queues used to reach through globals: the scheduler, the
//! optional registry, queue counters and the storage budget. Built once at
//! startup and handed to every queue constructor; clones share state.

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::ipc::{QueueId, QueueRegistry};
use crate::scheduler::Scheduler;

struct ContextInner {
    scheduler: Arc<dyn Scheduler>,
    registry: Option<Arc<dyn QueueRegistry>>,
    next_queue_id: AtomicU64,
    queues_created: AtomicUsize,
    live_queues: AtomicUsize,
    memory: MemoryBudget,
}

/// Shared handle to the process-wide queue context
#[derive(Clone)]
pub struct OsContext {
    inner: Arc<ContextInner>,
}

impl OsContext {
    /// Context with no registry and no storage limit
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::builder(scheduler).build()
    }

    pub fn builder(scheduler: Arc<dyn Scheduler>) -> OsContextBuilder {
        OsContextBuilder {
            scheduler,
            registry: None,
            memory_limit: None,
        }
    }

    /// Context running on host threads
    #[cfg(feature = "std")]
    pub fn host() -> Self {
        Self::new(Arc::new(crate::scheduler::HostScheduler::new()))
    }

    #[inline]
    pub fn scheduler(&self) -> &dyn Scheduler {
        &*self.inner.scheduler
    }

    #[inline]
    pub fn registry(&self) -> Option<&dyn QueueRegistry> {
        self.inner.registry.as_deref()
    }

    /// Queues currently holding a backing channel
    pub fn live_queues(&self) -> usize {
        self.inner.live_queues.load(Ordering::Relaxed)
    }

    /// Queues ever brought up from UNINITIALIZED
    pub fn queues_created(&self) -> usize {
        self.inner.queues_created.load(Ordering::Relaxed)
    }

    /// Slot storage currently reserved by queues of this context
    pub fn reserved_bytes(&self) -> usize {
        self.inner.memory.reserved()
    }

    pub fn memory_limit(&self) -> Option<usize> {
        self.inner.memory.limit
    }

    pub(crate) fn allocate_queue_id(&self) -> QueueId {
        QueueId(self.inner.next_queue_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn queue_created(&self) {
        self.inner.queues_created.fetch_add(1, Ordering::Relaxed);
        self.inner.live_queues.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn queue_destroyed(&self) {
        self.inner.live_queues.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn memory(&self) -> &MemoryBudget {
        &self.inner.memory
    }
}

impl fmt::Debug for OsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OsContext")
            .field("live_queues", &self.live_queues())
            .field("queues_created", &self.queues_created())
            .field("reserved_bytes", &self.reserved_bytes())
            .field("memory_limit", &self.memory_limit())
            .field("registry", &self.inner.registry.is_some())
            .finish()
    }
}

/// Builder for [`OsContext`]
pub struct OsContextBuilder {
    scheduler: Arc<dyn Scheduler>,
    registry: Option<Arc<dyn QueueRegistry>>,
    memory_limit: Option<usize>,
}

impl OsContextBuilder {
    /// Notify `registry` on queue create/rename/destroy
    pub fn registry(mut self, registry: Arc<dyn QueueRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Cap total slot storage across all queues of the context
    pub fn queue_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn build(self) -> OsContext {
        OsContext {
            inner: Arc::new(ContextInner {
                scheduler: self.scheduler,
                registry: self.registry,
                next_queue_id: AtomicU64::new(1),
                queues_created: AtomicUsize::new(0),
                live_queues: AtomicUsize::new(0),
                memory: MemoryBudget::new(self.memory_limit),
            }),
        }
    }
}

/// Byte accounting for slot storage
pub(crate) struct MemoryBudget {
    limit: Option<usize>,
    reserved: AtomicUsize,
}

impl MemoryBudget {
    fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            reserved: AtomicUsize::new(0),
        }
    }

    pub(crate) fn reserved(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    /// Swap a reservation of `release` bytes for one of `acquire` bytes.
    /// Fails without changing anything if the limit would be exceeded.
    pub(crate) fn exchange(&self, release: usize, acquire: usize) -> bool {
        let mut current = self.reserved.load(Ordering::Acquire);
        loop {
            let next = match current
                .checked_sub(release)
                .and_then(|base| base.checked_add(acquire))
            {
                Some(next) => next,
                None => return false,
            };
            if let Some(limit) = self.limit {
                if next > limit {
                    return false;
                }
            }
            match self.reserved.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn release(&self, bytes: usize) {
        self.reserved.fetch_sub(bytes, Ordering::AcqRel);
    }

    /// Undo a successful `exchange(released, acquired)`. Ignores the limit:
    /// the `released` bytes are still in use.
    pub(crate) fn restore(&self, acquired: usize, released: usize) {
        self.reserved.fetch_sub(acquired, Ordering::AcqRel);
        self.reserved.fetch_add(released, Ordering::AcqRel);
    }
}
