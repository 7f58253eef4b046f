//! Host scheduler
//!
//! Runs tasks as host threads. Each thread gets a [`TaskId`] the first time it
//! touches the scheduler; blocking uses the thread park token, so an unpark
//! that lands before the park is never lost.

use alloc::collections::BTreeMap;
use core::cell::Cell;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use std::thread::{self, Thread};
use std::time::Instant;

use spin::Mutex;

use super::{Priority, Scheduler, TaskId};

/// Process-wide so a thread keeps one id across scheduler instances
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_TASK: Cell<Option<TaskId>> = const { Cell::new(None) };
}

fn current_thread_task() -> TaskId {
    CURRENT_TASK.with(|slot| match slot.get() {
        Some(id) => id,
        None => {
            let id = TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed));
            slot.set(Some(id));
            id
        }
    })
}

struct HostTask {
    thread: Thread,
    priority: Priority,
}

/// [`Scheduler`] backed by host threads
pub struct HostScheduler {
    tasks: Mutex<BTreeMap<TaskId, HostTask>>,
    epoch: Instant,
}

impl HostScheduler {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(BTreeMap::new()),
            epoch: Instant::now(),
        }
    }

    fn register_current(&self) -> TaskId {
        let id = current_thread_task();
        self.tasks.lock().entry(id).or_insert_with(|| HostTask {
            thread: thread::current(),
            priority: Priority::default(),
        });
        id
    }

    /// Set the priority the calling thread waits with
    pub fn set_current_priority(&self, priority: Priority) {
        let id = self.register_current();
        if let Some(task) = self.tasks.lock().get_mut(&id) {
            task.priority = priority;
        }
    }

    /// Forget the calling thread (call before the thread exits)
    pub fn retire_current(&self) {
        let id = current_thread_task();
        self.tasks.lock().remove(&id);
    }

    /// Number of threads known to this scheduler
    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Default for HostScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for HostScheduler {
    fn current_task(&self) -> TaskId {
        self.register_current()
    }

    fn priority_of(&self, task: TaskId) -> Priority {
        self.tasks
            .lock()
            .get(&task)
            .map(|t| t.priority)
            .unwrap_or_default()
    }

    fn block_current(&self, timeout: Option<Duration>) {
        match timeout {
            None => thread::park(),
            Some(timeout) => thread::park_timeout(timeout),
        }
    }

    fn unblock(&self, task: TaskId) {
        let thread = self.tasks.lock().get(&task).map(|t| t.thread.clone());
        match thread {
            Some(thread) => thread.unpark(),
            None => log::warn!("unblock for unknown {}", task),
        }
    }

    fn uptime(&self) -> Duration {
        self.epoch.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ids_are_per_thread() {
        let scheduler = Arc::new(HostScheduler::new());
        let here = scheduler.current_task();
        assert_eq!(here, scheduler.current_task());

        let remote = {
            let scheduler = scheduler.clone();
            thread::spawn(move || scheduler.current_task()).join().unwrap()
        };
        assert_ne!(here, remote);
        assert_eq!(scheduler.task_count(), 2);
    }

    #[test]
    fn test_priority_defaults_to_normal() {
        let scheduler = HostScheduler::new();
        let me = scheduler.current_task();
        assert_eq!(scheduler.priority_of(me), Priority::NORMAL);

        scheduler.set_current_priority(Priority::HIGH);
        assert_eq!(scheduler.priority_of(me), Priority::HIGH);

        scheduler.retire_current();
        assert_eq!(scheduler.priority_of(me), Priority::NORMAL);
        assert_eq!(scheduler.task_count(), 0);
    }

    #[test]
    fn test_unblock_before_block_is_kept() {
        let scheduler = HostScheduler::new();
        let me = scheduler.current_task();
        scheduler.unblock(me);
        // Token already set: returns without waiting for the timeout
        let start = Instant::now();
        scheduler.block_current(Some(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_uptime_is_monotonic() {
        let scheduler = HostScheduler::new();
        let a = scheduler.uptime();
        let b = scheduler.uptime();
        assert!(b >= a);
    }
}
