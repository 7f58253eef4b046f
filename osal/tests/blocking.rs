//! Blocking transfers between host threads

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use exo_osal::{
    BlockingMode, HostScheduler, MessageQueue, OsContext, Priority, QueueConfig, QueueError,
    Scheduler, TaskId,
};
use spin::Mutex;

const B: BlockingMode = BlockingMode::Blocking;
const NB: BlockingMode = BlockingMode::NonBlocking;

fn setup(capacity: usize, item_size: usize) -> (Arc<HostScheduler>, Arc<MessageQueue>) {
    let scheduler = Arc::new(HostScheduler::new());
    let context = OsContext::new(scheduler.clone());
    let queue = MessageQueue::create(&context, &QueueConfig::new("blocking", capacity, item_size))
        .unwrap();
    (scheduler, Arc::new(queue))
}

fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "timed out waiting for {}",
            what
        );
        thread::yield_now();
    }
}

#[test]
fn test_send_wakes_blocked_receiver() {
    let (_scheduler, queue) = setup(2, 8);

    let receiver = {
        let queue = queue.clone();
        thread::spawn(move || {
            let mut buf = [0u8; 8];
            let len = queue.receive(&mut buf, B).unwrap();
            buf[..len].to_vec()
        })
    };

    wait_until("receiver to block", || queue.waiting_receivers() == 1);
    queue.send(b"wake", NB).unwrap();

    assert_eq!(receiver.join().unwrap(), b"wake");
    assert_eq!(queue.waiting_receivers(), 0);
    assert_eq!(queue.current_depth(), 0);
    assert_eq!(queue.stats().recv_waits, 1);
}

#[test]
fn test_receive_wakes_blocked_sender() {
    let (_scheduler, queue) = setup(1, 4);
    queue.send(b"1st", NB).unwrap();

    let sender = {
        let queue = queue.clone();
        thread::spawn(move || queue.send(b"2nd", B))
    };

    wait_until("sender to block", || queue.waiting_senders() == 1);
    assert_eq!(queue.current_depth(), 1);

    let mut buf = [0u8; 4];
    assert_eq!(queue.receive(&mut buf, NB), Ok(3));
    assert_eq!(&buf[..3], b"1st");

    sender.join().unwrap().unwrap();
    assert_eq!(queue.receive(&mut buf, NB), Ok(3));
    assert_eq!(&buf[..3], b"2nd");
}

#[test]
fn test_destroy_releases_blocked_receiver() {
    let (_scheduler, queue) = setup(2, 4);

    let receiver = {
        let queue = queue.clone();
        thread::spawn(move || {
            let mut buf = [0u8; 4];
            queue.receive(&mut buf, B)
        })
    };

    wait_until("receiver to block", || queue.waiting_receivers() == 1);
    queue.destroy();

    assert_eq!(receiver.join().unwrap(), Err(QueueError::Destroyed));
    assert_eq!(queue.waiting_receivers(), 0);
}

#[test]
fn test_destroy_releases_blocked_senders() {
    let (_scheduler, queue) = setup(1, 4);
    queue.send(b"full", NB).unwrap();

    let senders: Vec<_> = (0..3)
        .map(|_| {
            let queue = queue.clone();
            thread::spawn(move || queue.send(b"more", B))
        })
        .collect();

    wait_until("senders to block", || queue.waiting_senders() == 3);
    queue.destroy();

    for sender in senders {
        assert_eq!(sender.join().unwrap(), Err(QueueError::Destroyed));
    }
    assert_eq!(queue.stats().dropped_on_destroy, 1);
}

#[test]
fn test_highest_priority_sender_goes_first() {
    let (scheduler, queue) = setup(1, 1);
    queue.send(b"0", NB).unwrap();

    let spawn_sender = |priority: Priority, payload: &'static [u8]| {
        let queue = queue.clone();
        let scheduler = scheduler.clone();
        thread::spawn(move || {
            scheduler.set_current_priority(priority);
            queue.send(payload, B)
        })
    };

    let low = spawn_sender(Priority::LOW, b"L");
    wait_until("low sender to block", || queue.waiting_senders() == 1);
    let high = spawn_sender(Priority::HIGH, b"H");
    wait_until("high sender to block", || queue.waiting_senders() == 2);

    let mut buf = [0u8; 1];
    let mut order = Vec::new();
    for _ in 0..3 {
        wait_until("a message", || queue.current_depth() == 1);
        queue.receive(&mut buf, NB).unwrap();
        order.push(buf[0]);
    }

    assert_eq!(order, b"0HL");
    high.join().unwrap().unwrap();
    low.join().unwrap().unwrap();
}

#[test]
fn test_equal_priority_receivers_are_fifo() {
    let (_scheduler, queue) = setup(4, 1);

    let spawn_receiver = || {
        let queue = queue.clone();
        thread::spawn(move || {
            let mut buf = [0u8; 1];
            queue.receive(&mut buf, B).map(|_| buf[0])
        })
    };

    let first = spawn_receiver();
    wait_until("first receiver to block", || queue.waiting_receivers() == 1);
    let second = spawn_receiver();
    wait_until("second receiver to block", || queue.waiting_receivers() == 2);

    queue.send(b"a", NB).unwrap();
    assert_eq!(first.join().unwrap(), Ok(b'a'));

    queue.send(b"b", NB).unwrap();
    assert_eq!(second.join().unwrap(), Ok(b'b'));
}

#[test]
fn test_receive_timeout_expires() {
    let (_scheduler, queue) = setup(2, 4);
    let mut buf = [0u8; 4];

    let start = Instant::now();
    assert_eq!(
        queue.receive_timeout(&mut buf, Duration::from_millis(50)),
        Err(QueueError::TimedOut)
    );
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(queue.waiting_receivers(), 0);

    // A zero timeout behaves like a non-blocking call that reports TimedOut
    assert_eq!(
        queue.receive_timeout(&mut buf, Duration::ZERO),
        Err(QueueError::TimedOut)
    );
}

#[test]
fn test_send_timeout_expires_on_full_queue() {
    let (_scheduler, queue) = setup(1, 4);
    queue.send(b"full", NB).unwrap();

    assert_eq!(
        queue.send_timeout(b"late", Duration::from_millis(30)),
        Err(QueueError::TimedOut)
    );
    assert_eq!(queue.waiting_senders(), 0);
    assert_eq!(queue.current_depth(), 1);
}

#[test]
fn test_receive_timeout_succeeds_in_time() {
    let (_scheduler, queue) = setup(1, 4);

    let receiver = {
        let queue = queue.clone();
        thread::spawn(move || {
            let mut buf = [0u8; 4];
            queue
                .receive_timeout(&mut buf, Duration::from_secs(10))
                .map(|len| buf[..len].to_vec())
        })
    };

    wait_until("receiver to block", || queue.waiting_receivers() == 1);
    queue.send(b"ok", NB).unwrap();
    assert_eq!(receiver.join().unwrap(), Ok(b"ok".to_vec()));
}

#[test]
fn test_many_producers_keep_per_producer_order() {
    const PRODUCERS: u8 = 4;
    const PER_PRODUCER: u16 = 250;

    let (_scheduler, queue) = setup(4, 3);

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let queue = queue.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    let [lo, hi] = seq.to_le_bytes();
                    queue.send(&[producer, lo, hi], B).unwrap();
                }
            })
        })
        .collect();

    let mut next = [0u16; PRODUCERS as usize];
    let mut buf = [0u8; 3];
    for _ in 0..(PRODUCERS as usize * PER_PRODUCER as usize) {
        assert_eq!(queue.receive(&mut buf, B), Ok(3));
        let producer = buf[0] as usize;
        let seq = u16::from_le_bytes([buf[1], buf[2]]);
        assert_eq!(seq, next[producer], "producer {} out of order", producer);
        next[producer] += 1;
    }

    for producer in producers {
        producer.join().unwrap();
    }
    assert_eq!(next, [PER_PRODUCER; PRODUCERS as usize]);
    assert_eq!(queue.current_depth(), 0);
    assert!(queue.high_water_mark().unwrap() <= 4);
}

// ============================================================================
// Re-initialize while tasks are blocked
// ============================================================================

/// Host scheduler whose wake-ups can be held back and delivered later
#[derive(Default)]
struct GatedScheduler {
    host: HostScheduler,
    held: Mutex<Option<Vec<TaskId>>>,
}

impl GatedScheduler {
    fn hold(&self) {
        *self.held.lock() = Some(Vec::new());
    }

    fn release(&self) {
        let held = self.held.lock().take().unwrap_or_default();
        for task in held {
            self.host.unblock(task);
        }
    }
}

impl Scheduler for GatedScheduler {
    fn current_task(&self) -> TaskId {
        self.host.current_task()
    }

    fn priority_of(&self, task: TaskId) -> Priority {
        self.host.priority_of(task)
    }

    fn block_current(&self, timeout: Option<Duration>) {
        self.host.block_current(timeout)
    }

    fn unblock(&self, task: TaskId) {
        match self.held.lock().as_mut() {
            Some(held) => held.push(task),
            None => self.host.unblock(task),
        }
    }

    fn uptime(&self) -> Duration {
        self.host.uptime()
    }
}

fn gated_setup(capacity: usize, item_size: usize) -> (Arc<GatedScheduler>, Arc<MessageQueue>) {
    let scheduler = Arc::new(GatedScheduler::default());
    let context = OsContext::new(scheduler.clone());
    let queue = MessageQueue::create(&context, &QueueConfig::new("gated", capacity, item_size))
        .unwrap();
    (scheduler, Arc::new(queue))
}

fn spawn_blocking_send(
    queue: &Arc<MessageQueue>,
    payload: &'static [u8],
) -> thread::JoinHandle<Result<(), QueueError>> {
    let queue = queue.clone();
    thread::spawn(move || queue.send(payload, B))
}

#[test]
fn test_growing_queue_wakes_every_blocked_sender() {
    let (scheduler, queue) = gated_setup(1, 4);
    queue.send(b"0", NB).unwrap();

    let first = spawn_blocking_send(&queue, b"1");
    wait_until("first sender to block", || queue.waiting_senders() == 1);
    let second = spawn_blocking_send(&queue, b"2");
    wait_until("second sender to block", || queue.waiting_senders() == 2);
    // Let both threads settle into park before wakes are held back
    thread::sleep(Duration::from_millis(50));

    scheduler.hold();
    let mut buf = [0u8; 4];
    assert_eq!(queue.receive(&mut buf, NB), Ok(1));
    // The receive signalled only the first sender; the second is still listed
    assert_eq!(queue.waiting_senders(), 1);

    queue.initialize("gated", 4, 4).unwrap();
    assert_eq!(queue.waiting_senders(), 0);
    scheduler.release();

    wait_until("both senders to land", || queue.current_depth() == 2);
    first.join().unwrap().unwrap();
    second.join().unwrap().unwrap();

    let mut got = Vec::new();
    while let Ok(len) = queue.receive(&mut buf, NB) {
        got.extend_from_slice(&buf[..len]);
    }
    got.sort_unstable();
    assert_eq!(got, b"12");
}

#[test]
fn test_sender_too_large_after_shrink_passes_slot_on() {
    let (scheduler, queue) = gated_setup(1, 4);
    queue.send(b"full", NB).unwrap();

    let large = spawn_blocking_send(&queue, b"big!");
    wait_until("large sender to block", || queue.waiting_senders() == 1);
    let small = spawn_blocking_send(&queue, b"ok");
    wait_until("small sender to block", || queue.waiting_senders() == 2);
    thread::sleep(Duration::from_millis(50));

    scheduler.hold();
    let mut buf = [0u8; 4];
    assert_eq!(queue.receive(&mut buf, NB), Ok(4));
    queue.initialize("gated", 1, 2).unwrap();
    scheduler.release();

    assert_eq!(
        large.join().unwrap(),
        Err(QueueError::SizeMismatch {
            len: 4,
            item_size: 2
        })
    );
    small.join().unwrap().unwrap();

    let mut buf = [0u8; 2];
    assert_eq!(queue.receive(&mut buf, NB), Ok(2));
    assert_eq!(&buf, b"ok");
    assert_eq!(queue.waiting_senders(), 0);
}

#[test]
fn test_receiver_buffer_too_small_after_grow_passes_message_on() {
    let (_scheduler, queue) = setup(1, 4);

    let narrow = {
        let queue = queue.clone();
        thread::spawn(move || {
            let mut buf = [0u8; 4];
            queue.receive(&mut buf, B)
        })
    };
    wait_until("narrow receiver to block", || queue.waiting_receivers() == 1);
    let wide = {
        let queue = queue.clone();
        thread::spawn(move || {
            let mut buf = [0u8; 16];
            queue.receive(&mut buf, B).map(|len| buf[..len].to_vec())
        })
    };
    wait_until("wide receiver to block", || queue.waiting_receivers() == 2);

    // Empty queue: the resize is allowed with receivers still waiting
    queue.initialize("blocking", 2, 8).unwrap();
    queue.send(b"hello", NB).unwrap();

    assert_eq!(
        narrow.join().unwrap(),
        Err(QueueError::SizeMismatch {
            len: 4,
            item_size: 8
        })
    );
    assert_eq!(wide.join().unwrap(), Ok(b"hello".to_vec()));
    assert_eq!(queue.current_depth(), 0);
}
