//! Non-blocking queue operations checked against a VecDeque model

use std::collections::VecDeque;

use exo_osal::{BlockingMode, MessageQueue, OsContext, QueueError};
use proptest::prelude::*;

const NB: BlockingMode = BlockingMode::NonBlocking;

#[derive(Debug, Clone)]
enum Op {
    Send(Vec<u8>),
    Receive,
    Reinit { capacity: usize, item_size: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => prop::collection::vec(any::<u8>(), 0..10).prop_map(Op::Send),
        4 => Just(Op::Receive),
        1 => (0usize..5, 0usize..9).prop_map(|(capacity, item_size)| Op::Reinit { capacity, item_size }),
    ]
}

struct Model {
    messages: VecDeque<Vec<u8>>,
    capacity: usize,
    item_size: usize,
    peak: usize,
}

impl Model {
    fn send(&mut self, payload: &[u8]) -> Result<(), QueueError> {
        if payload.is_empty() {
            return Err(QueueError::EmptyPayload);
        }
        if payload.len() > self.item_size {
            return Err(QueueError::SizeMismatch {
                len: payload.len(),
                item_size: self.item_size,
            });
        }
        if self.messages.len() == self.capacity {
            return Err(QueueError::Full);
        }
        self.messages.push_back(payload.to_vec());
        self.peak = self.peak.max(self.messages.len());
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>, QueueError> {
        self.messages.pop_front().ok_or(QueueError::NoMessage)
    }

    fn reinit(&mut self, capacity: usize, item_size: usize) -> Result<(), QueueError> {
        if capacity == 0 || item_size == 0 {
            return Err(QueueError::InvalidConfiguration {
                capacity,
                item_size,
            });
        }
        if capacity == self.capacity && item_size == self.item_size {
            return Ok(());
        }
        if !self.messages.is_empty() {
            return Err(QueueError::BusyCannotResize {
                occupancy: self.messages.len(),
            });
        }
        self.capacity = capacity;
        self.item_size = item_size;
        self.peak = 0;
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_matches_fifo_model(ops in prop::collection::vec(op(), 1..80)) {
        let context = OsContext::host();
        let queue = MessageQueue::new(&context);
        queue.initialize("prop", 3, 4).unwrap();
        let mut model = Model {
            messages: VecDeque::new(),
            capacity: 3,
            item_size: 4,
            peak: 0,
        };

        for op in ops {
            match op {
                Op::Send(payload) => {
                    prop_assert_eq!(queue.send(&payload, NB), model.send(&payload));
                }
                Op::Receive => {
                    let mut buf = vec![0u8; model.item_size];
                    let got = queue.receive(&mut buf, NB).map(|len| buf[..len].to_vec());
                    prop_assert_eq!(got, model.receive());
                }
                Op::Reinit { capacity, item_size } => {
                    prop_assert_eq!(
                        queue.initialize("prop", capacity, item_size),
                        model.reinit(capacity, item_size)
                    );
                }
            }

            prop_assert_eq!(queue.current_depth(), model.messages.len());
            prop_assert_eq!(queue.capacity(), Some(model.capacity));
            prop_assert_eq!(queue.item_size(), Some(model.item_size));
            prop_assert_eq!(queue.high_water_mark(), Some(model.peak));
            prop_assert_eq!(context.reserved_bytes(), model.capacity * model.item_size);
        }
    }

    #[test]
    fn prop_invalid_geometry_never_changes_state(capacity in 0usize..4, item_size in 0usize..4) {
        prop_assume!(capacity == 0 || item_size == 0);
        let context = OsContext::host();
        let queue = MessageQueue::new(&context);
        queue.initialize("keep", 2, 2).unwrap();
        queue.send(b"x", NB).unwrap();

        let is_invalid = matches!(
            queue.initialize("other", capacity, item_size),
            Err(QueueError::InvalidConfiguration { .. })
        );
        prop_assert!(is_invalid);
        prop_assert_eq!(queue.name(), "keep");
        prop_assert_eq!(queue.current_depth(), 1);
    }
}
