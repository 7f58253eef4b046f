pub mod wait_queue;

pub use wait_queue::{park, ParkResult, WaitNode, WaitQueue, WakeReason};
