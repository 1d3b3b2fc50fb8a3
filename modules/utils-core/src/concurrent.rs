//! Concurrency primitives.

/// Blocking count-down latch primitive.
pub mod count_down_latch;
/// Callback-based wait group primitive.
pub mod wait_group;

pub use count_down_latch::CountDownLatch;
pub use wait_group::WaitGroup;
