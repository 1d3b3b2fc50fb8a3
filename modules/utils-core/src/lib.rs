//! arbor utils core library
//!
//! Shared primitives used by the arbor actor runtime: an order-preserving
//! FIFO queue, a blocking count-down latch, and a callback-based wait group
//! for fan-out/fan-in coordination.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(clippy::redundant_clone)]
#![deny(clippy::needless_borrow)]
#![deny(clippy::manual_let_else)]
#![deny(clippy::unused_self)]

pub mod collections;
pub mod concurrent;

pub use collections::Queue;
pub use concurrent::{CountDownLatch, WaitGroup};
