//! arbor actor core library
//!
//! An embeddable actor-model runtime: independently scheduled units of
//! encapsulated state that communicate only through asynchronous messages,
//! organized into a supervision tree with coordinated, cascading shutdown.
//!
//! The pieces, leaf first:
//!
//! - a per-actor pair of serial scheduling lanes where control work always
//!   preempts queued user messages,
//! - a mailbox with backpressure that pauses an idle actor's scheduling
//!   entirely,
//! - a composable [`Behavior`] algebra with sequential and alternative
//!   composition,
//! - actor cells forming the supervision tree, with a countdown-barrier
//!   shutdown handshake,
//! - the [`ActorSystem`] owning the tree root and the thread pool,
//! - the [`ask()`] request/response pattern layered on top.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(clippy::redundant_clone)]
#![deny(clippy::needless_borrow)]
#![deny(clippy::manual_let_else)]
#![deny(clippy::unused_self)]

/// Actor traits, identity, and lifecycle state.
pub mod actor;
/// Request/response pattern layered on top of the messaging primitives.
pub mod ask;
/// Composable behavior algebra for actor message handling.
pub mod behavior;
mod cell;
/// Per-actor execution context exposed to behaviors.
pub mod context;
/// Error types surfaced by the runtime.
pub mod error;
mod mailbox;
/// Message traits and envelope types.
pub mod message;
mod scheduler;
/// The actor system entry point owning the tree root and thread pool.
pub mod system;


pub use actor::{Actor, ActorPath, ActorState, Priority, Props};
pub use arbor_utils_core_rs::CountDownLatch;
pub use ask::{ask, ask_any, AskFuture, ReplySlot};
pub use behavior::{ActionHandler, ActionResult, Behavior};
pub use cell::ActorRef;
pub use context::Context;
pub use error::{AskError, FatalError};
pub use message::{AnyMessage, Message, SystemMessage, Terminated};
pub use system::{ActorSystem, ActorSystemConfig, UnhandledMessage, UnhandledPolicy};
