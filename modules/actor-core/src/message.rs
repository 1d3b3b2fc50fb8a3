use std::any::{Any, TypeId};
use std::fmt::{self, Debug};
use std::sync::Arc;

use arbor_utils_core_rs::CountDownLatch;

use crate::ask::ReplySlot;
use crate::cell::ActorRef;

/// Capability marker for payloads that may cross an actor boundary.
///
/// Opt-in only: a type becomes sendable by implementing this trait, never by
/// accident. Implementations exist for the common primitives.
pub trait Message: Any + Debug + Send + Sync + 'static {}

impl Message for String {}
impl Message for &'static str {}
impl Message for bool {}
impl Message for () {}
impl Message for i32 {}
impl Message for i64 {}
impl Message for u32 {}
impl Message for u64 {}
impl Message for usize {}

type PayloadFmt = fn(&(dyn Any + Send + Sync), &mut fmt::Formatter<'_>) -> fmt::Result;

fn fmt_payload<M: Message>(payload: &(dyn Any + Send + Sync), f: &mut fmt::Formatter<'_>) -> fmt::Result {
  match payload.downcast_ref::<M>() {
    Some(value) => Debug::fmt(value, f),
    None => f.write_str("<payload>"),
  }
}

/// Type-erased message payload.
///
/// Clones are cheap; the payload itself is shared, never copied. Handlers
/// recover the concrete type with [`AnyMessage::downcast_ref`] and report a
/// mismatch as unhandled.
#[derive(Clone)]
pub struct AnyMessage {
  payload: Arc<dyn Any + Send + Sync>,
  type_name: &'static str,
  fmt: PayloadFmt,
}

impl AnyMessage {
  /// Erases a capability-tagged payload.
  pub fn new<M: Message>(message: M) -> Self {
    Self {
      payload: Arc::new(message),
      type_name: std::any::type_name::<M>(),
      fmt: fmt_payload::<M>,
    }
  }

  /// Whether the payload is of type `M`.
  #[must_use]
  pub fn is<M: Message>(&self) -> bool {
    (*self.payload).type_id() == TypeId::of::<M>()
  }

  /// Borrows the payload as `M`, or `None` on a type mismatch.
  #[must_use]
  pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
    self.payload.downcast_ref::<M>()
  }

  /// Name of the erased payload type, for diagnostics.
  #[must_use]
  pub fn type_name(&self) -> &'static str {
    self.type_name
  }
}

impl Debug for AnyMessage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    (self.fmt)(self.payload.as_ref(), f)
  }
}

/// Built-in control messages.
#[derive(Clone, Debug)]
pub enum SystemMessage {
  /// Stops the actor when the pill reaches the head of its mailbox.
  ///
  /// The optional latch is counted down once the actor has fully stopped,
  /// giving senders a completion handle for the shutdown.
  PoisonPill(Option<CountDownLatch>),
}

/// Termination notification delivered to a watching parent.
///
/// Sent as an ordinary user message after the watched child's `post_stop`
/// has run.
#[derive(Clone)]
pub struct Terminated {
  /// The child that stopped.
  pub actor: ActorRef,
}

impl Message for Terminated {}

impl Debug for Terminated {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Terminated({})", self.actor.path())
  }
}

/// Where a handled message's reply should go.
pub(crate) enum ReplyTo {
  /// Another actor; replies are delivered as ordinary tells.
  Sender(ActorRef),
  /// A single-assignment settlement cell held by a caller outside the tree.
  Slot(ReplySlot),
}

pub(crate) enum MessageKind {
  System(SystemMessage),
  User {
    payload: AnyMessage,
    reply_to: Option<ReplyTo>,
  },
}

/// One mailbox entry.
pub(crate) struct Envelope {
  pub(crate) message: MessageKind,
  pub(crate) stashed: bool,
}

impl Envelope {
  pub(crate) fn system(message: SystemMessage) -> Self {
    Self { message: MessageKind::System(message), stashed: false }
  }

  pub(crate) fn user(payload: AnyMessage, reply_to: Option<ReplyTo>) -> Self {
    Self {
      message: MessageKind::User { payload, reply_to },
      stashed: false,
    }
  }
}
