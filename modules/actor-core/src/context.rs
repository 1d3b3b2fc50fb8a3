use crate::actor::{Actor, ActorPath, Props};
use crate::cell::ActorRef;
use crate::error::FatalError;
use crate::message::{AnyMessage, Message, ReplyTo};
use crate::scheduler::Executor;

/// The actor's view of its own cell, handed to behaviors and lifecycle
/// hooks.
///
/// Everything here runs on the owning actor's own scheduling lanes, so no
/// operation blocks and none races the actor's state.
pub struct Context<'a> {
  cell: &'a ActorRef,
}

impl<'a> Context<'a> {
  pub(crate) fn new(cell: &'a ActorRef) -> Self {
    Self { cell }
  }

  /// Handle to the actor itself, for example to pass as a reply destination.
  #[must_use]
  pub fn self_ref(&self) -> &ActorRef {
    self.cell
  }

  /// Path of the actor.
  #[must_use]
  pub fn path(&self) -> &ActorPath {
    self.cell.path()
  }

  /// Local name of the actor.
  #[must_use]
  pub fn name(&self) -> &str {
    self.cell.name()
  }

  /// Spawns a child of this actor. See [`ActorRef::spawn`].
  pub fn spawn<A: Actor>(&mut self, props: &Props<A>, name: &str) -> ActorRef {
    self.cell.spawn(props, name)
  }

  /// Requests an orderly stop of this actor and its subtree.
  pub fn stop(&mut self) {
    self.cell.stop();
  }

  /// Stops a direct child. Stopping anything that is not a direct child is
  /// a fatal contract violation.
  pub fn stop_child(&mut self, child: &ActorRef) {
    self.cell.stop_child(child);
  }

  /// Subscribes to a direct child's termination: when the child has fully
  /// stopped, exactly one [`crate::message::Terminated`] is delivered to
  /// this actor. Idempotent; watching a non-child is fatal.
  pub fn watch(&mut self, child: &ActorRef) {
    self.cell.watch_child(child);
  }

  /// The sending actor of the message currently being processed, when the
  /// sender attached itself as reply destination.
  #[must_use]
  pub fn sender(&self) -> Option<ActorRef> {
    let inner = self.cell.core().inner.lock();
    match inner.current.as_ref().and_then(|current| current.reply_to.as_ref()) {
      Some(ReplyTo::Sender(sender)) => Some(sender.clone()),
      _ => None,
    }
  }

  /// Settles the current message's reply obligation.
  ///
  /// Fulfills an attached settlement cell, or tells the attached sender with
  /// this actor as the new sender. The obligation is consumed; replying
  /// when no destination is attached, or a second time, is a logged no-op.
  pub fn reply<M: Message>(&mut self, message: M) {
    let reply_to = {
      let mut inner = self.cell.core().inner.lock();
      inner.current.as_mut().and_then(|current| current.reply_to.take())
    };
    match reply_to {
      Some(ReplyTo::Slot(slot)) => slot.fulfill(AnyMessage::new(message)),
      Some(ReplyTo::Sender(sender)) => sender.tell_from(message, self.cell),
      None => {
        tracing::warn!(path = %self.cell.path(), "reply with no reply destination attached");
      }
    }
  }

  /// Moves the message currently being processed onto the stash buffer.
  ///
  /// The envelope is re-delivered by [`Context::unstash_all`]. Stashing the
  /// same envelope twice, or calling this outside message processing, is a
  /// fatal contract violation.
  pub fn stash(&mut self) {
    let core = self.cell.core();
    let mut inner = core.inner.lock();
    let violation = match inner.current.as_mut() {
      None => Some(FatalError::StashOutsideMessage { path: core.path.to_string() }),
      Some(current) if current.stashed || current.stash_requested => {
        Some(FatalError::DoubleStash { path: core.path.to_string() })
      }
      Some(current) => {
        current.stash_requested = true;
        None
      }
    };
    drop(inner);
    if let Some(violation) = violation {
      core.system.fatal(violation);
    }
  }

  /// Re-enqueues every stashed envelope, in original arrival order, for
  /// reprocessing under whatever behavior is active when they come back
  /// around. Calling this with an empty stash is a fatal contract
  /// violation.
  pub fn unstash_all(&mut self) {
    let core = self.cell.core();
    let envelopes = core.inner.lock().stash.drain_all();
    if envelopes.is_empty() {
      core.system.fatal(FatalError::UnstashUnderflow { path: core.path.to_string() });
      return;
    }
    for envelope in envelopes {
      core.mailbox.enqueue(envelope);
    }
  }

  /// Marks the current message as unhandled regardless of what the active
  /// behavior returned; it is then routed to the system's unhandled-message
  /// policy.
  pub fn unhandled(&mut self) {
    let mut inner = self.cell.core().inner.lock();
    if let Some(current) = inner.current.as_mut() {
      current.force_unhandled = true;
    }
  }

  pub(crate) fn executor(&self) -> Executor {
    self.cell.core().executor.clone()
  }
}
