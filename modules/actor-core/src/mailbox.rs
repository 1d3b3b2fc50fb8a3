use std::sync::Arc;

use arbor_utils_core_rs::{CountDownLatch, Queue};
use parking_lot::Mutex;

use crate::actor::ActorPath;
use crate::error::AskError;
use crate::message::{Envelope, MessageKind, ReplyTo, SystemMessage};

/// The party that drains a mailbox: one actor cell.
///
/// The mailbox drives its owner through this trait instead of polling:
/// [`MailboxOwner::signal`] schedules exactly one pump step, and the
/// suspend/resume pair pauses scheduling while the queue is empty.
pub(crate) trait MailboxOwner: Send + Sync {
  /// Pauses the owner's normal lane.
  fn suspend_pump(&self);
  /// Resumes the owner's normal lane.
  fn resume_pump(&self);
  /// Schedules one message-pump step on the owner's normal lane.
  fn signal(&self);
  /// A control message landed after the mailbox stopped.
  fn late_system(&self, message: SystemMessage);
}

struct MailboxState {
  queue: Queue<Envelope>,
  stopped: bool,
  suspend_count: usize,
  owner: Option<Arc<dyn MailboxOwner>>,
}

/// Bounded-ordering FIFO queue of envelopes for one actor.
///
/// Owns the backpressure bookkeeping: `suspend_count` is 1 exactly while the
/// queue is empty and an owner is attached, meaning the owner's normal lane
/// is paused so an idle actor consumes no scheduler cycles.
pub(crate) struct Mailbox {
  path: ActorPath,
  state: Mutex<MailboxState>,
}

impl Mailbox {
  pub(crate) fn new(path: ActorPath) -> Self {
    Self {
      path,
      state: Mutex::new(MailboxState {
        queue: Queue::new(),
        stopped: false,
        suspend_count: 0,
        owner: None,
      }),
    }
  }

  /// Attaches the draining owner and kicks off the first pump step.
  ///
  /// Happens exactly once, when the owning cell starts; messages enqueued
  /// before that simply accumulate.
  pub(crate) fn attach_owner(&self, owner: Arc<dyn MailboxOwner>) {
    let mut state = self.state.lock();
    assert!(state.owner.is_none(), "mailbox '{}' already has an owner", self.path);
    state.suspend_count = 0;
    state.owner = Some(owner.clone());
    drop(state);
    owner.signal();
  }

  /// Appends an envelope, resuming the owner when the queue transitions from
  /// empty to non-empty while scheduling is paused.
  ///
  /// On a stopped mailbox the envelope is dropped; a carried reply slot is
  /// settled with a stopped-mailbox failure and a late poison pill's
  /// completion latch is forwarded to the owner's stop path.
  pub(crate) fn enqueue(&self, envelope: Envelope) {
    let mut state = self.state.lock();
    if state.stopped {
      let owner = state.owner.clone();
      drop(state);
      self.reject(envelope, owner);
      return;
    }
    state.queue.enqueue(envelope);
    if state.queue.len() == 1 && state.suspend_count == 1 {
      state.suspend_count = 0;
      if let Some(owner) = state.owner.clone() {
        owner.resume_pump();
      }
    }
  }

  /// Pops the head envelope, or `None` when the mailbox is stopped or empty.
  ///
  /// Pauses the owner's normal lane when the queue runs dry and
  /// unconditionally signals the owner afterwards; that signal, not a poll
  /// loop, is what keeps the message pump running.
  pub(crate) fn dequeue(&self) -> Option<Envelope> {
    let mut state = self.state.lock();
    if state.stopped {
      return None;
    }
    debug_assert_eq!(state.suspend_count, 0, "dequeue on a suspended mailbox");
    let envelope = state.queue.dequeue();
    let owner = state.owner.clone();
    if state.queue.is_empty() && state.suspend_count == 0 {
      if let Some(owner) = &owner {
        owner.suspend_pump();
        state.suspend_count = 1;
      }
    }
    drop(state);
    if let Some(owner) = &owner {
      owner.signal();
    }
    envelope
  }

  /// Stops the mailbox and drains it.
  ///
  /// Every drained reply obligation is settled with a stopped-mailbox
  /// failure; completion latches of drained poison pills are returned so the
  /// owning cell can fire them once it has fully stopped. Rebalances the
  /// owner's lane if the empty-queue suspension was being held.
  pub(crate) fn stop(&self) -> Vec<CountDownLatch> {
    let mut state = self.state.lock();
    if state.stopped {
      return Vec::new();
    }
    state.stopped = true;
    let drained = state.queue.drain_all();
    if state.suspend_count == 1 {
      state.suspend_count = 0;
      if let Some(owner) = state.owner.clone() {
        owner.resume_pump();
      }
    }
    drop(state);

    let mut latches = Vec::new();
    for envelope in drained {
      match envelope.message {
        MessageKind::System(SystemMessage::PoisonPill(Some(latch))) => latches.push(latch),
        MessageKind::System(SystemMessage::PoisonPill(None)) => {}
        MessageKind::User { payload, reply_to } => self.settle_dropped(payload.type_name(), reply_to),
      }
    }
    latches
  }

  #[must_use]
  pub(crate) fn len(&self) -> usize {
    self.state.lock().queue.len()
  }

  fn reject(&self, envelope: Envelope, owner: Option<Arc<dyn MailboxOwner>>) {
    match envelope.message {
      MessageKind::System(message @ SystemMessage::PoisonPill(Some(_))) => match owner {
        Some(owner) => owner.late_system(message),
        None => {
          // Never-started cell: its shutdown is already complete.
          if let SystemMessage::PoisonPill(Some(latch)) = message {
            latch.count_down();
          }
        }
      },
      MessageKind::System(SystemMessage::PoisonPill(None)) => {}
      MessageKind::User { payload, reply_to } => self.settle_dropped(payload.type_name(), reply_to),
    }
  }

  fn settle_dropped(&self, message_type: &str, reply_to: Option<ReplyTo>) {
    tracing::trace!(path = %self.path, message_type, "dropping message for stopped mailbox");
    if let Some(ReplyTo::Slot(slot)) = reply_to {
      slot.reject(AskError::MailboxStopped { target: self.path.to_string() });
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  use crate::ask::ReplySlot;
  use crate::message::AnyMessage;

  #[derive(Default)]
  struct FakeOwner {
    suspends: AtomicUsize,
    resumes: AtomicUsize,
    signals: AtomicUsize,
    late: AtomicUsize,
  }

  impl MailboxOwner for FakeOwner {
    fn suspend_pump(&self) {
      self.suspends.fetch_add(1, Ordering::SeqCst);
    }

    fn resume_pump(&self) {
      self.resumes.fetch_add(1, Ordering::SeqCst);
    }

    fn signal(&self) {
      self.signals.fetch_add(1, Ordering::SeqCst);
    }

    fn late_system(&self, message: SystemMessage) {
      self.late.fetch_add(1, Ordering::SeqCst);
      if let SystemMessage::PoisonPill(Some(latch)) = message {
        latch.count_down();
      }
    }
  }

  fn mailbox() -> (Mailbox, Arc<FakeOwner>) {
    let mailbox = Mailbox::new(ActorPath::root("test"));
    let owner = Arc::new(FakeOwner::default());
    mailbox.attach_owner(owner.clone());
    (mailbox, owner)
  }

  fn user(text: &str) -> Envelope {
    Envelope::user(AnyMessage::new(text.to_string()), None)
  }

  #[test]
  fn empty_dequeue_suspends_and_enqueue_resumes() {
    let (mailbox, owner) = mailbox();
    assert_eq!(owner.signals.load(Ordering::SeqCst), 1);

    assert!(mailbox.dequeue().is_none());
    assert_eq!(owner.suspends.load(Ordering::SeqCst), 1);
    assert_eq!(owner.signals.load(Ordering::SeqCst), 2);

    mailbox.enqueue(user("wake"));
    assert_eq!(owner.resumes.load(Ordering::SeqCst), 1);

    let envelope = mailbox.dequeue().expect("queued envelope");
    assert!(matches!(envelope.message, MessageKind::User { .. }));
    assert_eq!(owner.suspends.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn enqueue_while_running_does_not_resume() {
    let (mailbox, owner) = mailbox();
    mailbox.enqueue(user("a"));
    mailbox.enqueue(user("b"));
    assert_eq!(owner.resumes.load(Ordering::SeqCst), 0);
    assert_eq!(mailbox.len(), 2);
  }

  #[test]
  fn stop_settles_queued_reply_obligations() {
    let (mailbox, _owner) = mailbox();
    let (slot, future) = ReplySlot::channel();
    mailbox.enqueue(Envelope::user(AnyMessage::new("ask".to_string()), Some(ReplyTo::Slot(slot))));

    let latches = mailbox.stop();
    assert!(latches.is_empty());
    assert!(mailbox.dequeue().is_none());
    let result = futures::executor::block_on(future);
    assert!(matches!(result, Err(AskError::MailboxStopped { .. })));
  }

  #[test]
  fn stop_returns_poison_latches_from_the_queue() {
    let (mailbox, _owner) = mailbox();
    let latch = CountDownLatch::new(1);
    mailbox.enqueue(Envelope::system(SystemMessage::PoisonPill(Some(latch))));

    let latches = mailbox.stop();
    assert_eq!(latches.len(), 1);
  }

  #[test]
  fn enqueue_after_stop_settles_and_forwards_late_poison() {
    let (mailbox, owner) = mailbox();
    mailbox.stop();

    let (slot, future) = ReplySlot::channel();
    mailbox.enqueue(Envelope::user(AnyMessage::new(1_u32), Some(ReplyTo::Slot(slot))));
    assert!(matches!(
      futures::executor::block_on(future),
      Err(AskError::MailboxStopped { .. })
    ));

    let latch = CountDownLatch::new(1);
    mailbox.enqueue(Envelope::system(SystemMessage::PoisonPill(Some(latch.clone()))));
    assert_eq!(owner.late.load(Ordering::SeqCst), 1);
    assert_eq!(latch.count(), 0);
    assert!(mailbox.dequeue().is_none());
  }

  #[test]
  fn late_poison_without_owner_opens_its_latch() {
    let mailbox = Mailbox::new(ActorPath::root("orphan"));
    mailbox.stop();
    let latch = CountDownLatch::new(1);
    mailbox.enqueue(Envelope::system(SystemMessage::PoisonPill(Some(latch.clone()))));
    assert_eq!(latch.count(), 0);
  }
}
