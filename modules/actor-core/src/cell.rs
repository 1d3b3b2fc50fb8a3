use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use arbor_utils_core_rs::{CountDownLatch, Queue, WaitGroup};
use parking_lot::Mutex;

use crate::actor::{Actor, ActorPath, ActorState, Props};
use crate::ask::ReplySlot;
use crate::behavior::Behavior;
use crate::context::Context;
use crate::error::{AskError, FatalError};
use crate::mailbox::{Mailbox, MailboxOwner};
use crate::message::{AnyMessage, Envelope, Message, MessageKind, ReplyTo, SystemMessage, Terminated};
use crate::scheduler::{Executor, PriorityScheduler};
use crate::system::SystemHandle;

/// Per-message bookkeeping held only while a user message is being
/// processed.
pub(crate) struct CurrentMessage {
  pub(crate) reply_to: Option<ReplyTo>,
  /// The envelope was stashed once before; stashing it again is fatal.
  pub(crate) stashed: bool,
  pub(crate) stash_requested: bool,
  pub(crate) force_unhandled: bool,
}

/// Lane-confined mutable state of one cell. Mutated only from the cell's own
/// scheduling lanes; cross-actor access goes through message enqueue.
pub(crate) struct CellInner {
  pub(crate) state: ActorState,
  pub(crate) children: HashMap<String, ActorRef>,
  pub(crate) watched: HashSet<String>,
  pub(crate) stash: Queue<Envelope>,
  pub(crate) current: Option<CurrentMessage>,
  /// Fan-out/fan-in countdown barrier for subtree shutdown.
  pub(crate) stop_barrier: WaitGroup,
  /// Completion latches to fire once this cell reaches `Stopped`.
  pub(crate) stop_latches: Vec<CountDownLatch>,
}

impl CellInner {
  fn new() -> Self {
    Self {
      state: ActorState::Spawned,
      children: HashMap::new(),
      watched: HashSet::new(),
      stash: Queue::new(),
      current: None,
      stop_barrier: WaitGroup::new(),
      stop_latches: Vec::new(),
    }
  }
}

/// The type-erasure-independent half of an actor cell.
pub(crate) struct CellCore {
  pub(crate) path: ActorPath,
  pub(crate) system: SystemHandle,
  pub(crate) executor: Executor,
  pub(crate) scheduler: PriorityScheduler,
  pub(crate) mailbox: Mailbox,
  /// Non-owning back-reference; the parent owns its children, never the
  /// other way around.
  pub(crate) parent: Option<Weak<dyn CellOps>>,
  pub(crate) inner: Mutex<CellInner>,
}

/// Object-safe view of a cell; the generic actor payload hides behind it.
pub(crate) trait CellOps: Send + Sync {
  fn core(&self) -> &CellCore;
  /// Evaluates the current behavior against one user message. Returns
  /// whether any handler claimed it.
  fn handle_user(&self, cell: &ActorRef, payload: &AnyMessage) -> bool;
  fn run_pre_start(&self, cell: &ActorRef);
  fn run_post_stop(&self, cell: &ActorRef);
}

/// A spawned actor: its context core plus the actor instance and current
/// behavior. Bound to the instance for the whole lifetime of the cell.
pub(crate) struct Cell<A: Actor> {
  core: CellCore,
  actor: Mutex<A>,
  behavior: Mutex<Behavior<A>>,
}

impl<A: Actor> Cell<A> {
  pub(crate) fn build(
    path: ActorPath,
    props: &Props<A>,
    system: SystemHandle,
    executor: Executor,
    parent: Option<Weak<dyn CellOps>>,
  ) -> ActorRef {
    let actor = props.produce();
    let behavior = actor.behavior();
    let scheduler = PriorityScheduler::new(executor.clone(), props.priority());
    let mailbox = Mailbox::new(path.clone());
    let cell = Arc::new(Cell {
      core: CellCore {
        path,
        system,
        executor,
        scheduler,
        mailbox,
        parent,
        inner: Mutex::new(CellInner::new()),
      },
      actor: Mutex::new(actor),
      behavior: Mutex::new(behavior),
    });
    ActorRef { ops: cell }
  }
}

impl<A: Actor> CellOps for Cell<A> {
  fn core(&self) -> &CellCore {
    &self.core
  }

  fn handle_user(&self, cell: &ActorRef, payload: &AnyMessage) -> bool {
    let mut actor = self.actor.lock();
    let mut behavior = self.behavior.lock();
    let mut ctx = Context::new(cell);
    behavior.evaluate(&mut actor, &mut ctx, payload)
  }

  fn run_pre_start(&self, cell: &ActorRef) {
    let mut actor = self.actor.lock();
    let mut ctx = Context::new(cell);
    actor.pre_start(&mut ctx);
  }

  fn run_post_stop(&self, cell: &ActorRef) {
    let mut actor = self.actor.lock();
    let mut ctx = Context::new(cell);
    actor.post_stop(&mut ctx);
  }
}

/// Mailbox-to-cell bridge. Holds the cell weakly so a queued signal can
/// never keep a dead cell alive.
struct PumpHandle {
  cell: Weak<dyn CellOps>,
}

impl MailboxOwner for PumpHandle {
  fn suspend_pump(&self) {
    if let Some(ops) = self.cell.upgrade() {
      ops.core().scheduler.suspend_normal();
    }
  }

  fn resume_pump(&self) {
    if let Some(ops) = self.cell.upgrade() {
      ops.core().scheduler.resume_normal();
    }
  }

  fn signal(&self) {
    if let Some(ops) = self.cell.upgrade() {
      ActorRef { ops }.schedule_pump();
    }
  }

  fn late_system(&self, message: SystemMessage) {
    match self.cell.upgrade() {
      Some(ops) => ActorRef { ops }.absorb_late_poison(message),
      None => {
        if let SystemMessage::PoisonPill(Some(latch)) = message {
          latch.count_down();
        }
      }
    }
  }
}

/// Handle to a spawned actor.
///
/// Cheap to clone; compares and hashes by actor path. All operations are
/// non-blocking except [`ActorRef::mailbox_len`] and
/// [`ActorRef::child_count`], which run a snapshot query on the actor's high
/// lane and must not be called from inside that actor's own message
/// handling.
pub struct ActorRef {
  pub(crate) ops: Arc<dyn CellOps>,
}

impl ActorRef {
  pub(crate) fn core(&self) -> &CellCore {
    self.ops.core()
  }

  /// Full path of the actor.
  #[must_use]
  pub fn path(&self) -> &ActorPath {
    &self.core().path
  }

  /// Local name, unique among siblings.
  #[must_use]
  pub fn name(&self) -> &str {
    self.core().path.name()
  }

  /// Snapshot of the lifecycle state.
  #[must_use]
  pub fn state(&self) -> ActorState {
    self.core().inner.lock().state
  }

  /// Sends a message; never blocks the caller.
  pub fn tell<M: Message>(&self, message: M) {
    self.deliver_user(AnyMessage::new(message), None);
  }

  /// Sends a message carrying the sending actor as reply destination.
  pub fn tell_from<M: Message>(&self, message: M, sender: &ActorRef) {
    self.deliver_user(AnyMessage::new(message), Some(ReplyTo::Sender(sender.clone())));
  }

  /// Sends a message carrying a settlement cell for the reply.
  ///
  /// If the target's mailbox is already stopped the slot settles immediately
  /// with a stopped-mailbox failure; the paired future never hangs.
  pub fn tell_with_reply<M: Message>(&self, message: M, slot: ReplySlot) {
    self.deliver_user(AnyMessage::new(message), Some(ReplyTo::Slot(slot)));
  }

  /// Sends a control message through the mailbox, in FIFO position.
  pub fn tell_system(&self, message: SystemMessage) {
    self.core().mailbox.enqueue(Envelope::system(message));
  }

  pub(crate) fn tell_any_from(&self, payload: AnyMessage, sender: &ActorRef) {
    self.deliver_user(payload, Some(ReplyTo::Sender(sender.clone())));
  }

  pub(crate) fn deliver_user(&self, payload: AnyMessage, reply_to: Option<ReplyTo>) {
    self.core().mailbox.enqueue(Envelope::user(payload, reply_to));
  }

  /// Spawns a child under this actor.
  ///
  /// The returned handle is usable immediately; registration and start run
  /// on this actor's high lane. A sibling-name collision is a fatal contract
  /// violation, and a parent that is already stopping refuses the spawn
  /// entirely so a stopped actor's child set is provably empty.
  pub fn spawn<A: Actor>(&self, props: &Props<A>, name: &str) -> ActorRef {
    let core = self.core();
    let child_path = core.path.child(name);
    let child = Cell::build(
      child_path,
      props,
      core.system.clone(),
      core.executor.clone(),
      Some(Arc::downgrade(&self.ops)),
    );
    let parent = self.clone();
    let registered = child.clone();
    let child_name = name.to_string();
    core.scheduler.run_high_priority(move || parent.register_child(child_name, registered));
    child
  }

  /// Requests an orderly stop of this actor and its whole subtree.
  ///
  /// Idempotent. Runs on the high lane, so a backlog of queued user
  /// messages cannot delay it.
  pub fn stop(&self) {
    let this = self.clone();
    self.core().scheduler.run_high_priority(move || this.stop_on_lane());
  }

  /// Number of messages currently queued. Snapshot query; do not call from
  /// inside this actor's own handlers.
  #[must_use]
  pub fn mailbox_len(&self) -> usize {
    let this = self.clone();
    self.core().scheduler.blocking_high_priority(move || this.core().mailbox.len())
  }

  /// Number of live children. Snapshot query; do not call from inside this
  /// actor's own handlers.
  #[must_use]
  pub fn child_count(&self) -> usize {
    let this = self.clone();
    self.core().scheduler.blocking_high_priority(move || this.core().inner.lock().children.len())
  }

  pub(crate) fn start(&self) {
    let this = self.clone();
    self.core().scheduler.run_high_priority(move || {
      let core = this.core();
      {
        let inner = core.inner.lock();
        if inner.state != ActorState::Spawned {
          let state = inner.state;
          drop(inner);
          core.system.fatal(FatalError::InvalidStartState { path: core.path.to_string(), state });
          return;
        }
      }
      this.ops.run_pre_start(&this);
      core.inner.lock().state = ActorState::Started;
      core.mailbox.attach_owner(Arc::new(PumpHandle { cell: Arc::downgrade(&this.ops) }));
      tracing::trace!(path = %core.path, "started");
    });
  }

  /// Stop plus a latch that opens once this cell reaches `Stopped`.
  pub(crate) fn stop_with_latch(&self, latch: CountDownLatch) {
    let this = self.clone();
    self.core().scheduler.run_high_priority(move || {
      {
        let mut inner = this.core().inner.lock();
        if inner.state == ActorState::Stopped {
          drop(inner);
          latch.count_down();
          return;
        }
        inner.stop_latches.push(latch);
      }
      this.stop_on_lane();
    });
  }

  pub(crate) fn watch_child(&self, child: &ActorRef) {
    let this = self.clone();
    let child = child.clone();
    self.core().scheduler.run_high_priority(move || {
      let core = this.core();
      let name = child.name().to_string();
      let mut inner = core.inner.lock();
      let is_child = inner.children.get(&name).is_some_and(|registered| registered == &child);
      if is_child {
        inner.watched.insert(name);
        return;
      }
      drop(inner);
      core.system.fatal(FatalError::NotAChild {
        parent: core.path.to_string(),
        child: child.path().to_string(),
      });
    });
  }

  pub(crate) fn stop_child(&self, child: &ActorRef) {
    let this = self.clone();
    let child = child.clone();
    self.core().scheduler.run_high_priority(move || {
      let core = this.core();
      let is_child = {
        let inner = core.inner.lock();
        inner.children.get(child.name()).is_some_and(|registered| registered == &child)
      };
      if is_child {
        child.stop();
        return;
      }
      core.system.fatal(FatalError::NotAChild {
        parent: core.path.to_string(),
        child: child.path().to_string(),
      });
    });
  }

  /// A child's shutdown handshake: runs on this actor's high lane.
  pub(crate) fn child_stopped(&self, child: &ActorRef) {
    let this = self.clone();
    let child = child.clone();
    self.core().scheduler.run_high_priority(move || {
      let core = this.core();
      let name = child.name().to_string();
      let (watched, stopping) = {
        let mut inner = core.inner.lock();
        if inner.children.remove(&name).is_none() {
          drop(inner);
          core.system.fatal(FatalError::MissingChild {
            parent: core.path.to_string(),
            child: child.path().to_string(),
          });
          return;
        }
        (inner.watched.remove(&name), inner.state == ActorState::Stopping)
      };
      tracing::trace!(parent = %core.path, child = %child.path(), "child stopped");
      if watched {
        this.tell(Terminated { actor: child.clone() });
      }
      if stopping {
        let barrier = core.inner.lock().stop_barrier.clone();
        barrier.done();
      }
    });
  }

  pub(crate) fn schedule_pump(&self) {
    let weak = Arc::downgrade(&self.ops);
    self.core().scheduler.run_normal(move || {
      if let Some(ops) = weak.upgrade() {
        ActorRef { ops }.pump_once();
      }
    });
  }

  /// One step of the message pump: dequeue one envelope and process it.
  /// Runs on the normal lane; pumping happens only in `Started`.
  fn pump_once(&self) {
    let core = self.core();
    if core.inner.lock().state != ActorState::Started {
      return;
    }
    let Some(envelope) = core.mailbox.dequeue() else {
      return;
    };
    match envelope.message {
      MessageKind::System(message) => self.process_system(message),
      MessageKind::User { payload, reply_to } => self.process_user(payload, reply_to, envelope.stashed),
    }
  }

  fn process_system(&self, message: SystemMessage) {
    match message {
      SystemMessage::PoisonPill(latch) => {
        tracing::trace!(path = %self.core().path, "poison pill reached the mailbox head");
        if let Some(latch) = latch {
          self.core().inner.lock().stop_latches.push(latch);
        }
        self.stop();
      }
    }
  }

  fn process_user(&self, payload: AnyMessage, reply_to: Option<ReplyTo>, already_stashed: bool) {
    let core = self.core();
    core.inner.lock().current = Some(CurrentMessage {
      reply_to,
      stashed: already_stashed,
      stash_requested: false,
      force_unhandled: false,
    });
    let handled = self.ops.handle_user(self, &payload);
    let current = core.inner.lock().current.take();
    let Some(current) = current else {
      return;
    };
    if current.stash_requested {
      core.inner.lock().stash.enqueue(Envelope {
        message: MessageKind::User { payload, reply_to: current.reply_to },
        stashed: true,
      });
    } else if !handled || current.force_unhandled {
      core.system.report_unhandled(&core.path, payload);
    }
  }

  fn register_child(&self, name: String, child: ActorRef) {
    let core = self.core();
    let mut inner = core.inner.lock();
    if inner.state >= ActorState::Stopping {
      drop(inner);
      tracing::warn!(parent = %core.path, child = %child.path(), "spawn refused, parent is stopping");
      child.discard_unstarted();
      return;
    }
    if inner.children.contains_key(&name) {
      drop(inner);
      core.system.fatal(FatalError::DuplicateChild { parent: core.path.to_string(), name });
      child.discard_unstarted();
      return;
    }
    inner.children.insert(name, child.clone());
    drop(inner);
    tracing::debug!(
      parent = %core.path,
      child = %child.path(),
      priority = ?child.core().scheduler.priority(),
      "spawned child"
    );
    child.start();
  }

  /// Disposes a cell whose registration was refused. The cell never started,
  /// so no lifecycle hooks run and no parent is notified; queued reply
  /// obligations settle through the mailbox stop.
  fn discard_unstarted(&self) {
    let this = self.clone();
    self.core().scheduler.run_high_priority(move || {
      let core = this.core();
      {
        let mut inner = core.inner.lock();
        if inner.state >= ActorState::Stopping {
          return;
        }
        inner.state = ActorState::Stopping;
      }
      let latches = core.mailbox.stop();
      let pending = {
        let mut inner = core.inner.lock();
        inner.stop_latches.extend(latches);
        inner.state = ActorState::Stopped;
        std::mem::take(&mut inner.stop_latches)
      };
      for latch in pending {
        latch.count_down();
      }
    });
  }

  /// The stop protocol, on this cell's high lane.
  ///
  /// Depth-first fan-out/fan-in: every child is told to stop and counted on
  /// the barrier; the barrier's completion schedules [`ActorRef::finish_stop`],
  /// so this subtree's root cannot finish before every descendant has.
  fn stop_on_lane(&self) {
    let core = self.core();
    {
      let mut inner = core.inner.lock();
      if inner.state >= ActorState::Stopping {
        return;
      }
      inner.state = ActorState::Stopping;
    }
    tracing::debug!(path = %core.path, "stopping");
    let latches = core.mailbox.stop();
    let children: Vec<ActorRef> = {
      let mut inner = core.inner.lock();
      inner.stop_latches.extend(latches);
      for envelope in inner.stash.drain_all() {
        if let MessageKind::User { payload, reply_to } = envelope.message {
          tracing::trace!(path = %core.path, message_type = payload.type_name(), "dropping stashed message");
          if let Some(ReplyTo::Slot(slot)) = reply_to {
            slot.reject(AskError::MailboxStopped { target: core.path.to_string() });
          }
        }
      }
      let children: Vec<ActorRef> = inner.children.values().cloned().collect();
      inner.stop_barrier.add(children.len());
      children
    };
    for child in &children {
      child.stop();
    }
    let barrier = core.inner.lock().stop_barrier.clone();
    let this = self.clone();
    barrier.notify(move || {
      let cell = this.clone();
      this.core().scheduler.run_high_priority(move || cell.finish_stop());
    });
  }

  /// Runs after the last child's handshake: `post_stop`, then `Stopped`,
  /// then the parent notification and any pending completion latches.
  fn finish_stop(&self) {
    let core = self.core();
    {
      let inner = core.inner.lock();
      if !inner.children.is_empty() {
        drop(inner);
        core.system.fatal(FatalError::LingeringChildren { path: core.path.to_string() });
        return;
      }
    }
    self.ops.run_post_stop(self);
    let latches = {
      let mut inner = core.inner.lock();
      inner.state = ActorState::Stopped;
      std::mem::take(&mut inner.stop_latches)
    };
    tracing::debug!(path = %core.path, "stopped");
    if let Some(parent) = core.parent.as_ref().and_then(Weak::upgrade) {
      ActorRef { ops: parent }.child_stopped(self);
    }
    for latch in latches {
      latch.count_down();
    }
  }

  fn absorb_late_poison(&self, message: SystemMessage) {
    let SystemMessage::PoisonPill(Some(latch)) = message else {
      return;
    };
    let this = self.clone();
    self.core().scheduler.run_high_priority(move || {
      let mut inner = this.core().inner.lock();
      if inner.state == ActorState::Stopped {
        drop(inner);
        latch.count_down();
      } else {
        inner.stop_latches.push(latch);
      }
    });
  }
}

impl Clone for ActorRef {
  fn clone(&self) -> Self {
    Self { ops: self.ops.clone() }
  }
}

impl PartialEq for ActorRef {
  fn eq(&self, other: &Self) -> bool {
    self.path() == other.path()
  }
}

impl Eq for ActorRef {}

impl Hash for ActorRef {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.path().hash(state);
  }
}

impl fmt::Debug for ActorRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "ActorRef({})", self.path())
  }
}
