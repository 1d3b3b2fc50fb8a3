use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use futures::channel::oneshot;
use parking_lot::Mutex;

use crate::actor::{Actor, Props};
use crate::behavior::{ActionHandler, ActionResult, Behavior};
use crate::cell::ActorRef;
use crate::context::Context;
use crate::error::AskError;
use crate::message::{AnyMessage, Message};
use crate::scheduler::TimerHandle;

/// Single-assignment settlement cell attached to a message.
///
/// The receiving actor settles it through [`Context::reply`]; a stopped
/// mailbox settles it with [`AskError::MailboxStopped`]. Dropping the slot
/// unsettled resolves the paired future with
/// [`AskError::ResponderDropped`], so the caller never hangs.
pub struct ReplySlot {
  tx: oneshot::Sender<Result<AnyMessage, AskError>>,
}

impl ReplySlot {
  /// Creates a slot and the future that observes its settlement.
  #[must_use]
  pub fn channel() -> (Self, AskFuture) {
    let (tx, rx) = oneshot::channel();
    (Self { tx }, AskFuture { rx })
  }

  pub(crate) fn fulfill(self, message: AnyMessage) {
    let _ = self.tx.send(Ok(message));
  }

  pub(crate) fn reject(self, error: AskError) {
    let _ = self.tx.send(Err(error));
  }
}

/// Future half of a [`ReplySlot`]; also returned by [`ask`].
pub struct AskFuture {
  rx: oneshot::Receiver<Result<AnyMessage, AskError>>,
}

impl Future for AskFuture {
  type Output = Result<AnyMessage, AskError>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
    match Pin::new(&mut self.rx).poll(cx) {
      Poll::Ready(Ok(settled)) => Poll::Ready(settled),
      Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(AskError::ResponderDropped)),
      Poll::Pending => Poll::Pending,
    }
  }
}

/// Internal signal telling an ask responder its window has elapsed.
#[derive(Debug)]
struct AskTimeout;

impl Message for AskTimeout {}

struct AskInflight {
  slot: Option<ReplySlot>,
  request: Option<AnyMessage>,
}

#[derive(Clone)]
struct AskParam {
  target: ActorRef,
  timeout: Duration,
  inflight: Arc<Mutex<AskInflight>>,
}

/// Ephemeral actor racing the real reply against its own timeout signal.
/// Whichever arrives first settles the cell; the loser is a no-op.
struct AskResponder {
  param: AskParam,
  timer: Option<TimerHandle>,
}

impl AskResponder {
  fn settle(&mut self, outcome: Result<AnyMessage, AskError>) {
    let slot = self.param.inflight.lock().slot.take();
    if let Some(slot) = slot {
      match outcome {
        Ok(message) => slot.fulfill(message),
        Err(error) => slot.reject(error),
      }
    }
  }
}

impl Actor for AskResponder {
  type Param = AskParam;

  fn new(param: AskParam) -> Self {
    Self { param, timer: None }
  }

  fn behavior(&self) -> Behavior<Self> {
    Behavior::new(ActionHandler::new(|actor: &mut AskResponder, ctx, message| {
      if let Some(timer) = actor.timer.take() {
        timer.cancel();
      }
      if message.is::<AskTimeout>() {
        tracing::debug!(target = %actor.param.target.path(), "ask timed out");
        actor.settle(Err(AskError::Timeout {
          target: actor.param.target.path().to_string(),
        }));
      } else {
        actor.settle(Ok(message.clone()));
      }
      ctx.stop();
      ActionResult::Same
    }))
  }

  fn pre_start(&mut self, ctx: &mut Context<'_>) {
    let me = ctx.self_ref().clone();
    self.timer = Some(ctx.executor().schedule_once(self.param.timeout, move || me.tell(AskTimeout)));
    // The timer is armed before the request goes out, so a reply can never
    // arrive while the timer does not exist yet.
    let request = self.param.inflight.lock().request.take();
    if let Some(request) = request {
      self.param.target.tell_any_from(request, ctx.self_ref());
    }
  }

  fn post_stop(&mut self, _ctx: &mut Context<'_>) {
    if let Some(timer) = self.timer.take() {
      timer.cancel();
    }
  }
}

/// Request/response over message passing.
///
/// Spawns a short-lived responder actor named from the target's path and a
/// system-generated unique id, arms a timer for `timeout`, then sends
/// `message` to `target` with the responder as reply destination. Exactly
/// one of reply and timeout settles the returned future; a reply arriving
/// after the timeout is dropped with the responder's stopped mailbox.
pub fn ask<M: Message>(target: &ActorRef, message: M, timeout: Duration) -> AskFuture {
  ask_any(target, AnyMessage::new(message), timeout)
}

/// [`ask`] for an already type-erased message.
pub fn ask_any(target: &ActorRef, message: AnyMessage, timeout: Duration) -> AskFuture {
  let (slot, future) = ReplySlot::channel();
  let system = &target.core().system;
  let (Some(root), Some(uid)) = (system.root(), system.new_unique_id()) else {
    tracing::warn!(target = %target.path(), "ask against a torn-down system");
    return future;
  };
  // The responder's local name must stay a single path segment, so the
  // target path's separators are flattened.
  let name = format!("ask-{}-{}", target.path().as_str().replace('.', "-"), uid);
  let param = AskParam {
    target: target.clone(),
    timeout,
    inflight: Arc::new(Mutex::new(AskInflight { slot: Some(slot), request: Some(message) })),
  };
  root.spawn(&Props::<AskResponder>::new(param), &name);
  future
}
