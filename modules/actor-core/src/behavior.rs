use std::sync::Arc;

use crate::actor::Actor;
use crate::context::Context;
use crate::message::{AnyMessage, Message};

/// Outcome of one [`ActionHandler`] invocation.
pub enum ActionResult<A: Actor> {
  /// The handler did not recognize the message; composition falls through.
  Unhandled,
  /// Handled; keep the current handler for the next message.
  Same,
  /// Handled; replace this handler for subsequent messages.
  NewHandler(ActionHandler<A>),
  /// Handled; replace this whole position in the composition tree.
  NewBehavior(Behavior<A>),
}

type HandlerFn<A> = dyn Fn(&mut A, &mut Context<'_>, &AnyMessage) -> ActionResult<A> + Send + Sync;

/// A partial message handler: pure data, freely shared and recomposed.
pub struct ActionHandler<A: Actor> {
  f: Arc<HandlerFn<A>>,
}

impl<A: Actor> ActionHandler<A> {
  /// Wraps a closure over the type-erased message.
  pub fn new<F>(f: F) -> Self
  where
    F: Fn(&mut A, &mut Context<'_>, &AnyMessage) -> ActionResult<A> + Send + Sync + 'static, {
    Self { f: Arc::new(f) }
  }

  /// Lifts a typed closure over the capability check.
  ///
  /// Messages that are not of type `M` are reported as unhandled, which lets
  /// typed handlers compose with [`Behavior::or_else`] to form a total
  /// handler.
  pub fn of<M, F>(f: F) -> Self
  where
    M: Message,
    F: Fn(&mut A, &mut Context<'_>, &M) -> ActionResult<A> + Send + Sync + 'static, {
    Self::new(move |actor, ctx, message| match message.downcast_ref::<M>() {
      Some(message) => f(actor, ctx, message),
      None => ActionResult::Unhandled,
    })
  }

  pub(crate) fn invoke(&self, actor: &mut A, ctx: &mut Context<'_>, message: &AnyMessage) -> ActionResult<A> {
    (self.f)(actor, ctx, message)
  }
}

impl<A: Actor> Clone for ActionHandler<A> {
  fn clone(&self) -> Self {
    Self { f: self.f.clone() }
  }
}

enum Node<A: Actor> {
  Handler(ActionHandler<A>),
  AndThen(Box<Behavior<A>>, Box<Behavior<A>>),
  OrElse(Box<Behavior<A>>, Box<Behavior<A>>),
}

impl<A: Actor> Clone for Node<A> {
  fn clone(&self) -> Self {
    match self {
      Node::Handler(handler) => Node::Handler(handler.clone()),
      Node::AndThen(left, right) => Node::AndThen(left.clone(), right.clone()),
      Node::OrElse(first, fallback) => Node::OrElse(first.clone(), fallback.clone()),
    }
  }
}

/// A composable message handler built from [`ActionHandler`]s.
///
/// Behaviors are values: an actor may hold several pre-built behaviors and
/// switch among them per message by returning
/// [`ActionResult::NewBehavior`]. Two composition operators are provided;
/// both are associative, so repeated applications may be parenthesized
/// freely.
pub struct Behavior<A: Actor> {
  node: Node<A>,
}

impl<A: Actor> Behavior<A> {
  /// A behavior consisting of a single handler.
  pub fn new(handler: ActionHandler<A>) -> Self {
    Self { node: Node::Handler(handler) }
  }

  /// A single typed handler; shorthand for [`ActionHandler::of`].
  pub fn receive<M, F>(f: F) -> Self
  where
    M: Message,
    F: Fn(&mut A, &mut Context<'_>, &M) -> ActionResult<A> + Send + Sync + 'static, {
    Self::new(ActionHandler::of(f))
  }

  /// Sequential composition.
  ///
  /// Both sides see every message, left first; the message counts as handled
  /// when either side handled it. A replacement produced by one side applies
  /// in place for subsequent messages and leaves the other side composed.
  #[must_use]
  pub fn and_then(self, next: impl Into<Behavior<A>>) -> Self {
    Self {
      node: Node::AndThen(Box::new(self), Box::new(next.into())),
    }
  }

  /// Alternative composition: first match wins.
  ///
  /// The fallback is consulted only for messages the first side left
  /// unhandled; once the first side handles a message, even by returning
  /// [`ActionResult::Same`], the fallback never sees it.
  #[must_use]
  pub fn or_else(self, fallback: impl Into<Behavior<A>>) -> Self {
    Self {
      node: Node::OrElse(Box::new(self), Box::new(fallback.into())),
    }
  }

  /// Runs the composition against one message, applying replacements in
  /// place. Returns whether any handler claimed the message.
  pub(crate) fn evaluate(&mut self, actor: &mut A, ctx: &mut Context<'_>, message: &AnyMessage) -> bool {
    let result = match &mut self.node {
      Node::Handler(handler) => handler.invoke(actor, ctx, message),
      Node::AndThen(left, right) => {
        let left_handled = left.evaluate(actor, ctx, message);
        let right_handled = right.evaluate(actor, ctx, message);
        return left_handled || right_handled;
      }
      Node::OrElse(first, fallback) => {
        let first_handled = first.evaluate(actor, ctx, message);
        return first_handled || fallback.evaluate(actor, ctx, message);
      }
    };
    match result {
      ActionResult::Unhandled => false,
      ActionResult::Same => true,
      ActionResult::NewHandler(next) => {
        self.node = Node::Handler(next);
        true
      }
      ActionResult::NewBehavior(next) => {
        *self = next;
        true
      }
    }
  }
}

impl<A: Actor> Clone for Behavior<A> {
  fn clone(&self) -> Self {
    Self { node: self.node.clone() }
  }
}

impl<A: Actor> From<ActionHandler<A>> for Behavior<A> {
  fn from(handler: ActionHandler<A>) -> Self {
    Behavior::new(handler)
  }
}
