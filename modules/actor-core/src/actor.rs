use std::fmt;
use std::sync::Arc;

use crate::behavior::Behavior;
use crate::context::Context;

/// A unit of encapsulated state reachable only through messages.
///
/// Implementations provide a constructor from an opaque parameter, an initial
/// [`Behavior`], and optional lifecycle hooks. The runtime guarantees that all
/// methods of one actor instance run serially, so implementations never need
/// their own synchronization.
pub trait Actor: Sized + Send + 'static {
  /// Constructor parameter carried by [`Props`].
  type Param: Send + 'static;

  /// Builds a fresh actor instance from its spawn parameter.
  fn new(param: Self::Param) -> Self;

  /// The initial message handler installed when the actor starts.
  fn behavior(&self) -> Behavior<Self>;

  /// Hook invoked before the first message is pumped.
  fn pre_start(&mut self, _ctx: &mut Context<'_>) {}

  /// Hook invoked after the actor and all of its children have stopped.
  fn post_stop(&mut self, _ctx: &mut Context<'_>) {}
}

/// Spawn-time scheduling hint carried by [`Props`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Priority {
  /// Latency-sensitive actors.
  High,
  /// The ordinary lane.
  #[default]
  Default,
  /// Background work.
  Low,
}

/// Immutable spawn recipe: constructor parameter plus scheduling hint.
///
/// A `Props` can be cloned and spawned any number of times; every spawn
/// produces a fresh actor instance.
pub struct Props<A: Actor> {
  factory: Arc<dyn Fn() -> A + Send + Sync>,
  priority: Priority,
}

impl<A: Actor> Props<A> {
  /// Creates a recipe that builds the actor via [`Actor::new`].
  pub fn new(param: A::Param) -> Self
  where
    A::Param: Clone + Sync, {
    Self {
      factory: Arc::new(move || A::new(param.clone())),
      priority: Priority::default(),
    }
  }

  /// Overrides the spawn priority.
  #[must_use]
  pub fn with_priority(mut self, priority: Priority) -> Self {
    self.priority = priority;
    self
  }

  /// Scheduling hint recorded at spawn time.
  #[must_use]
  pub fn priority(&self) -> Priority {
    self.priority
  }

  pub(crate) fn produce(&self) -> A {
    (self.factory)()
  }
}

impl<A: Actor> Clone for Props<A> {
  fn clone(&self) -> Self {
    Self { factory: self.factory.clone(), priority: self.priority }
  }
}

/// Dot-joined ancestor chain identifying one actor.
///
/// Assigned once at spawn and never changed; actor handles compare and hash
/// by path.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ActorPath {
  full: Arc<str>,
}

impl ActorPath {
  pub(crate) fn root(name: &str) -> Self {
    Self { full: Arc::from(name) }
  }

  pub(crate) fn child(&self, name: &str) -> Self {
    debug_assert!(!name.contains('.'), "actor name '{name}' contains a path separator");
    Self { full: Arc::from(format!("{}.{}", self.full, name)) }
  }

  /// The full dot-joined path.
  #[must_use]
  pub fn as_str(&self) -> &str {
    &self.full
  }

  /// The final path segment, unique among siblings.
  #[must_use]
  pub fn name(&self) -> &str {
    self.full.rsplit('.').next().unwrap_or(&self.full)
  }
}

impl fmt::Display for ActorPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.full)
  }
}

impl fmt::Debug for ActorPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "ActorPath({})", self.full)
  }
}

/// Lifecycle states, totally ordered; a context never moves backwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActorState {
  /// Constructed and bound to a context, not yet started.
  Spawned = 1,
  /// `pre_start` has run; messages are being pumped.
  Started,
  /// Shutdown requested; waiting for the subtree to finish.
  Stopping,
  /// `post_stop` has run and every child is stopped.
  Stopped,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::behavior::{ActionHandler, ActionResult, Behavior};

  struct Inert;

  impl Actor for Inert {
    type Param = u8;

    fn new(_param: u8) -> Self {
      Inert
    }

    fn behavior(&self) -> Behavior<Self> {
      Behavior::new(ActionHandler::new(|_, _, _| ActionResult::Same))
    }
  }

  #[test]
  fn states_are_totally_ordered() {
    assert!(ActorState::Spawned < ActorState::Started);
    assert!(ActorState::Started < ActorState::Stopping);
    assert!(ActorState::Stopping < ActorState::Stopped);
  }

  #[test]
  fn paths_join_with_dots() {
    let root = ActorPath::root("sys");
    let child = root.child("alpha").child("beta");
    assert_eq!(child.as_str(), "sys.alpha.beta");
    assert_eq!(child.name(), "beta");
    assert_eq!(root.name(), "sys");
  }

  #[test]
  fn props_are_reusable() {
    let props = Props::<Inert>::new(7).with_priority(Priority::Low);
    let _first = props.produce();
    let _second = props.produce();
    assert_eq!(props.priority(), Priority::Low);
  }
}
