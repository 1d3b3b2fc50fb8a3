use thiserror::Error;

use crate::actor::ActorState;

/// Recoverable failure surfaced through a reply future.
///
/// Everything else the runtime treats as an error is a contract violation by
/// the caller and is routed through the system's fatal hook instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AskError {
  /// No reply arrived within the ask timeout window.
  #[error("ask timed out waiting on '{target}'")]
  Timeout {
    /// Path of the actor the request was sent to.
    target: String,
  },

  /// The destination mailbox was stopped before the message could be queued.
  #[error("mailbox of '{target}' is stopped")]
  MailboxStopped {
    /// Path of the actor whose mailbox rejected the message.
    target: String,
  },

  /// Every holder of the reply obligation went away without settling it.
  #[error("responder dropped before replying")]
  ResponderDropped,
}

/// A contract violation by runtime users.
///
/// These indicate programming errors, not recoverable runtime conditions;
/// the default response is a panic, overridable through the system's fatal
/// hook.
#[derive(Debug, Clone, Error)]
pub enum FatalError {
  /// A second child with an existing sibling name was spawned.
  #[error("child name '{name}' is not unique under '{parent}'")]
  DuplicateChild {
    /// Path of the spawning parent.
    parent: String,
    /// The colliding local name.
    name: String,
  },

  /// A watch or targeted stop named an actor that is not a direct child.
  #[error("'{child}' is not a direct child of '{parent}'")]
  NotAChild {
    /// Path of the actor issuing the operation.
    parent: String,
    /// Path of the actor it named.
    child: String,
  },

  /// A child reported its termination but was not in the children table.
  #[error("stopped child '{child}' is not registered under '{parent}'")]
  MissingChild {
    /// Path of the notified parent.
    parent: String,
    /// Path of the reporting child.
    child: String,
  },

  /// `start` was issued against a context that already left `Spawned`.
  #[error("cannot start '{path}' from state {state:?}")]
  InvalidStartState {
    /// Path of the actor.
    path: String,
    /// The state it was found in.
    state: ActorState,
  },

  /// The shutdown barrier completed while children were still registered.
  #[error("children of '{path}' outlived its shutdown barrier")]
  LingeringChildren {
    /// Path of the stopping actor.
    path: String,
  },

  /// `stash` was called while no message was being processed.
  #[error("stash called outside message processing in '{path}'")]
  StashOutsideMessage {
    /// Path of the actor.
    path: String,
  },

  /// The same envelope was stashed a second time.
  #[error("envelope stashed twice in '{path}'")]
  DoubleStash {
    /// Path of the actor.
    path: String,
  },

  /// `unstash_all` was called with an empty stash buffer.
  #[error("unstash_all on an empty stash in '{path}'")]
  UnstashUnderflow {
    /// Path of the actor.
    path: String,
  },

  /// A message exhausted the behavior chain under the fatal default policy.
  #[error("message of type {message_type} was not handled by '{path}'")]
  UnhandledMessage {
    /// Path of the receiving actor.
    path: String,
    /// Type name of the unclaimed payload.
    message_type: &'static str,
  },
}
