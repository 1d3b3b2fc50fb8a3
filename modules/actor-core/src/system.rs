use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use arbor_utils_core_rs::CountDownLatch;
use tokio::runtime::Runtime;

use crate::actor::{Actor, ActorPath, Props};
use crate::behavior::{ActionHandler, ActionResult, Behavior};
use crate::cell::{ActorRef, Cell};
use crate::error::FatalError;
use crate::message::AnyMessage;
use crate::scheduler::Executor;

/// A message no behavior in the receiving actor claimed.
#[derive(Clone, Debug)]
pub struct UnhandledMessage {
  /// Path of the actor that received the message.
  pub path: ActorPath,
  /// The message itself.
  pub message: AnyMessage,
}

/// Destination for unhandled messages when the fatal default is overridden.
pub type UnhandledSink = Arc<dyn Fn(UnhandledMessage) + Send + Sync>;

/// Receiver for fatal contract violations, replacing the default panic.
pub type FatalHook = Arc<dyn Fn(&FatalError) + Send + Sync>;

/// Policy for messages that exhaust an actor's behavior chain.
///
/// An unhandled message usually signals a protocol error, so the default
/// treats it as fatal; a sink keeps the system alive but still never drops
/// the message silently.
#[derive(Clone, Default)]
pub enum UnhandledPolicy {
  /// Route through the system's fatal hook. The default.
  #[default]
  Fatal,
  /// Hand the message to a dead-letter sink.
  Sink(UnhandledSink),
}

impl std::fmt::Debug for UnhandledPolicy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      UnhandledPolicy::Fatal => f.write_str("Fatal"),
      UnhandledPolicy::Sink(_) => f.write_str("Sink(..)"),
    }
  }
}

/// Tuning knobs applied at system construction.
#[derive(Clone, Default)]
pub struct ActorSystemConfig {
  unhandled: UnhandledPolicy,
  on_fatal: Option<FatalHook>,
}

impl ActorSystemConfig {
  /// Routes unhandled messages to `sink` instead of the fatal default.
  #[must_use]
  pub fn with_unhandled_sink<F>(mut self, sink: F) -> Self
  where
    F: Fn(UnhandledMessage) + Send + Sync + 'static, {
    self.unhandled = UnhandledPolicy::Sink(Arc::new(sink));
    self
  }

  /// Replaces the default panic on fatal contract violations.
  ///
  /// Intended for embedders that terminate the offending subtree themselves
  /// and for tests asserting on violations.
  #[must_use]
  pub fn with_fatal_hook<F>(mut self, hook: F) -> Self
  where
    F: Fn(&FatalError) + Send + Sync + 'static, {
    self.on_fatal = Some(Arc::new(hook));
    self
  }
}

pub(crate) struct SystemShared {
  name: String,
  config: ActorSystemConfig,
  uid: AtomicU64,
  root: OnceLock<ActorRef>,
}

impl SystemShared {
  fn next_uid(&self) -> u64 {
    self.uid.fetch_add(1, Ordering::SeqCst) + 1
  }
}

/// Non-owning handle from a cell back to its system.
///
/// Cells never keep the system alive; once the [`ActorSystem`] is gone the
/// handle degrades to logging.
#[derive(Clone)]
pub(crate) struct SystemHandle {
  shared: Weak<SystemShared>,
}

impl SystemHandle {
  pub(crate) fn fatal(&self, error: FatalError) {
    tracing::error!(%error, "actor runtime contract violation");
    let hook = self.shared.upgrade().and_then(|shared| shared.config.on_fatal.clone());
    match hook {
      Some(hook) => hook(&error),
      None => panic!("{error}"),
    }
  }

  pub(crate) fn report_unhandled(&self, path: &ActorPath, message: AnyMessage) {
    let Some(shared) = self.shared.upgrade() else {
      tracing::error!(path = %path, "unhandled message after system teardown");
      return;
    };
    match &shared.config.unhandled {
      UnhandledPolicy::Fatal => self.fatal(FatalError::UnhandledMessage {
        path: path.to_string(),
        message_type: message.type_name(),
      }),
      UnhandledPolicy::Sink(sink) => {
        tracing::warn!(path = %path, message = ?message, "unhandled message routed to sink");
        sink(UnhandledMessage { path: path.clone(), message });
      }
    }
  }

  pub(crate) fn new_unique_id(&self) -> Option<u64> {
    self.shared.upgrade().map(|shared| shared.next_uid())
  }

  pub(crate) fn root(&self) -> Option<ActorRef> {
    self.shared.upgrade().and_then(|shared| shared.root.get().cloned())
  }
}

/// The root actor: swallows everything sent to it.
struct Guardian;

impl Actor for Guardian {
  type Param = ();

  fn new(_param: ()) -> Self {
    Guardian
  }

  fn behavior(&self) -> Behavior<Self> {
    Behavior::new(ActionHandler::new(|_, _, _| ActionResult::Same))
  }
}

/// Owns the thread pool, the guardian root of the supervision tree, and the
/// system-wide unique-id counter.
pub struct ActorSystem {
  shared: Arc<SystemShared>,
  root: ActorRef,
  /// Keeps the pool alive for as long as the system exists.
  _runtime: Runtime,
}

impl ActorSystem {
  /// Creates a system with default configuration.
  ///
  /// `name` prefixes every actor path in the tree; a reverse-DNS style
  /// label works well.
  pub fn new(name: &str) -> io::Result<Self> {
    Self::with_config(name, ActorSystemConfig::default())
  }

  /// Creates a system with explicit configuration.
  pub fn with_config(name: &str, config: ActorSystemConfig) -> io::Result<Self> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
      .thread_name(format!("{name}-worker"))
      .enable_time()
      .build()?;
    let executor = Executor::new(runtime.handle().clone());
    let shared = Arc::new(SystemShared {
      name: name.to_string(),
      config,
      uid: AtomicU64::new(0),
      root: OnceLock::new(),
    });
    let handle = SystemHandle { shared: Arc::downgrade(&shared) };
    let root = Cell::<Guardian>::build(ActorPath::root(name), &Props::new(()), handle, executor, None);
    let _ = shared.root.set(root.clone());
    root.start();
    tracing::info!(system = name, "actor system started");
    Ok(Self { shared, root, _runtime: runtime })
  }

  /// The system name.
  #[must_use]
  pub fn name(&self) -> &str {
    &self.shared.name
  }

  /// The guardian root of the supervision tree.
  #[must_use]
  pub fn root(&self) -> &ActorRef {
    &self.root
  }

  /// Spawns a top-level actor under the guardian root.
  pub fn spawn<A: Actor>(&self, props: &Props<A>, name: &str) -> ActorRef {
    self.root.spawn(props, name)
  }

  /// Monotonically increasing counter for disambiguating ephemeral actor
  /// names.
  pub fn new_unique_id(&self) -> u64 {
    self.shared.next_uid()
  }

  /// Stops the whole tree and blocks until every actor has stopped.
  ///
  /// The one blocking call in the public surface, so process shutdown can
  /// be deterministic. Idempotent; must not be called from inside an actor.
  pub fn stop(&self) {
    tracing::info!(system = %self.shared.name, "stopping actor system");
    let latch = CountDownLatch::new(1);
    self.root.stop_with_latch(latch.clone());
    latch.wait();
    tracing::info!(system = %self.shared.name, "actor system stopped");
  }
}
