use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::actor::Priority;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Thin handle onto the shared thread pool.
#[derive(Clone)]
pub(crate) struct Executor {
  handle: Handle,
}

impl Executor {
  pub(crate) fn new(handle: Handle) -> Self {
    Self { handle }
  }

  pub(crate) fn execute<F>(&self, task: F)
  where
    F: FnOnce() + Send + 'static, {
    self.handle.spawn(async move { task() });
  }

  /// Runs `task` once after `delay`, unless cancelled first.
  pub(crate) fn schedule_once<F>(&self, delay: Duration, task: F) -> TimerHandle
  where
    F: FnOnce() + Send + 'static, {
    let join = self.handle.spawn(async move {
      tokio::time::sleep(delay).await;
      task();
    });
    TimerHandle { abort: join.abort_handle() }
  }
}

/// Cancellation handle for a scheduled timer. Cancelling a timer that has
/// already fired is a no-op.
pub(crate) struct TimerHandle {
  abort: AbortHandle,
}

impl TimerHandle {
  pub(crate) fn cancel(&self) {
    self.abort.abort();
  }
}

struct SerialState {
  queue: VecDeque<Task>,
  draining: bool,
}

/// FIFO-preserving serial queue over the shared pool: at most one task runs
/// at a time, in submission order.
struct SerialLane {
  executor: Executor,
  state: Mutex<SerialState>,
}

impl SerialLane {
  fn new(executor: Executor) -> Arc<Self> {
    Arc::new(Self {
      executor,
      state: Mutex::new(SerialState { queue: VecDeque::new(), draining: false }),
    })
  }

  fn submit(self: &Arc<Self>, task: Task) {
    let spawn_drain = {
      let mut state = self.state.lock();
      state.queue.push_back(task);
      if state.draining {
        false
      } else {
        state.draining = true;
        true
      }
    };
    if spawn_drain {
      let lane = Arc::clone(self);
      self.executor.execute(move || lane.drain());
    }
  }

  fn drain(self: &Arc<Self>) {
    loop {
      let task = {
        let mut state = self.state.lock();
        match state.queue.pop_front() {
          Some(task) => task,
          None => {
            state.draining = false;
            return;
          }
        }
      };
      task();
    }
  }
}

struct GatedState {
  queue: VecDeque<Task>,
  suspend_count: usize,
  in_flight: bool,
}

/// The normal lane: its work source is gated through the high lane, so
/// suspension and resumption are serialized with high-priority work and
/// cannot race a task that is mid-execution.
struct GatedLane {
  high: Arc<SerialLane>,
  state: Mutex<GatedState>,
}

impl GatedLane {
  fn new(high: Arc<SerialLane>) -> Arc<Self> {
    Arc::new(Self {
      high,
      state: Mutex::new(GatedState { queue: VecDeque::new(), suspend_count: 0, in_flight: false }),
    })
  }

  fn submit(self: &Arc<Self>, task: Task) {
    self.state.lock().queue.push_back(task);
    self.forward_next();
  }

  fn suspend(&self) {
    self.state.lock().suspend_count += 1;
  }

  fn resume(self: &Arc<Self>) {
    {
      let mut state = self.state.lock();
      assert!(state.suspend_count > 0, "normal lane resumed without a matching suspend");
      state.suspend_count -= 1;
    }
    self.forward_next();
  }

  /// Hands the head task to the high lane, one at a time. The completion of
  /// that task triggers the next forward, preserving FIFO order while
  /// letting suspension take effect between tasks.
  fn forward_next(self: &Arc<Self>) {
    let task = {
      let mut state = self.state.lock();
      if state.in_flight || state.suspend_count > 0 {
        return;
      }
      match state.queue.pop_front() {
        Some(task) => {
          state.in_flight = true;
          task
        }
        None => return,
      }
    };
    let lane = Arc::clone(self);
    self.high.submit(Box::new(move || {
      task();
      lane.state.lock().in_flight = false;
      lane.forward_next();
    }));
  }
}

/// Per-actor pair of serial execution lanes.
///
/// The normal lane carries message processing and can be paused for
/// backpressure; the high lane carries control work (stop, registration,
/// watch bookkeeping) and always runs, so a backlog of user messages can
/// never starve it.
pub(crate) struct PriorityScheduler {
  high: Arc<SerialLane>,
  normal: Arc<GatedLane>,
  priority: Priority,
}

impl PriorityScheduler {
  pub(crate) fn new(executor: Executor, priority: Priority) -> Self {
    let high = SerialLane::new(executor);
    let normal = GatedLane::new(Arc::clone(&high));
    Self { high, normal, priority }
  }

  #[must_use]
  pub(crate) fn priority(&self) -> Priority {
    self.priority
  }

  /// Enqueues `task` behind all previously enqueued normal-lane work.
  pub(crate) fn run_normal<F>(&self, task: F)
  where
    F: FnOnce() + Send + 'static, {
    self.normal.submit(Box::new(task));
  }

  /// Pauses the normal lane, runs `task` on the high lane, then resumes the
  /// normal lane.
  pub(crate) fn run_high_priority<F>(&self, task: F)
  where
    F: FnOnce() + Send + 'static, {
    self.normal.suspend();
    let normal = Arc::clone(&self.normal);
    self.high.submit(Box::new(move || {
      task();
      normal.resume();
    }));
  }

  /// Synchronous variant of [`PriorityScheduler::run_high_priority`] for
  /// queries that need a consistent snapshot.
  ///
  /// Calling this from a task already executing on either lane of the same
  /// scheduler deadlocks; the runtime itself only ever calls it from outside
  /// its own lanes.
  pub(crate) fn blocking_high_priority<T, F>(&self, query: F) -> T
  where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static, {
    let (tx, rx) = mpsc::sync_channel(1);
    self.normal.suspend();
    let normal = Arc::clone(&self.normal);
    self.high.submit(Box::new(move || {
      let _ = tx.send(query());
      normal.resume();
    }));
    rx.recv().expect("high lane dropped a blocking query")
  }

  /// Backpressure hook for the mailbox: pauses the normal lane.
  pub(crate) fn suspend_normal(&self) {
    self.normal.suspend();
  }

  /// Backpressure hook for the mailbox: resumes the normal lane.
  pub(crate) fn resume_normal(&self) {
    self.normal.resume();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  use arbor_utils_core_rs::CountDownLatch;

  fn scheduler() -> (tokio::runtime::Runtime, PriorityScheduler) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
      .worker_threads(2)
      .enable_time()
      .build()
      .expect("test runtime");
    let executor = Executor::new(runtime.handle().clone());
    (runtime, PriorityScheduler::new(executor, Priority::Default))
  }

  #[test]
  fn normal_lane_preserves_fifo_order() {
    let (_rt, sched) = scheduler();
    let order = Arc::new(Mutex::new(Vec::new()));
    let latch = CountDownLatch::new(10);
    for n in 0..10 {
      let order = order.clone();
      let latch = latch.clone();
      sched.run_normal(move || {
        order.lock().push(n);
        latch.count_down();
      });
    }
    assert!(latch.wait_timeout(Duration::from_secs(5)));
    assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
  }

  #[test]
  fn high_priority_preempts_suspended_backlog() {
    let (_rt, sched) = scheduler();
    let order = Arc::new(Mutex::new(Vec::new()));
    let latch = CountDownLatch::new(3);

    sched.suspend_normal();
    for tag in ["normal-a", "normal-b"] {
      let order = order.clone();
      let latch = latch.clone();
      sched.run_normal(move || {
        order.lock().push(tag);
        latch.count_down();
      });
    }
    {
      let order = order.clone();
      let latch = latch.clone();
      sched.run_high_priority(move || {
        order.lock().push("high");
        latch.count_down();
      });
    }
    sched.resume_normal();

    assert!(latch.wait_timeout(Duration::from_secs(5)));
    assert_eq!(*order.lock(), vec!["high", "normal-a", "normal-b"]);
  }

  #[test]
  fn blocking_query_observes_prior_high_work() {
    let (_rt, sched) = scheduler();
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..5 {
      let counter = counter.clone();
      sched.run_high_priority(move || {
        counter.fetch_add(1, Ordering::SeqCst);
      });
    }
    let observed = {
      let counter = counter.clone();
      sched.blocking_high_priority(move || counter.load(Ordering::SeqCst))
    };
    assert_eq!(observed, 5);
  }

  #[test]
  fn timer_fires_once_and_cancels() {
    let (_rt, sched) = scheduler();
    let fired = Arc::new(AtomicUsize::new(0));
    let latch = CountDownLatch::new(1);

    let timer = {
      let fired = fired.clone();
      let latch = latch.clone();
      sched.high.executor.schedule_once(Duration::from_millis(10), move || {
        fired.fetch_add(1, Ordering::SeqCst);
        latch.count_down();
      })
    };
    assert!(latch.wait_timeout(Duration::from_secs(5)));
    drop(timer);

    let cancelled = {
      let fired = fired.clone();
      sched.high.executor.schedule_once(Duration::from_millis(10), move || {
        fired.fetch_add(1, Ordering::SeqCst);
      })
    };
    cancelled.cancel();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
  }
}
