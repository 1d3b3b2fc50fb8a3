use std::sync::Arc;

use parking_lot::Mutex;

type NotifyFn = Box<dyn FnOnce() + Send + 'static>;

/// Fan-out/fan-in counter with a completion callback.
///
/// [`WaitGroup::add`] registers outstanding work and [`WaitGroup::done`]
/// retires it. The callback handed to [`WaitGroup::notify`] runs exactly once,
/// on the thread that retires the final unit of work, or immediately when the
/// count is already zero.
#[derive(Clone)]
pub struct WaitGroup {
  inner: Arc<Mutex<WaitGroupState>>,
}

struct WaitGroupState {
  count: usize,
  notify: Option<NotifyFn>,
}

impl WaitGroup {
  /// Creates a wait group with a zero count and no callback.
  #[must_use]
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Mutex::new(WaitGroupState { count: 0, notify: None })),
    }
  }

  /// Registers `n` additional units of outstanding work.
  pub fn add(&self, n: usize) {
    self.inner.lock().count += n;
  }

  /// Retires one unit of work.
  ///
  /// # Panics
  /// Panics when called with no outstanding work; that is a bookkeeping bug
  /// in the caller.
  pub fn done(&self) {
    let notify = {
      let mut state = self.inner.lock();
      assert!(state.count > 0, "wait group underflow");
      state.count -= 1;
      if state.count == 0 {
        state.notify.take()
      } else {
        None
      }
    };
    if let Some(notify) = notify {
      notify();
    }
  }

  /// Installs the completion callback.
  ///
  /// Fires immediately when the count is already zero. At most one callback
  /// may be pending at a time.
  ///
  /// # Panics
  /// Panics when a callback is already installed.
  pub fn notify<F>(&self, f: F)
  where
    F: FnOnce() + Send + 'static, {
    let immediate = {
      let mut state = self.inner.lock();
      assert!(state.notify.is_none(), "wait group callback already installed");
      if state.count == 0 {
        true
      } else {
        state.notify = Some(Box::new(f));
        return;
      }
    };
    if immediate {
      f();
    }
  }

  /// Units of work still outstanding.
  #[must_use]
  pub fn count(&self) -> usize {
    self.inner.lock().count
  }
}

impl Default for WaitGroup {
  fn default() -> Self {
    Self::new()
  }
}

impl std::fmt::Debug for WaitGroup {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WaitGroup").field("count", &self.count()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[test]
  fn callback_fires_when_last_unit_retires() {
    let group = WaitGroup::new();
    group.add(3);

    let fired = Arc::new(AtomicUsize::new(0));
    let observed = fired.clone();
    group.notify(move || {
      observed.fetch_add(1, Ordering::SeqCst);
    });

    group.done();
    group.done();
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    group.done();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn callback_fires_immediately_on_zero_count() {
    let group = WaitGroup::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let observed = fired.clone();
    group.notify(move || {
      observed.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(fired.load(Ordering::SeqCst), 1);
  }

  #[test]
  #[should_panic(expected = "wait group underflow")]
  fn done_without_add_panics() {
    WaitGroup::new().done();
  }
}
