use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Blocking count-down latch.
///
/// Waiters block until the internal count reaches zero. Clones share the same
/// count, so a latch can be handed to the party responsible for counting it
/// down while the creator waits.
#[derive(Clone)]
pub struct CountDownLatch {
  inner: Arc<LatchInner>,
}

struct LatchInner {
  count: Mutex<usize>,
  cond: Condvar,
}

impl CountDownLatch {
  /// Creates a latch that opens after `count` calls to [`CountDownLatch::count_down`].
  #[must_use]
  pub fn new(count: usize) -> Self {
    Self {
      inner: Arc::new(LatchInner { count: Mutex::new(count), cond: Condvar::new() }),
    }
  }

  /// Decrements the count, waking every waiter once it reaches zero.
  ///
  /// Counting down an open latch is a no-op.
  pub fn count_down(&self) {
    let mut count = self.inner.count.lock();
    if *count == 0 {
      return;
    }
    *count -= 1;
    if *count == 0 {
      self.inner.cond.notify_all();
    }
  }

  /// Blocks the calling thread until the count reaches zero.
  pub fn wait(&self) {
    let mut count = self.inner.count.lock();
    while *count > 0 {
      self.inner.cond.wait(&mut count);
    }
  }

  /// Blocks until the count reaches zero or `timeout` elapses.
  ///
  /// Returns `true` when the latch opened within the window.
  pub fn wait_timeout(&self, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut count = self.inner.count.lock();
    while *count > 0 {
      let now = Instant::now();
      if now >= deadline {
        return false;
      }
      self.inner.cond.wait_for(&mut count, deadline - now);
    }
    true
  }

  /// Current count.
  #[must_use]
  pub fn count(&self) -> usize {
    *self.inner.count.lock()
  }
}

impl std::fmt::Debug for CountDownLatch {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CountDownLatch").field("count", &self.count()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn opens_once_count_reaches_zero() {
    let latch = CountDownLatch::new(2);
    let remote = latch.clone();
    let handle = std::thread::spawn(move || {
      remote.count_down();
      remote.count_down();
    });

    latch.wait();
    assert_eq!(latch.count(), 0);
    handle.join().expect("counter thread");
  }

  #[test]
  fn wait_timeout_reports_missed_deadline() {
    let latch = CountDownLatch::new(1);
    assert!(!latch.wait_timeout(Duration::from_millis(20)));
    latch.count_down();
    assert!(latch.wait_timeout(Duration::from_millis(20)));
  }

  #[test]
  fn count_down_past_zero_is_a_no_op() {
    let latch = CountDownLatch::new(1);
    latch.count_down();
    latch.count_down();
    assert_eq!(latch.count(), 0);
  }
}
