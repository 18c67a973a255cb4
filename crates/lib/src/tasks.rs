//! Supervised pool for detached background work.
//!
//! Apply passes and peer fan-out deliveries outlive the call that started them.
//! They are spawned here so that shutdown can wait for in-flight installs
//! rather than abandon them.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{Instrument, debug, error, warn};

struct PoolInner {
  closed: Mutex<bool>,
  /// Number of spawned tasks that have not finished yet.
  in_flight: watch::Sender<usize>,
}

/// Tasks are detached from the pool: waiting on the pool never owns a task
/// handle, so a cancelled `drain` or `shutdown` leaves every task running.
#[derive(Clone)]
pub struct TaskPool {
  inner: Arc<PoolInner>,
}

impl Default for TaskPool {
  fn default() -> Self {
    Self {
      inner: Arc::new(PoolInner {
        closed: Mutex::new(false),
        in_flight: watch::Sender::new(0),
      }),
    }
  }
}

impl std::fmt::Debug for TaskPool {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TaskPool")
      .field("tasks", &self.len())
      .field("closed", &*self.closed())
      .finish()
  }
}

impl TaskPool {
  pub fn new() -> Self {
    Self::default()
  }

  fn closed(&self) -> MutexGuard<'_, bool> {
    self.inner.closed.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Spawn `task` onto the pool.
  ///
  /// Returns `false` (and drops the task) once the pool is shutting down.
  pub fn spawn<F>(&self, name: &'static str, task: F) -> bool
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let closed = self.closed();
    if *closed {
      warn!(task = name, "task pool is shut down, dropping task");
      return false;
    }
    // Counted while `closed` is held so shutdown cannot miss it.
    self.inner.in_flight.send_modify(|n| *n += 1);
    drop(closed);

    debug!(task = name, "spawning background task");
    let handle = tokio::spawn(task.in_current_span());
    let inner = self.inner.clone();
    tokio::spawn(
      async move {
        report(name, handle.await);
        inner.in_flight.send_modify(|n| *n = n.saturating_sub(1));
      }
      .in_current_span(),
    );
    true
  }

  /// Number of tasks still running.
  pub fn len(&self) -> usize {
    *self.inner.in_flight.borrow()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Wait until every task, including ones spawned while waiting, has finished.
  pub async fn drain(&self) {
    let mut in_flight = self.inner.in_flight.subscribe();
    // The sender lives in `self`, so the channel cannot close while waiting.
    let _ = in_flight.wait_for(|n| *n == 0).await;
  }

  /// Refuse new work and wait for in-flight tasks to complete.
  pub async fn shutdown(&self) {
    *self.closed() = true;
    self.drain().await;
  }
}

fn report(name: &'static str, result: Result<(), JoinError>) {
  if let Err(e) = result {
    if e.is_panic() {
      error!(task = name, error = %e, "background task panicked");
    } else {
      warn!(task = name, error = %e, "background task cancelled");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;
  use tracing_test::traced_test;

  #[tokio::test]
  async fn drain_waits_for_tasks() {
    let pool = TaskPool::new();
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
      let done = done.clone();
      pool.spawn("sleep", async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        done.fetch_add(1, Ordering::SeqCst);
      });
    }

    pool.drain().await;
    assert_eq!(done.load(Ordering::SeqCst), 3);
    assert!(pool.is_empty());
  }

  #[tokio::test]
  async fn drain_waits_for_nested_spawns() {
    let pool = TaskPool::new();
    let done = Arc::new(AtomicUsize::new(0));

    let inner_pool = pool.clone();
    let inner_done = done.clone();
    pool.spawn("outer", async move {
      inner_pool.spawn("inner", async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        inner_done.fetch_add(1, Ordering::SeqCst);
      });
    });

    pool.drain().await;
    assert_eq!(done.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn cancelled_drain_leaves_tasks_running() {
    let pool = TaskPool::new();
    let done = Arc::new(AtomicUsize::new(0));

    let flag = done.clone();
    pool.spawn("slow", async move {
      tokio::time::sleep(Duration::from_millis(200)).await;
      flag.fetch_add(1, Ordering::SeqCst);
    });

    let waited = tokio::time::timeout(Duration::from_millis(20), pool.drain()).await;
    assert!(waited.is_err());
    assert_eq!(pool.len(), 1);

    pool.drain().await;
    assert_eq!(done.load(Ordering::SeqCst), 1);
    assert!(pool.is_empty());
  }

  #[tokio::test]
  async fn cancelled_shutdown_still_completes_tasks() {
    let pool = TaskPool::new();
    let done = Arc::new(AtomicUsize::new(0));

    let flag = done.clone();
    pool.spawn("slow", async move {
      tokio::time::sleep(Duration::from_millis(100)).await;
      flag.fetch_add(1, Ordering::SeqCst);
    });

    let waited = tokio::time::timeout(Duration::from_millis(10), pool.shutdown()).await;
    assert!(waited.is_err());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(done.load(Ordering::SeqCst), 1);
    assert!(pool.is_empty());
  }

  #[tokio::test]
  #[traced_test]
  async fn shutdown_refuses_new_tasks() {
    let pool = TaskPool::new();
    pool.shutdown().await;

    assert!(!pool.spawn("late", async {}));
    assert!(pool.is_empty());
    assert!(logs_contain("task pool is shut down"));
  }

  #[tokio::test]
  #[traced_test]
  async fn panicking_task_does_not_poison_pool() {
    let pool = TaskPool::new();
    pool.spawn("boom", async { panic!("boom") });
    pool.drain().await;

    assert!(logs_contain("background task panicked"));
    assert!(pool.spawn("after", async {}));
    pool.drain().await;
  }
}
