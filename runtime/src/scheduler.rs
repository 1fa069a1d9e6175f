//! Tokio-backed work scheduler.

use phaseline_core::scheduler::{Task, TaskFuture, WorkScheduler};
use tokio::runtime::Handle;

/// Scheduler that spawns work onto a Tokio runtime.
///
/// With this scheduler, handlers in the same phase bucket run as independent
/// tasks — on a multi-threaded runtime they execute in parallel. The engine
/// still awaits the whole bucket before advancing to the next phase.
///
/// # Examples
///
/// ```no_run
/// use phaseline_runtime::{AsyncUnitOfWork, TokioScheduler};
/// use std::sync::Arc;
///
/// # async fn example() {
/// let unit_of_work =
///     AsyncUnitOfWork::with_scheduler("batch-7", Arc::new(TokioScheduler::current()));
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Scheduler bound to the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime context, as
    /// [`Handle::current`] does.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: Handle::current(),
        }
    }

    /// Scheduler bound to an explicit runtime handle.
    #[must_use]
    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl WorkScheduler for TokioScheduler {
    fn schedule(&self, work: TaskFuture) -> TaskFuture {
        let task = self.handle.spawn(work);
        Box::pin(async move {
            // The engine's wrapped handlers capture their own panics; a join
            // error here means the task itself panicked or was cancelled.
            if let Err(error) = task.await {
                tracing::warn!(error = %error, "scheduled work did not run to completion");
            }
        })
    }

    fn submit(&self, task: Task) {
        self.handle.spawn(async move { task() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn schedule_resolves_after_the_work_completed() {
        let scheduler = TokioScheduler::current();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        let completion = scheduler.schedule(Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flag.store(true, Ordering::SeqCst);
        }));
        completion.await;

        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn submit_eventually_runs_the_task() {
        let scheduler = TokioScheduler::current();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        scheduler.submit(Box::new(move || flag.store(true, Ordering::SeqCst)));

        for _ in 0..100 {
            if ran.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(ran.load(Ordering::SeqCst));
    }
}
