//! Work scheduling abstraction for the processing lifecycle.
//!
//! The engine never decides *where* work runs; it hands every handler
//! invocation and every terminal-hook dispatch to a [`WorkScheduler`]. The
//! default [`InlineScheduler`] runs everything on the caller, which makes the
//! engine single-threaded and cooperative; a pool-backed scheduler makes
//! handlers within the same phase bucket run in parallel.

use std::future::Future;
use std::pin::Pin;

/// A fire-and-forget synchronous task, used for terminal-hook dispatch.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// An asynchronous unit of work placed on a scheduler.
///
/// Explicit `Pin<Box<dyn Future>>` (rather than `async fn` in the trait)
/// keeps [`WorkScheduler`] usable as a trait object behind `Arc`.
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Pluggable executor seam consumed by the processing lifecycle.
///
/// # Contract
///
/// - [`schedule`](Self::schedule) places asynchronous work and returns a
///   future that resolves once that work has completed. The engine awaits
///   these completion futures to honor its ordering guarantees; a scheduler
///   must therefore eventually run everything it accepts.
/// - [`submit`](Self::submit) dispatches a short synchronous task with no
///   completion signal (terminal hooks are fire-and-forget).
/// - Submission order is *not* part of the contract; callers must not rely on
///   FIFO execution.
///
/// # Thread safety
///
/// Implementations must be `Send + Sync`: registrations and completion can
/// dispatch from different threads.
pub trait WorkScheduler: Send + Sync {
    /// Place asynchronous work; the returned future resolves when the work
    /// has run to completion.
    fn schedule(&self, work: TaskFuture) -> TaskFuture;

    /// Dispatch a fire-and-forget synchronous task.
    fn submit(&self, task: Task);
}

/// The default scheduler: everything runs on the calling task or thread.
///
/// `schedule` returns the work unchanged, so the engine polls it directly and
/// handlers in the same bucket interleave cooperatively on the driver task.
/// `submit` runs the task before returning.
///
/// # Examples
///
/// ```
/// use phaseline_core::scheduler::{InlineScheduler, WorkScheduler};
///
/// let scheduler = InlineScheduler;
/// scheduler.submit(Box::new(|| println!("runs before submit returns")));
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineScheduler;

impl WorkScheduler for InlineScheduler {
    fn schedule(&self, work: TaskFuture) -> TaskFuture {
        work
    }

    fn submit(&self, task: Task) {
        task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn submit_runs_on_the_caller() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        InlineScheduler.submit(Box::new(move || flag.store(true, Ordering::SeqCst)));

        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn schedule_returns_the_work_unchanged() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        let completion = InlineScheduler.schedule(Box::pin(async move {
            flag.store(true, Ordering::SeqCst);
        }));

        assert!(!ran.load(Ordering::SeqCst));
        futures::executor::block_on(completion);
        assert!(ran.load(Ordering::SeqCst));
    }
}
