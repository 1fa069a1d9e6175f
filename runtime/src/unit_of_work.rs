//! The user-facing unit of work.
//!
//! [`AsyncUnitOfWork`] is a thin wrapper over one
//! [`ProcessingContext`]: callers register handlers and terminal hooks, then
//! drive the whole lifecycle with [`execute`](AsyncUnitOfWork::execute) or
//! [`execute_with_result`](AsyncUnitOfWork::execute_with_result).

use crate::context::ProcessingContext;
use crate::lifecycle::ProcessingLifecycle;
use phaseline_core::environment::{Clock, SystemClock};
use phaseline_core::error::{BoxError, Cause, LifecycleError};
use phaseline_core::phase::Phase;
use phaseline_core::scheduler::{InlineScheduler, WorkScheduler};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

/// A single end-to-end lifecycle execution for a message or batch.
///
/// Register work per phase, then execute once:
///
/// ```
/// use phaseline_core::phase::Phase;
/// use phaseline_runtime::AsyncUnitOfWork;
///
/// # async fn example() -> Result<(), phaseline_core::error::LifecycleError> {
/// let unit_of_work = AsyncUnitOfWork::new();
/// unit_of_work
///     .on(Phase::PRE_INVOCATION, |_ctx| async { Ok(()) })?
///     .on(Phase::COMMIT, |_ctx| async { Ok(()) })?;
///
/// unit_of_work.execute().await
/// # }
/// ```
///
/// By default the unit of work gets a random identifier and the inline
/// scheduler, making execution single-threaded and cooperative; a pool-backed
/// scheduler (such as
/// [`TokioScheduler`](crate::scheduler::TokioScheduler)) runs same-bucket
/// handlers in parallel.
pub struct AsyncUnitOfWork {
    context: ProcessingContext,
}

impl AsyncUnitOfWork {
    /// Unit of work with a random v4 identifier and the inline scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::with_identifier(Uuid::new_v4().to_string())
    }

    /// Unit of work with the given identifier and the inline scheduler.
    #[must_use]
    pub fn with_identifier(identifier: impl Into<String>) -> Self {
        Self::with_scheduler(identifier, Arc::new(InlineScheduler))
    }

    /// Unit of work dispatching handlers and hooks through `scheduler`.
    #[must_use]
    pub fn with_scheduler(identifier: impl Into<String>, scheduler: Arc<dyn WorkScheduler>) -> Self {
        Self::with_clock(identifier, scheduler, Arc::new(SystemClock))
    }

    /// Fully explicit constructor, additionally injecting the clock used for
    /// commit-timing instrumentation.
    #[must_use]
    pub fn with_clock(
        identifier: impl Into<String>,
        scheduler: Arc<dyn WorkScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            context: ProcessingContext::new(identifier.into(), scheduler, clock),
        }
    }

    /// The stable identifier of this unit of work.
    #[must_use]
    pub fn identifier(&self) -> &str {
        self.context.identifier()
    }

    /// Register an action for `phase`; see [`ProcessingContext::on`].
    ///
    /// # Errors
    ///
    /// [`LifecycleError::TooLate`] when execution already reached `phase`.
    pub fn on<A, F>(&self, phase: Phase, action: A) -> Result<&Self, LifecycleError>
    where
        A: FnOnce(ProcessingContext) -> F + Send + 'static,
        F: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.context.on(phase, action)?;
        Ok(self)
    }

    /// Register an error hook; see [`ProcessingContext::on_error`].
    pub fn on_error<H>(&self, hook: H) -> &Self
    where
        H: FnOnce(ProcessingContext, Phase, Cause) + Send + 'static,
    {
        self.context.on_error(hook);
        self
    }

    /// Register a completion hook; see [`ProcessingContext::when_complete`].
    pub fn when_complete<H>(&self, hook: H) -> &Self
    where
        H: FnOnce(ProcessingContext) + Send + 'static,
    {
        self.context.when_complete(hook);
        self
    }

    /// Execute all registered handlers in their phases.
    ///
    /// Resolves with `Ok(())` once the unit of work has committed, or with
    /// the failure that rolled it back.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::AlreadyCommitted`] on a second call;
    /// [`LifecycleError::HandlerFailed`] with the recorded `(phase, cause)`
    /// of the first failing handler.
    pub async fn execute(&self) -> Result<(), LifecycleError> {
        self.context.commit().await
    }

    /// Register `invocation` for the [`Phase::INVOCATION`] phase and execute.
    ///
    /// The value the invocation resolves with is returned once the unit of
    /// work has committed; if any handler fails, the execution failure is
    /// returned instead.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute), plus [`LifecycleError::TooLate`] when
    /// the invocation phase has already passed.
    pub async fn execute_with_result<R, A, F>(&self, invocation: A) -> Result<R, LifecycleError>
    where
        R: Send + 'static,
        A: FnOnce(ProcessingContext) -> F + Send + 'static,
        F: Future<Output = Result<R, BoxError>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.context.on(Phase::INVOCATION, move |ctx| {
            let work = invocation(ctx);
            async move {
                match work.await {
                    Ok(value) => {
                        // The caller may have dropped the receiver; the unit
                        // of work still commits.
                        let _ = sender.send(value);
                        Ok(())
                    }
                    Err(error) => Err(error),
                }
            }
        })?;

        self.execute().await?;

        // Phase ordering guarantees the invocation completed successfully
        // before a successful execute resolves.
        #[allow(clippy::expect_used)]
        let value = receiver
            .await
            .expect("invocation result is available after successful execution");
        Ok(value)
    }
}

impl Default for AsyncUnitOfWork {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingLifecycle for AsyncUnitOfWork {
    fn on<A, F>(&self, phase: Phase, action: A) -> Result<&Self, LifecycleError>
    where
        A: FnOnce(ProcessingContext) -> F + Send + 'static,
        F: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        AsyncUnitOfWork::on(self, phase, action)
    }

    fn on_error<H>(&self, hook: H) -> &Self
    where
        H: FnOnce(ProcessingContext, Phase, Cause) + Send + 'static,
    {
        AsyncUnitOfWork::on_error(self, hook)
    }

    fn when_complete<H>(&self, hook: H) -> &Self
    where
        H: FnOnce(ProcessingContext) + Send + 'static,
    {
        AsyncUnitOfWork::when_complete(self, hook)
    }
}

impl fmt::Display for AsyncUnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.context.current_phase() {
            Some(phase) => write!(
                f,
                "AsyncUnitOfWork {{ id: {}, phase: {} }}",
                self.identifier(),
                phase
            ),
            None => write!(f, "AsyncUnitOfWork {{ id: {}, phase: none }}", self.identifier()),
        }
    }
}

impl fmt::Debug for AsyncUnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncUnitOfWork")
            .field("context", &self.context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn fresh_units_of_work_get_distinct_identifiers() {
        let first = AsyncUnitOfWork::new();
        let second = AsyncUnitOfWork::new();
        assert_ne!(first.identifier(), second.identifier());
        assert!(!first.identifier().is_empty());
    }

    #[test]
    fn display_shows_identifier_and_phase() {
        let unit_of_work = AsyncUnitOfWork::with_identifier("batch-3");
        assert_eq!(
            unit_of_work.to_string(),
            "AsyncUnitOfWork { id: batch-3, phase: none }"
        );
    }

    #[tokio::test]
    async fn execute_with_result_yields_the_invocation_value() {
        let unit_of_work = AsyncUnitOfWork::with_identifier("answer");
        let result = unit_of_work
            .execute_with_result(|_ctx| async { Ok(42) })
            .await
            .expect("execution should succeed");
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn execute_with_result_surfaces_the_invocation_failure() {
        let unit_of_work = AsyncUnitOfWork::with_identifier("failing");
        let seen = Arc::new(Mutex::new(None));
        let probe = Arc::clone(&seen);
        unit_of_work.on_error(move |_ctx, phase, _cause| {
            *probe.lock().unwrap() = Some(phase);
        });

        let result: Result<u32, _> = unit_of_work
            .execute_with_result(|_ctx| async {
                Err(Box::new(io::Error::other("no handler for message")) as BoxError)
            })
            .await;

        match result {
            Err(LifecycleError::HandlerFailed { phase, cause }) => {
                assert_eq!(phase, Phase::INVOCATION);
                assert!(cause.to_string().contains("no handler for message"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(*seen.lock().unwrap(), Some(Phase::INVOCATION));
    }

    #[tokio::test]
    async fn registrations_chain() {
        let unit_of_work = AsyncUnitOfWork::with_identifier("chained");
        let runs = Arc::new(AtomicUsize::new(0));

        let first = Arc::clone(&runs);
        let second = Arc::clone(&runs);
        unit_of_work
            .on(Phase::PRE_INVOCATION, move |_ctx| async move {
                first.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .and_then(|uow| {
                uow.on(Phase::COMMIT, move |_ctx| async move {
                    second.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .expect("registrations before start");

        unit_of_work.execute().await.expect("execution should succeed");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_execute_fails_without_rerunning_handlers() {
        let unit_of_work = AsyncUnitOfWork::with_identifier("once");
        let runs = Arc::new(AtomicUsize::new(0));
        let probe = Arc::clone(&runs);
        unit_of_work
            .on(Phase::INVOCATION, move |_ctx| async move {
                probe.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .expect("registration before start");

        unit_of_work.execute().await.expect("first execution succeeds");
        let second = unit_of_work.execute().await;

        assert!(matches!(second, Err(LifecycleError::AlreadyCommitted)));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
