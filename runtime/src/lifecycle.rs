//! The registration capability shared by the context and the façade.
//!
//! [`ProcessingLifecycle`] is a capability layering, not a hierarchy: both
//! [`ProcessingContext`](crate::context::ProcessingContext) (handed to every
//! handler) and [`AsyncUnitOfWork`](crate::unit_of_work::AsyncUnitOfWork)
//! (owned by the caller) expose the same three registration operations, and
//! generic code can accept either.

use crate::context::ProcessingContext;
use phaseline_core::error::{BoxError, Cause, LifecycleError};
use phaseline_core::phase::Phase;
use std::future::Future;

/// Registration surface of a unit of work.
///
/// # Examples
///
/// ```
/// use phaseline_core::phase::Phase;
/// use phaseline_runtime::{AsyncUnitOfWork, ProcessingLifecycle};
///
/// fn audit<L: ProcessingLifecycle>(lifecycle: &L) {
///     lifecycle.when_complete(|ctx| println!("done: {}", ctx.identifier()));
/// }
///
/// # fn main() -> Result<(), phaseline_core::error::LifecycleError> {
/// let unit_of_work = AsyncUnitOfWork::new();
/// unit_of_work.on(Phase::INVOCATION, |_ctx| async { Ok(()) })?;
/// audit(&unit_of_work);
/// # Ok(())
/// # }
/// ```
pub trait ProcessingLifecycle {
    /// Register an asynchronous action to run in `phase`.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::TooLate`] when execution has already reached a phase
    /// at or past `phase`.
    fn on<A, F>(&self, phase: Phase, action: A) -> Result<&Self, LifecycleError>
    where
        A: FnOnce(ProcessingContext) -> F + Send + 'static,
        F: Future<Output = Result<(), BoxError>> + Send + 'static;

    /// Register a hook fired exactly once if the unit of work fails.
    fn on_error<H>(&self, hook: H) -> &Self
    where
        H: FnOnce(ProcessingContext, Phase, Cause) + Send + 'static;

    /// Register a hook fired exactly once if the unit of work succeeds.
    fn when_complete<H>(&self, hook: H) -> &Self
    where
        H: FnOnce(ProcessingContext) + Send + 'static;
}

impl ProcessingLifecycle for ProcessingContext {
    fn on<A, F>(&self, phase: Phase, action: A) -> Result<&Self, LifecycleError>
    where
        A: FnOnce(ProcessingContext) -> F + Send + 'static,
        F: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        ProcessingContext::on(self, phase, action)
    }

    fn on_error<H>(&self, hook: H) -> &Self
    where
        H: FnOnce(ProcessingContext, Phase, Cause) + Send + 'static,
    {
        ProcessingContext::on_error(self, hook)
    }

    fn when_complete<H>(&self, hook: H) -> &Self
    where
        H: FnOnce(ProcessingContext) + Send + 'static,
    {
        ProcessingContext::when_complete(self, hook)
    }
}
