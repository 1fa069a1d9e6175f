//! The processing context: the state machine behind a unit of work.
//!
//! A [`ProcessingContext`] drives a message through its lifecycle phases. It
//! accumulates handlers per phase while not started, then — once committed —
//! drains the phase buckets in ascending order, running every handler in a
//! bucket concurrently and waiting for the whole bucket before advancing.
//! Success fans out to `when_complete` hooks; the first handler failure is
//! recorded once and fans out to `on_error` hooks.
//!
//! # Concurrency
//!
//! All shared state is held behind atomics, set-once cells, or short-lived
//! mutexes; no lock is held across an await. Handlers may register further
//! handlers and hooks from any thread while the context executes — late
//! registrations for a phase at or before the cursor are rejected
//! synchronously, and terminal hooks registered after completion are still
//! dispatched exactly once via the append-then-try-remove protocol.

use futures::future::join_all;
use futures::FutureExt;
use phaseline_core::environment::Clock;
use phaseline_core::error::{BoxError, Cause, FailurePoint, HandlerPanic, LifecycleError};
use phaseline_core::phase::Phase;
use phaseline_core::resources::Resources;
use phaseline_core::scheduler::{TaskFuture, WorkScheduler};
use phaseline_core::{DateTime, Utc};
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Lifecycle status of a processing context.
///
/// Transitions are monotonic: `NotStarted → Started` (the commit
/// compare-and-set), then `Started → Completed` or `Started → CompletedError`.
/// No other transition exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Handlers may be registered; `commit` has not been called.
    NotStarted,
    /// The phase buckets are being drained.
    Started,
    /// All buckets drained without failure; `when_complete` hooks fired.
    Completed,
    /// A handler failed; `on_error` hooks fired with the recorded cause.
    CompletedError,
}

impl Status {
    const fn as_u8(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Started => 1,
            Self::Completed => 2,
            Self::CompletedError => 3,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::NotStarted,
            1 => Self::Started,
            2 => Self::Completed,
            _ => Self::CompletedError,
        }
    }
}

/// A handler wrapped by [`safe`]: applied exactly once, resolves after
/// recording any failure.
type WrappedHandler = Box<dyn FnOnce(ProcessingContext) -> TaskFuture + Send>;

/// An `on_error` hook, silenced against panics at registration.
type ErrorHook = Box<dyn FnOnce(ProcessingContext, Phase, Cause) + Send>;

/// A `when_complete` hook, silenced against panics at registration.
type CompletionHook = Box<dyn FnOnce(ProcessingContext) + Send>;

/// All handlers registered for one ordering key.
///
/// Distinct phases sharing an order land in the same bucket; the phase of the
/// first registrant names the bucket in the cursor and in logs.
struct PhaseBucket {
    phase: Phase,
    handlers: Vec<WrappedHandler>,
}

struct ContextInner {
    identifier: String,
    phase_handlers: Mutex<BTreeMap<i32, PhaseBucket>>,
    current_phase: Mutex<Option<Phase>>,
    status: AtomicU8,
    error_cause: OnceLock<FailurePoint>,
    error_hooks: Mutex<VecDeque<(u64, ErrorHook)>>,
    completion_hooks: Mutex<VecDeque<(u64, CompletionHook)>>,
    hook_seq: AtomicU64,
    resources: Resources,
    scheduler: Arc<dyn WorkScheduler>,
    clock: Arc<dyn Clock>,
}

/// Cheap-clone handle to the running state of a unit of work.
///
/// Every phase handler and terminal hook receives a `ProcessingContext`; the
/// handle exposes registration (so handlers can schedule work into later
/// phases), the [`Resources`] bag, and the status predicates. The context is
/// created and committed by
/// [`AsyncUnitOfWork`](crate::unit_of_work::AsyncUnitOfWork).
#[derive(Clone)]
pub struct ProcessingContext {
    inner: Arc<ContextInner>,
}

impl ProcessingContext {
    pub(crate) fn new(
        identifier: String,
        scheduler: Arc<dyn WorkScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                identifier,
                phase_handlers: Mutex::new(BTreeMap::new()),
                current_phase: Mutex::new(None),
                status: AtomicU8::new(Status::NotStarted.as_u8()),
                error_cause: OnceLock::new(),
                error_hooks: Mutex::new(VecDeque::new()),
                completion_hooks: Mutex::new(VecDeque::new()),
                hook_seq: AtomicU64::new(0),
                resources: Resources::new(),
                scheduler,
                clock,
            }),
        }
    }

    /// The stable identifier of this unit of work.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    /// The resource bag scoped to this unit of work.
    #[must_use]
    pub fn resources(&self) -> &Resources {
        &self.inner.resources
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> Status {
        Status::from_u8(self.inner.status.load(Ordering::Acquire))
    }

    /// Whether `commit` has been called (terminal states included).
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.status() != Status::NotStarted
    }

    /// Whether the unit of work completed successfully.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.status() == Status::Completed
    }

    /// Whether the unit of work completed with a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status() == Status::CompletedError
    }

    /// Whether the unit of work reached either terminal state.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self.status(), Status::Completed | Status::CompletedError)
    }

    /// The phase bucket currently (or last) being drained, if any.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn current_phase(&self) -> Option<Phase> {
        self.inner.current_phase.lock().unwrap().clone()
    }

    /// Register `action` to run in `phase`.
    ///
    /// The action receives this context and resolves with `Ok(())` or any
    /// boxed error; a panicking action is captured and treated as a failure.
    /// Handlers in the same bucket run concurrently, so registration order
    /// carries no ordering guarantee.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::TooLate`] when execution has already reached a phase
    /// at or past `phase` — the check is synchronous, so a handler can safely
    /// register follow-up work for later phases while the context runs.
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn on<A, F>(&self, phase: Phase, action: A) -> Result<&Self, LifecycleError>
    where
        A: FnOnce(ProcessingContext) -> F + Send + 'static,
        F: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        {
            let current = self.inner.current_phase.lock().unwrap();
            if let Some(current) = current.as_ref() {
                if phase.order() <= current.order() {
                    return Err(LifecycleError::TooLate {
                        requested: phase,
                        current: current.clone(),
                    });
                }
            }
        }

        let order = phase.order();
        let wrapped = safe(phase.clone(), action);
        let mut buckets = self.inner.phase_handlers.lock().unwrap();
        buckets
            .entry(order)
            .or_insert_with(|| PhaseBucket {
                phase,
                handlers: Vec::new(),
            })
            .handlers
            .push(wrapped);
        Ok(self)
    }

    /// Register a hook to run if the unit of work completes with a failure.
    ///
    /// The hook receives the context plus the recorded `(phase, cause)` of
    /// the first failing handler. A panicking hook is swallowed and logged at
    /// `warn`; the remaining hooks still run. Hooks registered after the
    /// error state was reached are still dispatched exactly once.
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn on_error<H>(&self, hook: H) -> &Self
    where
        H: FnOnce(ProcessingContext, Phase, Cause) + Send + 'static,
    {
        let silent: ErrorHook = Box::new(move |ctx, phase, cause| {
            if catch_unwind(AssertUnwindSafe(|| hook(ctx, phase, cause))).is_err() {
                tracing::warn!("an on_error hook panicked; continuing fan-out");
            }
        });

        let id = self.inner.hook_seq.fetch_add(1, Ordering::Relaxed);
        self.inner
            .error_hooks
            .lock()
            .unwrap()
            .push_back((id, silent));

        if self.status() == Status::CompletedError {
            // The completer may be draining the queue right now. Whoever
            // removes the entry owns the single invocation.
            if let Some(failure) = self.inner.error_cause.get() {
                let owned = {
                    let mut queue = self.inner.error_hooks.lock().unwrap();
                    queue
                        .iter()
                        .position(|(entry, _)| *entry == id)
                        .and_then(|index| queue.remove(index))
                };
                if let Some((_, hook)) = owned {
                    let ctx = self.clone();
                    let phase = failure.phase.clone();
                    let cause = Arc::clone(&failure.cause);
                    self.inner
                        .scheduler
                        .submit(Box::new(move || hook(ctx, phase, cause)));
                }
            }
        }
        self
    }

    /// Register a hook to run if the unit of work completes successfully.
    ///
    /// Symmetric to [`on_error`](Self::on_error): panics are swallowed and
    /// logged at `warn`, and late registrations still fire exactly once.
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn when_complete<H>(&self, hook: H) -> &Self
    where
        H: FnOnce(ProcessingContext) + Send + 'static,
    {
        let silent: CompletionHook = Box::new(move |ctx| {
            if catch_unwind(AssertUnwindSafe(|| hook(ctx))).is_err() {
                tracing::warn!("a when_complete hook panicked; continuing fan-out");
            }
        });

        let id = self.inner.hook_seq.fetch_add(1, Ordering::Relaxed);
        self.inner
            .completion_hooks
            .lock()
            .unwrap()
            .push_back((id, silent));

        if self.status() == Status::Completed {
            let owned = {
                let mut queue = self.inner.completion_hooks.lock().unwrap();
                queue
                    .iter()
                    .position(|(entry, _)| *entry == id)
                    .and_then(|index| queue.remove(index))
            };
            if let Some((_, hook)) = owned {
                let ctx = self.clone();
                self.inner.scheduler.submit(Box::new(move || hook(ctx)));
            }
        }
        self
    }

    /// Drive the lifecycle to a terminal state.
    ///
    /// Flips `NotStarted → Started`, drains the phase buckets in ascending
    /// order, then fans out to the matching terminal hooks. Resolves with
    /// `Ok(())` or with the recorded first failure.
    pub(crate) async fn commit(&self) -> Result<(), LifecycleError> {
        if self
            .inner
            .status
            .compare_exchange(
                Status::NotStarted.as_u8(),
                Status::Started.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(LifecycleError::AlreadyCommitted);
        }

        let started_at = self.inner.clock.now();
        tracing::debug!(identifier = %self.inner.identifier, "unit of work started");

        match self.drain_phases().await {
            Ok(()) => {
                self.complete(started_at);
                Ok(())
            }
            Err(failure) => {
                self.complete_with_error(&failure, started_at);
                Err(failure.into())
            }
        }
    }

    /// Run buckets lowest order first; stop when the map is empty or a bucket
    /// failed. Later phases do not run after a failure.
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    async fn drain_phases(&self) -> Result<(), FailurePoint> {
        loop {
            let next = {
                let buckets = self.inner.phase_handlers.lock().unwrap();
                buckets.values().next().map(|bucket| bucket.phase.clone())
            };
            let Some(phase) = next else {
                return Ok(());
            };

            // Advance the cursor before detaching the bucket: from here on,
            // registrations at or below this order are rejected.
            *self.inner.current_phase.lock().unwrap() = Some(phase.clone());
            let bucket = {
                let mut buckets = self.inner.phase_handlers.lock().unwrap();
                buckets.remove(&phase.order())
            };

            self.run_bucket(&phase, bucket).await;

            if let Some(failure) = self.inner.error_cause.get() {
                return Err(failure.clone());
            }
        }
    }

    /// Schedule every handler of one bucket and await them all. Failures are
    /// recorded by the [`safe`] wrapper; the bucket never short-circuits.
    async fn run_bucket(&self, phase: &Phase, bucket: Option<PhaseBucket>) {
        let handlers = bucket.map(|bucket| bucket.handlers).unwrap_or_default();
        if handlers.is_empty() {
            tracing::debug!(
                identifier = %self.inner.identifier,
                phase = %phase,
                "skipping phase, no handlers registered"
            );
            return;
        }

        tracing::debug!(
            identifier = %self.inner.identifier,
            phase = %phase,
            handlers = handlers.len(),
            "running phase handlers"
        );
        let scheduled: Vec<TaskFuture> = handlers
            .into_iter()
            .map(|handler| {
                let ctx = self.clone();
                self.inner.scheduler.schedule(handler(ctx))
            })
            .collect();
        join_all(scheduled).await;
    }

    /// Record the first failure; later failures are logged, never recorded.
    fn record_failure(&self, phase: &Phase, cause: Cause) {
        let failure = FailurePoint {
            phase: phase.clone(),
            cause,
        };
        match self.inner.error_cause.set(failure) {
            Ok(()) => tracing::debug!(
                identifier = %self.inner.identifier,
                phase = %phase,
                "handler failure recorded as the unit of work outcome"
            ),
            Err(failure) => tracing::debug!(
                identifier = %self.inner.identifier,
                phase = %failure.phase,
                error = %failure.cause,
                "handler failed after an earlier failure was already recorded"
            ),
        }
    }

    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    fn complete(&self, started_at: DateTime<Utc>) {
        self.inner
            .status
            .store(Status::Completed.as_u8(), Ordering::Release);
        metrics::counter!("unit_of_work.commits", "outcome" => "success").increment(1);
        tracing::debug!(
            identifier = %self.inner.identifier,
            elapsed_ms = self.elapsed_ms(started_at),
            "unit of work committed"
        );

        loop {
            let next = self.inner.completion_hooks.lock().unwrap().pop_front();
            let Some((_, hook)) = next else { break };
            let ctx = self.clone();
            self.inner.scheduler.submit(Box::new(move || hook(ctx)));
        }
    }

    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    fn complete_with_error(&self, failure: &FailurePoint, started_at: DateTime<Utc>) {
        // The cause is published before the terminal status, so any
        // registrant that observes `CompletedError` can read it.
        self.inner
            .status
            .store(Status::CompletedError.as_u8(), Ordering::Release);
        metrics::counter!("unit_of_work.commits", "outcome" => "error").increment(1);
        tracing::debug!(
            identifier = %self.inner.identifier,
            phase = %failure.phase,
            error = %failure.cause,
            elapsed_ms = self.elapsed_ms(started_at),
            "unit of work rolled back"
        );

        loop {
            let next = self.inner.error_hooks.lock().unwrap().pop_front();
            let Some((_, hook)) = next else { break };
            let ctx = self.clone();
            let phase = failure.phase.clone();
            let cause = Arc::clone(&failure.cause);
            self.inner
                .scheduler
                .submit(Box::new(move || hook(ctx, phase, cause)));
        }
    }

    fn elapsed_ms(&self, started_at: DateTime<Utc>) -> i64 {
        self.inner
            .clock
            .now()
            .signed_duration_since(started_at)
            .num_milliseconds()
    }
}

impl fmt::Display for ProcessingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.current_phase() {
            Some(phase) => write!(
                f,
                "ProcessingContext {{ id: {}, phase: {} }}",
                self.inner.identifier, phase
            ),
            None => write!(
                f,
                "ProcessingContext {{ id: {}, phase: none }}",
                self.inner.identifier
            ),
        }
    }
}

impl fmt::Debug for ProcessingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingContext")
            .field("identifier", &self.inner.identifier)
            .field("status", &self.status())
            .field("current_phase", &self.current_phase())
            .finish_non_exhaustive()
    }
}

/// Wrap an action so that panics become failures, the first failure is
/// recorded in the context, and the handler future always resolves.
///
/// The action itself is applied when the wrapped future is polled, which is
/// on whatever execution the scheduler placed it.
fn safe<A, F>(phase: Phase, action: A) -> WrappedHandler
where
    A: FnOnce(ProcessingContext) -> F + Send + 'static,
    F: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Box::new(move |ctx: ProcessingContext| -> TaskFuture {
        Box::pin(async move {
            let result = match catch_unwind(AssertUnwindSafe(|| action(ctx.clone()))) {
                Ok(work) => AssertUnwindSafe(work)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| Err(panic_to_error(payload))),
                Err(payload) => Err(panic_to_error(payload)),
            };
            if let Err(error) = result {
                ctx.record_failure(&phase, error.into());
            }
        })
    })
}

fn panic_to_error(payload: Box<dyn Any + Send>) -> BoxError {
    let message = payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    Box::new(HandlerPanic::new(message))
}
