//! # Phaseline Testing
//!
//! Deterministic mocks and probes for testing phaseline lifecycles.
//!
//! This crate provides:
//! - [`FixedClock`]: a clock that never moves, for reproducible timing.
//! - [`RecordingScheduler`]: a scheduler decorator that counts dispatches.
//! - [`InvocationLog`]: a shared ordered log for asserting handler execution.
//!
//! ## Example
//!
//! ```ignore
//! use phaseline_runtime::AsyncUnitOfWork;
//! use phaseline_testing::InvocationLog;
//!
//! #[tokio::test]
//! async fn handlers_run_in_phase_order() {
//!     let log = InvocationLog::new();
//!     let unit_of_work = AsyncUnitOfWork::new();
//!     // ... register handlers that call log.record("...") ...
//!     unit_of_work.execute().await.unwrap();
//!     assert_eq!(log.entries(), vec!["validate", "handle", "commit"]);
//! }
//! ```

use chrono::{DateTime, Utc};
use phaseline_core::environment::Clock;
use phaseline_core::scheduler::{Task, TaskFuture, WorkScheduler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests.
    ///
    /// Always returns the same time, making commit-duration instrumentation
    /// reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use phaseline_testing::mocks::FixedClock;
    /// use phaseline_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC).
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Scheduler decorator that counts how work was dispatched.
///
/// Wraps any [`WorkScheduler`] and records the number of `schedule` and
/// `submit` calls, so tests can assert that handlers and terminal hooks went
/// through the scheduler seam.
pub struct RecordingScheduler {
    delegate: Arc<dyn WorkScheduler>,
    scheduled: AtomicUsize,
    submitted: AtomicUsize,
}

impl RecordingScheduler {
    /// Decorate the given scheduler.
    #[must_use]
    pub fn new(delegate: Arc<dyn WorkScheduler>) -> Self {
        Self {
            delegate,
            scheduled: AtomicUsize::new(0),
            submitted: AtomicUsize::new(0),
        }
    }

    /// Decorate the inline (run-on-caller) scheduler.
    #[must_use]
    pub fn inline() -> Self {
        Self::new(Arc::new(phaseline_core::scheduler::InlineScheduler))
    }

    /// Number of asynchronous units of work placed via `schedule`.
    #[must_use]
    pub fn scheduled(&self) -> usize {
        self.scheduled.load(Ordering::SeqCst)
    }

    /// Number of fire-and-forget tasks dispatched via `submit`.
    #[must_use]
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

impl WorkScheduler for RecordingScheduler {
    fn schedule(&self, work: TaskFuture) -> TaskFuture {
        self.scheduled.fetch_add(1, Ordering::SeqCst);
        self.delegate.schedule(work)
    }

    fn submit(&self, task: Task) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.delegate.submit(task);
    }
}

/// Shared, ordered log of named events.
///
/// Handlers append entries; the test asserts on the collected order. Clones
/// share the same underlying log.
#[derive(Clone, Debug, Default)]
pub struct InvocationLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl InvocationLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    /// Snapshot of all entries, in insertion order.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Number of entries recorded so far.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Re-export commonly used items
pub use mocks::{test_clock, FixedClock};
