//! # Phaseline Runtime
//!
//! The asynchronous unit-of-work engine: a cooperative, phase-ordered
//! execution lifecycle for message-driven systems.
//!
//! A unit of work drives one message (or batch) through a sequence of named
//! phases. Handlers accumulate per phase; on execution the engine drains the
//! phase buckets in ascending order, runs every handler in a bucket
//! concurrently, waits for the whole bucket before advancing, and finishes by
//! fanning out exactly-once terminal notifications.
//!
//! ## Guarantees
//!
//! - **Strict phase ordering**: a phase fully completes before any handler of
//!   a later phase starts. Within a bucket, handlers are unordered.
//! - **At-most-once commit**: the second `execute()` fails with
//!   [`AlreadyCommitted`](phaseline_core::error::LifecycleError::AlreadyCommitted).
//! - **First failure wins**: the first failing handler's `(phase, cause)` is
//!   recorded once, aborts later phases, reaches every `on_error` hook, and is
//!   carried by the `execute()` future itself.
//! - **Race-safe terminal hooks**: a hook registered while (or after) the
//!   completer fans out still fires exactly once.
//!
//! ## Example
//!
//! ```
//! use phaseline_core::phase::Phase;
//! use phaseline_runtime::AsyncUnitOfWork;
//!
//! # async fn process() -> Result<(), phaseline_core::error::LifecycleError> {
//! let unit_of_work = AsyncUnitOfWork::new();
//! unit_of_work
//!     .on(Phase::PREPARE_COMMIT, |_ctx| async { Ok(()) })?
//!     .on_error(|_ctx, phase, cause| eprintln!("failed in {phase}: {cause}"));
//!
//! let answer = unit_of_work
//!     .execute_with_result(|_ctx| async { Ok(42) })
//!     .await?;
//! assert_eq!(answer, 42);
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod lifecycle;
pub mod scheduler;
pub mod unit_of_work;

pub use context::{ProcessingContext, Status};
pub use lifecycle::ProcessingLifecycle;
pub use scheduler::TokioScheduler;
pub use unit_of_work::AsyncUnitOfWork;
