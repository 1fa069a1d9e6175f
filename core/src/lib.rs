//! # Phaseline Core
//!
//! Core model for the phaseline unit-of-work processing lifecycle.
//!
//! This crate holds the passive pieces of the lifecycle — the value types and
//! the seams — while the executing state machine lives in
//! `phaseline-runtime`.
//!
//! ## Core concepts
//!
//! - **[`Phase`](phase::Phase)**: a named stage with an integer ordering key;
//!   lower keys run earlier, equal keys share a bucket.
//! - **[`Resources`](resources::Resources)**: key/value state scoped to one
//!   unit of work, shared by its handlers.
//! - **[`WorkScheduler`](scheduler::WorkScheduler)**: the pluggable executor
//!   seam; the default [`InlineScheduler`](scheduler::InlineScheduler) runs
//!   work on the caller.
//! - **[`LifecycleError`](error::LifecycleError)**: registration, commit, and
//!   handler-failure errors, with opaque causes shared as
//!   [`Cause`](error::Cause).
//! - **[`Clock`](environment::Clock)**: injected time for instrumentation.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod environment;
pub mod error;
pub mod phase;
pub mod resources;
pub mod scheduler;

pub use environment::{Clock, SystemClock};
pub use error::{BoxError, Cause, FailurePoint, HandlerPanic, LifecycleError};
pub use phase::Phase;
pub use resources::{ResourceKey, Resources};
pub use scheduler::{InlineScheduler, Task, TaskFuture, WorkScheduler};
