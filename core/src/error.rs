//! Error model for the processing lifecycle.
//!
//! Handler failures are opaque to the engine: a handler fails with any boxed
//! error ([`BoxError`]), and the engine records the first failure as a shared
//! [`Cause`] so the same value can be fanned out to every error hook and
//! surfaced through the future returned by `execute()`.

use crate::phase::Phase;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The error type a failing phase handler resolves with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A recorded failure cause, shared between every observer of the failure.
///
/// `Arc`-backed so that the cause reported to `on_error` hooks and the cause
/// carried by the commit future are the *same* value, not copies.
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// The at-most-once record of where and why a unit of work failed.
///
/// Assigned by the first failing handler; never overwritten. Every `on_error`
/// hook receives the phase and cause held here.
#[derive(Clone, Debug)]
pub struct FailurePoint {
    /// The phase the failing handler was registered under.
    pub phase: Phase,
    /// The failure the handler resolved with.
    pub cause: Cause,
}

impl fmt::Display for FailurePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase {}: {}", self.phase, self.cause)
    }
}

/// Errors raised by the processing lifecycle itself.
///
/// Registration and commit misuse fail synchronously with the first two
/// variants; a failed run surfaces as [`LifecycleError::HandlerFailed`],
/// carrying the same `(phase, cause)` pair every `on_error` hook observed.
#[derive(Clone, Debug, Error)]
pub enum LifecycleError {
    /// A handler was registered for a phase the context has already reached
    /// or passed.
    #[error("cannot register handler for phase {requested}: processing context is already in phase {current}")]
    TooLate {
        /// The phase the registration asked for.
        requested: Phase,
        /// The phase the context is currently in.
        current: Phase,
    },

    /// The unit of work was committed a second time.
    #[error("processing context cannot be committed again")]
    AlreadyCommitted,

    /// A phase handler failed; the unit of work rolled back.
    #[error("handler failed in phase {phase}: {cause}")]
    HandlerFailed {
        /// The phase the first failing handler was registered under.
        phase: Phase,
        /// The recorded cause of the failure.
        cause: Cause,
    },
}

impl From<FailurePoint> for LifecycleError {
    fn from(failure: FailurePoint) -> Self {
        Self::HandlerFailed {
            phase: failure.phase,
            cause: failure.cause,
        }
    }
}

/// A panic captured from a handler or hook, rendered as an error value.
///
/// The engine never lets a panicking handler unwind through the drive loop;
/// the payload is captured and treated as that handler's failure.
#[derive(Debug, Error)]
#[error("handler panicked: {message}")]
pub struct HandlerPanic {
    message: String,
}

impl HandlerPanic {
    /// Wrap a rendered panic payload.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
