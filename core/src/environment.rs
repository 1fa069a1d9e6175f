//! Injected environment dependencies.

use chrono::{DateTime, Utc};

/// Clock abstraction, injected for testability.
///
/// The lifecycle consumes a clock only for instrumentation (commit timing in
/// logs); swap in a fixed clock to keep tests deterministic.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
