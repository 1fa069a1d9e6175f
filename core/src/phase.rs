//! Phase identification and ordering for the processing lifecycle.
//!
//! A [`Phase`] is a named stage with an integer ordering key. The engine runs
//! phases in ascending key order; phases sharing a key are drained together as
//! a single bucket. Names exist for humans (logs, errors) — only the key
//! drives scheduling.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

/// A named stage in the processing lifecycle of a unit of work.
///
/// Phases are plain values: cheap to clone, comparable, and defined by the
/// application. A default set covering the usual message-handling lifecycle is
/// provided as associated constants; applications may add their own phases at
/// any integer position, including between or outside the defaults.
///
/// # Ordering and equality
///
/// Phases sort by their ordering key ascending (names break ties only so the
/// ordering is total). Two phases are *equal* only when both name and key
/// match; two *distinct* phases with the same key still execute in the same
/// bucket, concurrently.
///
/// # Examples
///
/// ```
/// use phaseline_core::phase::Phase;
///
/// let validate = Phase::new("VALIDATE", -500);
/// assert!(Phase::PRE_INVOCATION < validate);
/// assert!(validate < Phase::INVOCATION);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Phase {
    name: Cow<'static, str>,
    order: i32,
}

impl Phase {
    /// Runs before the message handler is invoked. Order `-1000`.
    pub const PRE_INVOCATION: Self = Self::from_static("PRE_INVOCATION", -1000);

    /// The message handler invocation itself. Order `0`.
    pub const INVOCATION: Self = Self::from_static("INVOCATION", 0);

    /// Runs after the handler, before commit preparation. Order `1000`.
    pub const POST_INVOCATION: Self = Self::from_static("POST_INVOCATION", 1000);

    /// Prepares the commit (e.g. token advancement). Order `10000`.
    pub const PREPARE_COMMIT: Self = Self::from_static("PREPARE_COMMIT", 10000);

    /// The commit of the unit of work (e.g. storage writes). Order `20000`.
    pub const COMMIT: Self = Self::from_static("COMMIT", 20000);

    /// Runs once the commit has succeeded. Order `30000`.
    pub const AFTER_COMMIT: Self = Self::from_static("AFTER_COMMIT", 30000);

    /// Create a phase with an owned name.
    ///
    /// # Examples
    ///
    /// ```
    /// use phaseline_core::phase::Phase;
    ///
    /// let phase = Phase::new("AUDIT", 25000);
    /// assert_eq!(phase.name(), "AUDIT");
    /// assert_eq!(phase.order(), 25000);
    /// ```
    #[must_use]
    pub fn new(name: impl Into<String>, order: i32) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            order,
        }
    }

    /// Create a phase from a static name, usable in `const` position.
    #[must_use]
    pub const fn from_static(name: &'static str, order: i32) -> Self {
        Self {
            name: Cow::Borrowed(name),
            order,
        }
    }

    /// The phase name, as registered.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordering key. Lower keys run earlier.
    #[must_use]
    pub const fn order(&self) -> i32 {
        self.order
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.order)
    }
}

impl Ord for Phase {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order
            .cmp(&other.order)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for Phase {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
