//! Time as an injected capability.
//!
//! The store never reads the system clock directly; it is handed a
//! [`Clock`] at construction. Production code uses [`SystemClock`]; tests
//! inject a fixed or scripted clock so timestamps are deterministic.

use chrono::{DateTime, Utc};

/// Source of "now" for timestamp stamping.
pub trait Clock: Send + Sync {
    /// The current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
///
/// # Examples
///
/// ```
/// use sequent_core::clock::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let a = clock.now();
/// let b = clock.now();
/// assert!(b >= a);
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
