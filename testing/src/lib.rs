//! # Sequent Testing
//!
//! Testing utilities for the Sequent workspace:
//!
//! - [`mocks`]: deterministic clocks
//! - [`memory::InMemoryEventStore`]: the fast in-process twin of the file
//!   store, with full query and append-condition semantics
//! - [`harness::TempStore`]: a file store wired to a temp directory that
//!   cleans up after itself
//! - [`fixtures`]: terse event constructors for tests
//!
//! ## Example
//!
//! ```ignore
//! use sequent_testing::harness::TempStore;
//! use sequent_testing::fixtures::tagged_event;
//! use sequent_core::Cancellation;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let temp = TempStore::new().await.unwrap();
//!     temp.store()
//!         .append(vec![tagged_event("A", &[("x", "1")])], None, Cancellation::none())
//!         .await
//!         .unwrap();
//! }
//! ```

use chrono::{DateTime, Utc};
use sequent_core::clock::Clock;

pub mod fixtures;
pub mod harness;
pub mod memory;

/// Mock implementations for deterministic tests.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::TimeDelta;
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests.
    ///
    /// Always returns the same time, making timestamps reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use sequent_testing::mocks::FixedClock;
    /// use sequent_core::clock::Clock;
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

        /// A fixed clock at the Unix epoch.
        #[must_use]
        pub fn epoch() -> Self {
            Self {
                time: DateTime::UNIX_EPOCH,
            }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that advances by a fixed step on every reading, so
    /// consecutive timestamps are distinct but fully deterministic.
    #[derive(Debug)]
    pub struct SteppingClock {
        current: Mutex<DateTime<Utc>>,
        step: TimeDelta,
    }

    impl SteppingClock {
        /// Start at `start`, advancing by `step` per reading.
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: TimeDelta) -> Self {
            Self {
                current: Mutex::new(start),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let mut current = match self.current.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let reading = *current;
            *current += self.step;
            reading
        }
    }

}
