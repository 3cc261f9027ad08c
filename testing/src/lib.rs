//! # Aether Loot Testing
//!
//! Testing utilities for reducers and anything that depends on a [`Clock`].
//!
//! - [`ReducerTest`]: Given/When/Then harness for reducers
//! - [`assertions`]: effect assertions
//! - [`FixedClock`] / [`test_clock`]: deterministic time
//! - [`init_test_tracing`]: opt-in log output while debugging a test
//!
//! ## Example
//!
//! ```ignore
//! use aetherloot_testing::{test_clock, ReducerTest};
//!
//! ReducerTest::new(TicketReducer::new())
//!     .with_env(test_environment())
//!     .given_state(TicketState::default())
//!     .when_action(TicketAction::Buy { seed: "42".into(), quantity: 3 })
//!     .then_state(|state| assert_eq!(state.phase, TicketPhase::AwaitingPurchase))
//!     .then_effects(assertions::assert_has_future_effect)
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use aetherloot_core::environment::Clock;


pub use reducer_test::{assertions, ReducerTest};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests
    ///
    /// Returns the same time until [`FixedClock::advance`] moves it.
    ///
    /// # Example
    ///
    /// ```
    /// use aetherloot_testing::mocks::FixedClock;
    /// use aetherloot_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            if let Ok(mut time) = self.time.lock() {
                *time += by;
            }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
                .lock()
                .map_or_else(|poisoned| *poisoned.into_inner(), |time| *time)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen.
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

/// Install a `tracing` subscriber that writes to the test harness output.
///
/// Honors `RUST_LOG`; safe to call from many tests (only the first call wins).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

pub use mocks::{test_clock, FixedClock};
