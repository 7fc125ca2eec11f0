//! Time sources for circuit breakers
//!
//! This module provides different clock implementations:
//! - `MonotonicClock`: the system monotonic clock (immune to NTP adjustments)
//! - `ManualClock`: a clock that only moves when told to, for tests and simulations

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Source of monotonic instants for recovery timing
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current instant
    fn now(&self) -> Instant;
}

/// System monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that advances only through [`ManualClock::advance`]
///
/// # Example
///
/// ```rust
/// use breakerbox::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(30));
/// assert_eq!(clock.now() - start, Duration::from_secs(30));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a clock frozen at `instant`
    pub fn starting_at(instant: Instant) -> Self {
        Self {
            now: Mutex::new(instant),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}
