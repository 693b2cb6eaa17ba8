// clock.rs — Injectable time source.
//
// Every component that asks "what time is it?" goes through a ClockSource so
// timers, sweeps and windows can be driven by a FakeClock in tests instead of
// sleeping.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::day::{civil_day, DayKey, ReferenceZone};

/// A source of the current instant.
pub trait ClockSource: Send + Sync {
    /// The current instant in UTC.
    fn now(&self) -> DateTime<Utc>;

    /// The civil day `instant` falls on in `zone`.
    fn civil_day(&self, instant: DateTime<Utc>, zone: ReferenceZone) -> DayKey {
        civil_day(instant, zone)
    }

    /// Today's civil day in `zone`.
    fn today(&self, zone: ReferenceZone) -> DayKey {
        civil_day(self.now(), zone)
    }
}

/// Reads the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually driven clock for tests and simulations.
#[derive(Debug)]
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = instant;
    }

    /// Move the clock forward (or backward, with a negative duration).
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl ClockSource for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
