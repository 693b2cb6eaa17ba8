//! # dm-clock
//!
//! Clock source and civil-day utilities for Daymark.
//!
//! Goals are bucketed into calendar days computed in one fixed reference
//! zone, independent of the device locale. Everything in this crate is pure
//! except [`SystemClock`], which reads the wall clock.
//!
//! ## Key components
//!
//! - [`ClockSource`] — injectable "now" ([`SystemClock`], [`FakeClock`])
//! - [`ReferenceZone`] — the fixed offset that defines civil days
//! - [`DayKey`] — a civil day, displayed as `YYYY-MM-DD`

pub mod clock;
pub mod day;
pub mod error;

pub use clock::{ClockSource, FakeClock, SystemClock};
pub use day::{
    civil_day, day_bounds, is_local_midnight, is_today, local_time, normalize_midnight, DayKey,
    ReferenceZone,
};
pub use error::ClockError;
