//! # dm-streak
//!
//! Per-day success streaks and the once-daily badge category for Daymark.
//!
//! Each civil day has a [`DayState`]: a streak level that rises by one with
//! every confirmed goal (capped) and drops by one with every expired goal
//! (floored at zero), plus the [`Badge`] each succeeded goal earned. The
//! badge category is drawn once per day and then fixed.
//!
//! State lives behind the [`dm_store::KeyValueStore`] port, so it survives
//! a restart and there are no process-wide caches.

pub mod badge;
pub mod error;
pub mod tracker;

pub use badge::{Badge, BadgeCategory, DayState};
pub use error::StreakError;
pub use tracker::{StreakConfig, StreakTracker, MAX_LEVEL};
