// error.rs — Error types for clock and civil-day parsing.

use thiserror::Error;

/// Errors raised while building zones or parsing day keys.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    /// The UTC offset is outside the ±24h range chrono accepts.
    #[error("invalid UTC offset: {0} minutes")]
    InvalidOffset(i32),

    /// A day key string is not a `YYYY-MM-DD` date.
    #[error("invalid day key: {0}")]
    InvalidDayKey(String),
}
