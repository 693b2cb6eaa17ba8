// error.rs — Errors at the engine's outer seams: configuration and the
// remote store port.

use chrono::{DateTime, Utc};
use dm_goal::{GoalError, GoalId};
use thiserror::Error;

/// Failures loading daymark.toml.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ParseError {
        path: String,
        source: toml::de::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Errors reported by a [`crate::ports::RemoteGoalStore`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Uniqueness on (owner, target) was violated server-side.
    #[error("conflict: a goal at {target} already exists")]
    Conflict { target: DateTime<Utc> },

    #[error("goal not found: {0}")]
    NotFound(GoalId),

    /// Transport or server failure.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<RemoteError> for GoalError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Conflict { target } => GoalError::Conflict { target },
            RemoteError::NotFound(id) => GoalError::NotFound(id),
            RemoteError::Unavailable(msg) => GoalError::StoreUnavailable(msg),
        }
    }
}
