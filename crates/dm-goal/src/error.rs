// error.rs — Error types for the goal lifecycle subsystem.
//
// ValidationError is bad input: surfaced synchronously, never retried.
// GoalError wraps it together with store and state-machine failures so the
// mutating entry points return one typed error.

use chrono::{DateTime, Utc};
use dm_clock::DayKey;
use serde::Serialize;
use thiserror::Error;

use crate::goal::{GoalId, GoalStatus};

/// Identifies the goal a rejection collided with, for an actionable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GoalRef {
    pub id: GoalId,
    pub target: DateTime<Utc>,
    pub title: String,
}

/// Why a candidate goal, edit, deletion or confirmation was refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Same-day goals need a minimum lead time.
    #[error("goal at {target} is too soon; same-day goals must be at or after {earliest}")]
    LeadTime {
        target: DateTime<Utc>,
        earliest: DateTime<Utc>,
    },

    /// Another goal sits inside the buffer around the candidate.
    #[error("goal at {target} overlaps goal {} at {}", .conflicting.id, .conflicting.target)]
    Overlap {
        target: DateTime<Utc>,
        conflicting: GoalRef,
    },

    /// Two rows of the same batch sit inside the buffer of each other.
    #[error("batch rows {first} and {second} are closer than the buffer ({at})")]
    BatchOverlap {
        first: usize,
        second: usize,
        at: DateTime<Utc>,
    },

    /// The civil day is already full.
    #[error("{day} already has the maximum of {limit} goals")]
    DailyCap { day: DayKey, limit: usize },

    /// Deleting would take a day that reached the floor below it.
    #[error("{day} has {count} goals and cannot drop below {floor}")]
    MinCardinality {
        day: DayKey,
        count: usize,
        floor: usize,
    },

    /// Midnight targets must be normalized by the caller.
    #[error("goal at {target} falls on local midnight; normalize it first")]
    MidnightTarget { target: DateTime<Utc> },

    /// The candidate's civil day is already over.
    #[error("goal at {target} is on a past day")]
    PastDay { target: DateTime<Utc> },

    #[error("title must not be empty")]
    EmptyTitle,

    #[error("title is {len} characters; the limit is {max}")]
    TitleTooLong { len: usize, max: usize },

    #[error("batch of {len} rows exceeds the limit of {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("batch is empty")]
    EmptyBatch,

    /// The goal is outside its editable window.
    #[error("goal {id} can no longer be edited")]
    NotEditable { id: GoalId },

    /// Confirmation attempted outside `[target - w, target + w]` or not today.
    #[error("goal {id} can only be confirmed between {opens} and {closes} on its own day")]
    OutsideConfirmWindow {
        id: GoalId,
        opens: DateTime<Utc>,
        closes: DateTime<Utc>,
    },

    #[error("edit changes nothing")]
    EmptyEdit,
}

/// Errors returned by goal lifecycle operations.
#[derive(Debug, Error)]
pub enum GoalError {
    /// The request was rejected by the admission rules.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The remote store reported a uniqueness violation on (owner, target).
    #[error("a goal at {target} already exists in the remote store")]
    Conflict { target: DateTime<Utc> },

    /// The requested goal was not found.
    #[error("goal not found: {0}")]
    NotFound(GoalId),

    /// Invalid status transition.
    #[error("invalid transition from {from} to {to} for goal {goal_id}")]
    InvalidTransition {
        goal_id: GoalId,
        from: GoalStatus,
        to: GoalStatus,
    },

    /// The remote store could not be reached or failed server-side.
    #[error("remote store unavailable: {0}")]
    StoreUnavailable(String),

    /// The session was torn down while the call was in flight.
    #[error("session closed")]
    SessionClosed,

    /// A file I/O operation failed (event log sinks).
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize goal data.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl GoalError {
    /// Whether this error reflects bad input rather than infrastructure.
    /// Store-level conflicts are reported in the same category.
    pub fn is_validation(&self) -> bool {
        matches!(self, GoalError::Validation(_) | GoalError::Conflict { .. })
    }

    /// The validation reason, if any.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            GoalError::Validation(v) => Some(v),
            _ => None,
        }
    }
}
