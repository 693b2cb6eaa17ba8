// goal.rs — Goal: a time-boxed commitment and its status state machine.
//
// The state machine is deliberately small:
//   Pending → Success   (explicit confirmation inside the confirm window)
//   Pending → Failure   (expiration sweep)
// Success and Failure are terminal.

use std::fmt;

use chrono::{DateTime, Utc};
use dm_clock::{civil_day, DayKey, ReferenceZone};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GoalError;

/// Goal identifiers are random UUIDs assigned by the remote store.
pub type GoalId = Uuid;

/// The lifecycle status of a goal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    /// Created, waiting for confirmation or expiry.
    Pending,

    /// Confirmed by the user inside the confirm window.
    Success,

    /// Expired without confirmation.
    Failure,
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalStatus::Pending => write!(f, "pending"),
            GoalStatus::Success => write!(f, "success"),
            GoalStatus::Failure => write!(f, "failure"),
        }
    }
}

impl GoalStatus {
    /// Check whether moving from this status to `next` is valid.
    pub fn can_transition_to(&self, next: GoalStatus) -> bool {
        matches!(
            (self, next),
            (GoalStatus::Pending, GoalStatus::Success) | (GoalStatus::Pending, GoalStatus::Failure)
        )
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            GoalStatus::Pending => false,
            GoalStatus::Success | GoalStatus::Failure => true,
        }
    }
}

/// A goal owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Goal {
    pub id: GoalId,

    pub owner_id: String,

    /// Trimmed, non-empty, bounded length (see [`crate::RulesConfig`]).
    pub title: String,

    /// The instant the goal is due.
    #[serde(rename = "target_instant")]
    pub target: DateTime<Utc>,

    pub status: GoalStatus,

    /// Free-form note written when the goal is confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievement_note: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Goal {
    /// Build a Pending goal from a creation row and the id the store assigned.
    pub fn from_row(id: GoalId, row: &NewGoal, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id: row.owner_id.clone(),
            title: row.title.clone(),
            target: row.target,
            status: GoalStatus::Pending,
            achievement_note: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The civil day this goal belongs to.
    pub fn day(&self, zone: ReferenceZone) -> DayKey {
        civil_day(self.target, zone)
    }

    pub fn is_pending(&self) -> bool {
        self.status == GoalStatus::Pending
    }

    /// Transition to a new status. Returns an error if the transition is invalid.
    pub fn transition(&mut self, next: GoalStatus, at: DateTime<Utc>) -> Result<(), GoalError> {
        if !self.status.can_transition_to(next) {
            return Err(GoalError::InvalidTransition {
                goal_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }
}

/// A goal to be created. The store assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewGoal {
    pub owner_id: String,
    pub title: String,
    pub target: DateTime<Utc>,
}

/// A user edit of a Pending goal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoalEdit {
    pub title: Option<String>,
    pub target: Option<DateTime<Utc>>,
}

impl GoalEdit {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            target: None,
        }
    }

    pub fn target(target: DateTime<Utc>) -> Self {
        Self {
            title: None,
            target: Some(target),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.target.is_none()
    }
}

/// A partial update sent to the remote store. `None` fields are untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GoalPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<GoalStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievement_note: Option<String>,
}

impl GoalPatch {
    pub fn status(status: GoalStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Apply the set fields to `goal` without state-machine checks. Callers
    /// validate transitions before building the patch.
    pub fn apply_to(&self, goal: &mut Goal, at: DateTime<Utc>) {
        if let Some(title) = &self.title {
            goal.title = title.clone();
        }
        if let Some(target) = self.target {
            goal.target = target;
        }
        if let Some(status) = self.status {
            goal.status = status;
        }
        if let Some(note) = &self.achievement_note {
            goal.achievement_note = Some(note.clone());
        }
        goal.updated_at = at;
    }
}

impl From<&GoalEdit> for GoalPatch {
    fn from(edit: &GoalEdit) -> Self {
        Self {
            title: edit.title.clone(),
            target: edit.target,
            ..Self::default()
        }
    }
}
