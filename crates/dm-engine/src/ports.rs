// ports.rs — Outbound ports: the remote goal store and the notification
// gateway. Adapters live elsewhere (see `memory` for in-process ones).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dm_clock::DayKey;
use dm_goal::{Goal, GoalId, GoalPatch, NewGoal};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Authoritative goal persistence.
///
/// Implementations enforce uniqueness of (owner, target) and report a
/// violation as [`RemoteError::Conflict`].
#[async_trait]
pub trait RemoteGoalStore: Send + Sync {
    /// Insert all rows or none. Returns the assigned ids in row order.
    async fn create(&self, rows: Vec<NewGoal>) -> Result<Vec<GoalId>, RemoteError>;

    async fn update(&self, id: GoalId, patch: &GoalPatch) -> Result<(), RemoteError>;

    async fn delete(&self, id: GoalId) -> Result<(), RemoteError>;

    /// Goals of `owner` whose civil day lies in `[from, to]`.
    async fn list(&self, owner: &str, from: DayKey, to: DayKey)
        -> Result<Vec<Goal>, RemoteError>;
}

/// What a goal reminder shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub goal_id: GoalId,
    pub title: String,
    pub target: DateTime<Utc>,
}

/// Local reminder scheduling.
///
/// Both calls are best-effort from the engine's point of view: failures are
/// logged and never undo the mutation that triggered them.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn schedule(
        &self,
        id: GoalId,
        fire_at: DateTime<Utc>,
        payload: NotificationPayload,
    ) -> anyhow::Result<()>;

    /// Cancel a reminder. Cancelling an unknown id is not an error.
    async fn cancel(&self, id: GoalId) -> anyhow::Result<()>;
}
