// action.rs — Action kinds, the data domains they touch, and sync scopes.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A slice of remote data that can be refreshed on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDomain {
    Goals,
    Streaks,
    Reflections,
}

impl SyncDomain {
    pub const ALL: [SyncDomain; 3] = [
        SyncDomain::Goals,
        SyncDomain::Streaks,
        SyncDomain::Reflections,
    ];
}

impl fmt::Display for SyncDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDomain::Goals => write!(f, "goals"),
            SyncDomain::Streaks => write!(f, "streaks"),
            SyncDomain::Reflections => write!(f, "reflections"),
        }
    }
}

/// What the user (or a timer) just did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// A goal was created, edited or deleted.
    GoalMutation,
    /// A goal moved to Success or Failure.
    GoalTransition,
    /// A streak badge was awarded.
    BadgeAwarded,
    /// The end-of-day reflection was saved.
    ReflectionSaved,
}

impl ActionKind {
    pub fn domain(&self) -> SyncDomain {
        match self {
            ActionKind::GoalMutation | ActionKind::GoalTransition => SyncDomain::Goals,
            ActionKind::BadgeAwarded => SyncDomain::Streaks,
            ActionKind::ReflectionSaved => SyncDomain::Reflections,
        }
    }

    /// Critical actions wait briefly for an in-flight sync instead of being
    /// deferred to the next tick.
    pub fn is_critical(&self) -> bool {
        match self {
            ActionKind::GoalTransition | ActionKind::ReflectionSaved => true,
            ActionKind::GoalMutation | ActionKind::BadgeAwarded => false,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::GoalMutation => write!(f, "goal_mutation"),
            ActionKind::GoalTransition => write!(f, "goal_transition"),
            ActionKind::BadgeAwarded => write!(f, "badge_awarded"),
            ActionKind::ReflectionSaved => write!(f, "reflection_saved"),
        }
    }
}

/// An action waiting to be reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    /// Monotonic position in the queue, used to tell which actions a sync
    /// pass already covered.
    #[serde(default)]
    pub seq: u64,
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub queued_at: DateTime<Utc>,
}

/// The extent of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Every domain.
    Full,
    /// Only the listed domains.
    Selective(BTreeSet<SyncDomain>),
}

impl SyncScope {
    pub fn only(domain: SyncDomain) -> Self {
        SyncScope::Selective(BTreeSet::from([domain]))
    }

    /// The scope covering every domain touched by `actions`.
    pub fn for_actions<'a>(actions: impl IntoIterator<Item = &'a PendingAction>) -> Self {
        SyncScope::Selective(actions.into_iter().map(|a| a.kind.domain()).collect())
    }

    pub fn covers(&self, domain: SyncDomain) -> bool {
        match self {
            SyncScope::Full => true,
            SyncScope::Selective(domains) => domains.contains(&domain),
        }
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncScope::Full => write!(f, "full"),
            SyncScope::Selective(domains) => {
                let names: Vec<String> = domains.iter().map(|d| d.to_string()).collect();
                write!(f, "selective[{}]", names.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_domains() {
        assert_eq!(ActionKind::GoalMutation.domain(), SyncDomain::Goals);
        assert_eq!(ActionKind::GoalTransition.domain(), SyncDomain::Goals);
        assert_eq!(ActionKind::BadgeAwarded.domain(), SyncDomain::Streaks);
        assert_eq!(ActionKind::ReflectionSaved.domain(), SyncDomain::Reflections);
    }

    #[test]
    fn scope_for_actions_collects_domains() {
        let now = Utc::now();
        let actions = [
            PendingAction {
                seq: 0,
                kind: ActionKind::GoalMutation,
                detail: None,
                queued_at: now,
            },
            PendingAction {
                seq: 0,
                kind: ActionKind::BadgeAwarded,
                detail: None,
                queued_at: now,
            },
            PendingAction {
                seq: 0,
                kind: ActionKind::GoalTransition,
                detail: None,
                queued_at: now,
            },
        ];
        let scope = SyncScope::for_actions(&actions);
        assert!(scope.covers(SyncDomain::Streaks));
        assert!(scope.covers(SyncDomain::Goals));
        assert!(!scope.covers(SyncDomain::Reflections));
        assert!(SyncScope::Full.covers(SyncDomain::Reflections));
        assert_eq!(scope.to_string(), "selective[goals,streaks]");
    }

    #[test]
    fn pending_action_round_trip() {
        let action = PendingAction {
            seq: 3,
            kind: ActionKind::ReflectionSaved,
            detail: Some("2026-05-11".to_string()),
            queued_at: Utc::now(),
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"reflection_saved\""));
        let restored: PendingAction = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, action);
    }
}
