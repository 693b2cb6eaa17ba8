// badge.rs — Badge, the daily category enumeration, and per-day state.

use std::collections::BTreeMap;
use std::fmt;

use dm_clock::DayKey;
use dm_goal::GoalId;
use serde::{Deserialize, Serialize};

/// The reward icon family for a day. One is drawn per civil day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeCategory {
    Seed,
    Sprout,
    Leaf,
    Bloom,
    Fruit,
}

impl BadgeCategory {
    pub const ALL: [BadgeCategory; 5] = [
        BadgeCategory::Seed,
        BadgeCategory::Sprout,
        BadgeCategory::Leaf,
        BadgeCategory::Bloom,
        BadgeCategory::Fruit,
    ];
}

impl fmt::Display for BadgeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BadgeCategory::Seed => write!(f, "seed"),
            BadgeCategory::Sprout => write!(f, "sprout"),
            BadgeCategory::Leaf => write!(f, "leaf"),
            BadgeCategory::Bloom => write!(f, "bloom"),
            BadgeCategory::Fruit => write!(f, "fruit"),
        }
    }
}

/// A (level, category) pair rendered next to a succeeded goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub level: u8,
    pub category: BadgeCategory,
}

/// Streak state for one civil day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayState {
    pub day: DayKey,

    /// Current streak level (0 = no streak).
    pub level: u8,

    /// Badges earned by goals of this day, keyed by goal id.
    #[serde(default)]
    pub badges: BTreeMap<GoalId, Badge>,
}

impl DayState {
    pub fn empty(day: DayKey) -> Self {
        Self {
            day,
            level: 0,
            badges: BTreeMap::new(),
        }
    }
}
