// tracker.rs — StreakTracker: derives per-day streak levels and badges.
//
// Storage layout in the key-value store:
//   streak/category/<day>  → "seed" | "sprout" | ...   (set once, atomically)
//   streak/day/<day>       → DayState JSON
//
// Success raises the level by one (capped at `max_level`); Failure lowers it
// by exactly one (floored at zero). A failure costs one level, not the
// whole streak. Badges are never removed once awarded.

use std::sync::{Arc, Mutex};

use dm_clock::{DayKey, ReferenceZone};
use dm_goal::{Goal, GoalId, GoalStatus};
use dm_store::json::{get_json, get_or_init_json, set_json};
use dm_store::KeyValueStore;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::badge::{Badge, BadgeCategory, DayState};
use crate::error::StreakError;

/// Hard ceiling for a day's streak level.
pub const MAX_LEVEL: u8 = 12;

/// Streak configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakConfig {
    /// Highest level a day's streak can reach, 1..=[`MAX_LEVEL`].
    #[serde(default = "default_max_level")]
    pub max_level: u8,
}

impl Default for StreakConfig {
    fn default() -> Self {
        Self {
            max_level: default_max_level(),
        }
    }
}

fn default_max_level() -> u8 {
    MAX_LEVEL
}

/// Tracks streak state per civil day.
pub struct StreakTracker {
    store: Arc<dyn KeyValueStore>,
    zone: ReferenceZone,
    config: StreakConfig,
    rng: Mutex<StdRng>,
}

impl StreakTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, zone: ReferenceZone, config: StreakConfig) -> Self {
        Self {
            store,
            zone,
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Use a seeded generator for the daily category draw.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn zone(&self) -> ReferenceZone {
        self.zone
    }

    /// The badge category for `day`, drawn on first use and fixed afterwards.
    ///
    /// The draw is written with a single atomic check-then-set, so two
    /// sessions racing on the first use of a day still agree on one value.
    pub fn category_for_day(&self, day: DayKey) -> Result<BadgeCategory, StreakError> {
        let key = category_key(day);
        if let Some(category) = get_json::<BadgeCategory>(self.store.as_ref(), &key)? {
            return Ok(category);
        }
        let drawn = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            BadgeCategory::ALL
                .choose(&mut *rng)
                .copied()
                .unwrap_or(BadgeCategory::Seed)
        };
        let category = get_or_init_json(self.store.as_ref(), &key, &drawn)?;
        tracing::debug!(day = %day, category = %category, "badge category fixed for day");
        Ok(category)
    }

    /// Persisted state for `day` (empty if nothing happened yet).
    pub fn day_state(&self, day: DayKey) -> Result<DayState, StreakError> {
        Ok(get_json(self.store.as_ref(), &day_key(day))?.unwrap_or_else(|| DayState::empty(day)))
    }

    pub fn level(&self, day: DayKey) -> Result<u8, StreakError> {
        Ok(self.day_state(day)?.level)
    }

    /// The badge a goal earned, if any.
    pub fn badge_for(&self, goal: &Goal) -> Result<Option<Badge>, StreakError> {
        Ok(self
            .day_state(goal.day(self.zone))?
            .badges
            .get(&goal.id)
            .copied())
    }

    /// The badge `on_success` would award `goal` right now, without
    /// recording it. Fixes the day's category if it was not drawn yet.
    pub fn preview_success(&self, goal: &Goal) -> Result<Badge, StreakError> {
        let mut state = self.day_state(goal.day(self.zone))?;
        self.apply_success(&mut state, goal.id)
    }

    /// Record a Success: raise the goal's day level and award a badge.
    pub fn on_success(&self, goal: &Goal) -> Result<Badge, StreakError> {
        let day = goal.day(self.zone);
        let mut state = self.day_state(day)?;
        let badge = self.apply_success(&mut state, goal.id)?;
        self.save(&state)?;
        tracing::info!(goal_id = %goal.id, day = %day, level = badge.level, "streak raised");
        Ok(badge)
    }

    /// Record a Failure: lower the goal's day level by one. Returns the new
    /// level.
    pub fn on_failure(&self, goal: &Goal) -> Result<u8, StreakError> {
        let day = goal.day(self.zone);
        let mut state = self.day_state(day)?;
        state.level = state.level.saturating_sub(1);
        self.save(&state)?;
        tracing::info!(goal_id = %goal.id, day = %day, level = state.level, "streak lowered");
        Ok(state.level)
    }

    /// Rebuild `day`'s level by replaying its terminal goals in chronological
    /// target order. Pending goals and goals of other days are skipped.
    /// Badges of replayed goals are rewritten; earlier badges of goals not in
    /// `goals` are kept. Idempotent for the same input.
    pub fn recompute(&self, day: DayKey, goals: &[Goal]) -> Result<DayState, StreakError> {
        let mut replay: Vec<&Goal> = goals
            .iter()
            .filter(|g| g.day(self.zone) == day && g.status.is_terminal())
            .collect();
        replay.sort_by(|a, b| a.target.cmp(&b.target).then(a.id.cmp(&b.id)));

        let mut state = self.day_state(day)?;
        state.level = 0;
        for goal in replay {
            match goal.status {
                GoalStatus::Success => {
                    self.apply_success(&mut state, goal.id)?;
                }
                GoalStatus::Failure => state.level = state.level.saturating_sub(1),
                GoalStatus::Pending => {}
            }
        }
        self.save(&state)?;
        tracing::debug!(day = %day, level = state.level, "streak recomputed");
        Ok(state)
    }

    fn apply_success(&self, state: &mut DayState, goal_id: GoalId) -> Result<Badge, StreakError> {
        let cap = self.config.max_level.clamp(1, MAX_LEVEL);
        state.level = state.level.saturating_add(1).min(cap);
        let badge = Badge {
            level: state.level,
            category: self.category_for_day(state.day)?,
        };
        state.badges.insert(goal_id, badge);
        Ok(badge)
    }

    fn save(&self, state: &DayState) -> Result<(), StreakError> {
        set_json(self.store.as_ref(), &day_key(state.day), state)?;
        Ok(())
    }
}

fn category_key(day: DayKey) -> String {
    format!("streak/category/{day}")
}

fn day_key(day: DayKey) -> String {
    format!("streak/day/{day}")
}
