// window.rs — Time windows that gate edits, confirmation and expiry.
//
// All three are pure functions of (goal, now, rules) so the engine, the
// presentation layer and tests agree on one definition.

use chrono::{DateTime, Utc};
use dm_clock::{civil_day, is_today};

use crate::error::ValidationError;
use crate::goal::Goal;
use crate::rules::RulesConfig;

/// Whether a goal's title/target may still be edited.
///
/// - later civil days: always
/// - today: only before the end-of-day reflection is recorded and while the
///   target is more than `edit_cutoff` away
/// - past days: never
pub fn editable_window(
    goal: &Goal,
    reflection_done_today: bool,
    now: DateTime<Utc>,
    rules: &RulesConfig,
) -> bool {
    let day = goal.day(rules.zone);
    let today = civil_day(now, rules.zone);
    if day > today {
        true
    } else if day == today {
        !reflection_done_today && goal.target - now > rules.edit_cutoff()
    } else {
        false
    }
}

/// Check that `now` lies in `[target - w, target + w]` on the goal's own
/// civil day.
pub fn check_confirm_window(
    goal: &Goal,
    now: DateTime<Utc>,
    rules: &RulesConfig,
) -> Result<(), ValidationError> {
    let opens = goal.target - rules.confirm_window();
    let closes = goal.target + rules.confirm_window();
    let today = is_today(goal.target, now, rules.zone);
    if today && now >= opens && now <= closes {
        Ok(())
    } else {
        Err(ValidationError::OutsideConfirmWindow {
            id: goal.id,
            opens,
            closes,
        })
    }
}

/// Whether a Pending goal is overdue and should be swept to Failure.
///
/// Overdue means more than the grace period past the target, or more than
/// the catch-all horizon past it (covers sweeps missed across a day
/// boundary when the grace is configured long).
pub fn is_expired(goal: &Goal, now: DateTime<Utc>, rules: &RulesConfig) -> bool {
    if !goal.is_pending() {
        return false;
    }
    let elapsed = now - goal.target;
    elapsed > rules.expiry_grace() || elapsed > rules.expiry_catch_all()
}
