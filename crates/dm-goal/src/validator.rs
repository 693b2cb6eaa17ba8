// validator.rs — Admission rules for candidate goals.
//
// `validate()` checks one candidate against the owner's existing goals:
//
// 1. Is the target at 00:00 local? → MidnightTarget (caller must normalize)
// 2. Is the target on a past civil day? → PastDay
// 3. Is it on today's civil day and earlier than now + lead time? → LeadTime
//    (later civil days are exempt)
// 4. Is any existing goal (any status, minus `exclude_id`) closer than the
//    buffer by absolute time difference? → Overlap, naming that goal
//
// Overlap uses the absolute difference rather than grouping by day so that
// 23:50 and 00:10 on the next day still collide. Checks fail fast: the first
// violation found is returned.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dm_clock::{civil_day, is_local_midnight, DayKey, ReferenceZone};

use crate::error::{GoalRef, ValidationError};
use crate::goal::{Goal, GoalId};
use crate::rules::ValidationOptions;

/// A target instant to admit, optionally replacing an existing goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub target: DateTime<Utc>,
    /// Ignore this goal during the overlap scan (used when editing it).
    pub exclude_id: Option<GoalId>,
}

impl Candidate {
    pub fn new(target: DateTime<Utc>) -> Self {
        Self {
            target,
            exclude_id: None,
        }
    }

    pub fn replacing(target: DateTime<Utc>, id: GoalId) -> Self {
        Self {
            target,
            exclude_id: Some(id),
        }
    }
}

/// Validate one candidate against existing goals.
pub fn validate(
    candidate: &Candidate,
    existing: &[Goal],
    opts: &ValidationOptions,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    check_timing(candidate.target, opts, now)?;

    let conflict = existing
        .iter()
        .filter(|g| Some(g.id) != candidate.exclude_id)
        .find(|g| (candidate.target - g.target).abs() < opts.buffer);

    match conflict {
        Some(g) => Err(ValidationError::Overlap {
            target: candidate.target,
            conflicting: GoalRef {
                id: g.id,
                target: g.target,
                title: g.title.clone(),
            },
        }),
        None => Ok(()),
    }
}

/// Validate a batch of new targets: each against the existing goals, then
/// every pair within the batch. O(n²) in the batch size, which is capped.
pub fn validate_batch(
    targets: &[DateTime<Utc>],
    existing: &[Goal],
    opts: &ValidationOptions,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    if targets.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }
    for (i, target) in targets.iter().enumerate() {
        validate(&Candidate::new(*target), existing, opts, now)?;
        for (j, earlier) in targets[..i].iter().enumerate() {
            if (*target - *earlier).abs() < opts.buffer {
                return Err(ValidationError::BatchOverlap {
                    first: j,
                    second: i,
                    at: *target,
                });
            }
        }
    }
    Ok(())
}

/// Timing rules that do not depend on other goals.
fn check_timing(
    target: DateTime<Utc>,
    opts: &ValidationOptions,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    if is_local_midnight(target, opts.zone) {
        return Err(ValidationError::MidnightTarget { target });
    }

    let day = civil_day(target, opts.zone);
    let today = civil_day(now, opts.zone);
    if day < today {
        return Err(ValidationError::PastDay { target });
    }

    if day == today && !opts.skip_lead_time {
        let earliest = now + opts.lead_time;
        if target < earliest {
            return Err(ValidationError::LeadTime { target, earliest });
        }
    }
    Ok(())
}

/// Count goals per civil day.
pub fn goals_per_day<'a>(
    goals: impl IntoIterator<Item = &'a Goal>,
    zone: ReferenceZone,
) -> HashMap<DayKey, usize> {
    let mut counts = HashMap::new();
    for goal in goals {
        *counts.entry(goal.day(zone)).or_insert(0) += 1;
    }
    counts
}

/// Reject adding `adding` goals on `day` when that would exceed `cap`.
pub fn check_daily_cap(
    day: DayKey,
    existing_on_day: usize,
    adding: usize,
    cap: usize,
) -> Result<(), ValidationError> {
    if existing_on_day + adding > cap {
        return Err(ValidationError::DailyCap { day, limit: cap });
    }
    Ok(())
}

/// Reject a deletion that would take a day which has reached `floor` goals
/// below it. Days that never reached the floor are unconstrained.
pub fn check_delete_floor(
    day: DayKey,
    count_on_day: usize,
    floor: usize,
) -> Result<(), ValidationError> {
    if floor > 0 && count_on_day == floor {
        return Err(ValidationError::MinCardinality {
            day,
            count: count_on_day,
            floor,
        });
    }
    Ok(())
}

/// Trim and bound a title.
pub fn validate_title(title: &str, max_chars: usize) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    let len = trimmed.chars().count();
    if len > max_chars {
        return Err(ValidationError::TitleTooLong {
            len,
            max: max_chars,
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::{GoalStatus, NewGoal};
    use crate::rules::RulesConfig;
    use chrono::TimeZone;
    use uuid::Uuid;

    // All tests run in UTC so wall-clock times read directly.
    fn opts() -> ValidationOptions {
        RulesConfig {
            zone: ReferenceZone::utc(),
            ..RulesConfig::default()
        }
        .validation_options()
    }

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, day, h, m, 0).unwrap()
    }

    fn goal_at(target: DateTime<Utc>) -> Goal {
        let row = NewGoal {
            owner_id: "user-1".to_string(),
            title: format!("goal {}", target.format("%H:%M")),
            target,
        };
        Goal::from_row(Uuid::new_v4(), &row, at(1, 0, 1))
    }

    #[test]
    fn overlap_inside_buffer_is_rejected_and_names_conflict() {
        let now = at(10, 1, 0);
        let existing = vec![goal_at(at(11, 9, 0))];
        let err = validate(&Candidate::new(at(11, 9, 25)), &existing, &opts(), now).unwrap_err();
        match err {
            ValidationError::Overlap { conflicting, .. } => {
                assert_eq!(conflicting.id, existing[0].id);
                assert_eq!(conflicting.target, at(11, 9, 0));
            }
            other => panic!("expected overlap, got {other:?}"),
        }
    }

    #[test]
    fn exactly_buffer_apart_is_accepted() {
        let now = at(10, 1, 0);
        let existing = vec![goal_at(at(11, 9, 0))];
        assert!(validate(&Candidate::new(at(11, 9, 30)), &existing, &opts(), now).is_ok());
        assert!(validate(&Candidate::new(at(11, 8, 30)), &existing, &opts(), now).is_ok());
    }

    #[test]
    fn overlap_is_symmetric_in_insertion_order() {
        let now = at(10, 1, 0);
        let a = at(11, 9, 0);
        let b = at(11, 9, 20);
        assert!(validate(&Candidate::new(b), &[goal_at(a)], &opts(), now).is_err());
        assert!(validate(&Candidate::new(a), &[goal_at(b)], &opts(), now).is_err());
    }

    #[test]
    fn overlap_spans_midnight() {
        let now = at(10, 1, 0);
        let existing = vec![goal_at(at(11, 23, 50))];
        let err = validate(&Candidate::new(at(12, 0, 10)), &existing, &opts(), now).unwrap_err();
        assert!(matches!(err, ValidationError::Overlap { .. }));
    }

    #[test]
    fn failed_goals_still_block_the_buffer() {
        let now = at(10, 1, 0);
        let mut failed = goal_at(at(11, 9, 0));
        failed.status = GoalStatus::Failure;
        assert!(validate(&Candidate::new(at(11, 9, 10)), &[failed], &opts(), now).is_err());
    }

    #[test]
    fn excluded_goal_does_not_conflict_with_itself() {
        let now = at(10, 1, 0);
        let existing = vec![goal_at(at(11, 9, 0))];
        let candidate = Candidate::replacing(at(11, 9, 15), existing[0].id);
        assert!(validate(&candidate, &existing, &opts(), now).is_ok());
    }

    #[test]
    fn same_day_requires_lead_time() {
        let now = at(10, 8, 0);
        let err = validate(&Candidate::new(at(10, 10, 30)), &[], &opts(), now).unwrap_err();
        match err {
            ValidationError::LeadTime { earliest, .. } => assert_eq!(earliest, at(10, 11, 0)),
            other => panic!("expected lead time, got {other:?}"),
        }
        assert!(validate(&Candidate::new(at(10, 11, 0)), &[], &opts(), now).is_ok());
    }

    #[test]
    fn next_day_is_exempt_from_lead_time() {
        let now = at(10, 23, 0);
        assert!(validate(&Candidate::new(at(11, 0, 30)), &[], &opts(), now).is_ok());
    }

    #[test]
    fn skip_flag_exempts_today() {
        let now = at(10, 8, 0);
        let opts = ValidationOptions {
            skip_lead_time: true,
            ..opts()
        };
        assert!(validate(&Candidate::new(at(10, 8, 30)), &[], &opts, now).is_ok());
    }

    #[test]
    fn midnight_and_past_days_are_invalid() {
        let now = at(10, 8, 0);
        assert!(matches!(
            validate(&Candidate::new(at(11, 0, 0)), &[], &opts(), now),
            Err(ValidationError::MidnightTarget { .. })
        ));
        assert!(matches!(
            validate(&Candidate::new(at(9, 12, 0)), &[], &opts(), now),
            Err(ValidationError::PastDay { .. })
        ));
    }

    #[test]
    fn batch_checks_pairs_within_itself() {
        let now = at(10, 1, 0);
        let rows = [at(11, 9, 0), at(11, 12, 0), at(11, 9, 20)];
        match validate_batch(&rows, &[], &opts(), now).unwrap_err() {
            ValidationError::BatchOverlap { first, second, .. } => {
                assert_eq!((first, second), (0, 2));
            }
            other => panic!("expected batch overlap, got {other:?}"),
        }
        assert!(validate_batch(&[at(11, 9, 0), at(11, 9, 30)], &[], &opts(), now).is_ok());
    }

    #[test]
    fn batch_checks_against_existing() {
        let now = at(10, 1, 0);
        let existing = vec![goal_at(at(11, 14, 0))];
        let rows = [at(11, 9, 0), at(11, 14, 10)];
        assert!(matches!(
            validate_batch(&rows, &existing, &opts(), now),
            Err(ValidationError::Overlap { .. })
        ));
        assert_eq!(
            validate_batch(&[], &existing, &opts(), now),
            Err(ValidationError::EmptyBatch)
        );
    }

    #[test]
    fn daily_cap() {
        let day = DayKey::from_ymd(2026, 5, 11).unwrap();
        assert!(check_daily_cap(day, 17, 1, 18).is_ok());
        assert!(matches!(
            check_daily_cap(day, 18, 1, 18),
            Err(ValidationError::DailyCap { limit: 18, .. })
        ));
        assert!(check_daily_cap(day, 15, 4, 18).is_err());
    }

    #[test]
    fn delete_floor_only_binds_days_that_reached_it() {
        let day = DayKey::from_ymd(2026, 5, 11).unwrap();
        assert!(check_delete_floor(day, 6, 5).is_ok());
        assert!(matches!(
            check_delete_floor(day, 5, 5),
            Err(ValidationError::MinCardinality { count: 5, .. })
        ));
        assert!(check_delete_floor(day, 3, 5).is_ok());
        assert!(check_delete_floor(day, 1, 5).is_ok());
    }

    #[test]
    fn per_day_counts() {
        let goals = vec![
            goal_at(at(11, 9, 0)),
            goal_at(at(11, 10, 0)),
            goal_at(at(12, 9, 0)),
        ];
        let counts = goals_per_day(&goals, ReferenceZone::utc());
        assert_eq!(counts[&DayKey::from_ymd(2026, 5, 11).unwrap()], 2);
        assert_eq!(counts[&DayKey::from_ymd(2026, 5, 12).unwrap()], 1);
    }

    #[test]
    fn titles_are_trimmed_and_bounded() {
        assert_eq!(validate_title("  Read  ", 10).unwrap(), "Read");
        assert_eq!(validate_title("   ", 10), Err(ValidationError::EmptyTitle));
        assert!(matches!(
            validate_title(&"x".repeat(11), 10),
            Err(ValidationError::TitleTooLong { len: 11, max: 10 })
        ));
    }
}
