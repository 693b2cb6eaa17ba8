// rules.rs — Thresholds used by goal admission and lifecycle windows.
//
// Every field has a serde default so a `[rules]` table in daymark.toml only
// needs to list what it overrides.

use chrono::Duration;
use dm_clock::ReferenceZone;
use serde::{Deserialize, Serialize};

/// Upper bound for every minute-valued rule (one week).
pub const MAX_RULE_MINUTES: i64 = 7 * 24 * 60;

/// Upper bound for the catch-all expiry, in hours (one week).
pub const MAX_CATCH_ALL_HOURS: i64 = 7 * 24;

/// Goal admission and lifecycle rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Minimum gap between now and a same-day target.
    #[serde(default = "default_lead_time_minutes")]
    pub lead_time_minutes: i64,

    /// Minimum gap between any two targets of one owner.
    #[serde(default = "default_buffer_minutes")]
    pub buffer_minutes: i64,

    /// Maximum goals on one civil day.
    #[serde(default = "default_max_goals_per_day")]
    pub max_goals_per_day: usize,

    /// Once a day holds this many goals, deletion may not go below it.
    #[serde(default = "default_min_goals_floor")]
    pub min_goals_floor: usize,

    /// Half-width of the confirmation window around the target.
    #[serde(default = "default_confirm_window_minutes")]
    pub confirm_window_minutes: i64,

    /// A Pending goal this far past its target is swept to Failure.
    #[serde(default = "default_expiry_grace_minutes")]
    pub expiry_grace_minutes: i64,

    /// Catch-all expiry for goals missed across a day boundary.
    #[serde(default = "default_expiry_catch_all_hours")]
    pub expiry_catch_all_hours: i64,

    /// Today's goals stop being editable this close to their target.
    #[serde(default = "default_edit_cutoff_minutes")]
    pub edit_cutoff_minutes: i64,

    #[serde(default = "default_max_title_chars")]
    pub max_title_chars: usize,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Reference zone for civil days, in minutes east of UTC.
    #[serde(default, rename = "utc_offset_minutes")]
    pub zone: ReferenceZone,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            lead_time_minutes: default_lead_time_minutes(),
            buffer_minutes: default_buffer_minutes(),
            max_goals_per_day: default_max_goals_per_day(),
            min_goals_floor: default_min_goals_floor(),
            confirm_window_minutes: default_confirm_window_minutes(),
            expiry_grace_minutes: default_expiry_grace_minutes(),
            expiry_catch_all_hours: default_expiry_catch_all_hours(),
            edit_cutoff_minutes: default_edit_cutoff_minutes(),
            max_title_chars: default_max_title_chars(),
            max_batch_size: default_max_batch_size(),
            zone: ReferenceZone::default(),
        }
    }
}

impl RulesConfig {
    // Out-of-range values are clamped so a hand-built config can never
    // overflow chrono; `DaymarkConfig::validate` rejects them at load time.

    pub fn lead_time(&self) -> Duration {
        minutes(self.lead_time_minutes)
    }

    pub fn buffer(&self) -> Duration {
        minutes(self.buffer_minutes)
    }

    pub fn confirm_window(&self) -> Duration {
        minutes(self.confirm_window_minutes)
    }

    pub fn expiry_grace(&self) -> Duration {
        minutes(self.expiry_grace_minutes)
    }

    pub fn expiry_catch_all(&self) -> Duration {
        Duration::hours(self.expiry_catch_all_hours.clamp(1, MAX_CATCH_ALL_HOURS))
    }

    pub fn edit_cutoff(&self) -> Duration {
        minutes(self.edit_cutoff_minutes)
    }

    /// Check every threshold. Returns the offending field and why.
    pub fn check(&self) -> Result<(), (&'static str, String)> {
        let minute_fields = [
            ("lead_time_minutes", self.lead_time_minutes),
            ("buffer_minutes", self.buffer_minutes),
            ("confirm_window_minutes", self.confirm_window_minutes),
            ("expiry_grace_minutes", self.expiry_grace_minutes),
            ("edit_cutoff_minutes", self.edit_cutoff_minutes),
        ];
        for (field, value) in minute_fields {
            if !(0..=MAX_RULE_MINUTES).contains(&value) {
                return Err((field, format!("{value} is outside 0..={MAX_RULE_MINUTES}")));
            }
        }
        if !(1..=MAX_CATCH_ALL_HOURS).contains(&self.expiry_catch_all_hours) {
            return Err((
                "expiry_catch_all_hours",
                format!(
                    "{} is outside 1..={MAX_CATCH_ALL_HOURS}",
                    self.expiry_catch_all_hours
                ),
            ));
        }
        if self.max_goals_per_day == 0 {
            return Err(("max_goals_per_day", "must be at least 1".to_string()));
        }
        if self.min_goals_floor > self.max_goals_per_day {
            return Err((
                "min_goals_floor",
                format!(
                    "{} exceeds max_goals_per_day ({})",
                    self.min_goals_floor, self.max_goals_per_day
                ),
            ));
        }
        if self.max_title_chars == 0 {
            return Err(("max_title_chars", "must be at least 1".to_string()));
        }
        if self.max_batch_size == 0 {
            return Err(("max_batch_size", "must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Options for the conflict validator.
    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            lead_time: self.lead_time(),
            buffer: self.buffer(),
            zone: self.zone,
            skip_lead_time: false,
        }
    }
}

/// Inputs to [`crate::validator::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOptions {
    pub lead_time: Duration,
    pub buffer: Duration,
    pub zone: ReferenceZone,
    /// Exempt the candidate from the same-day lead-time rule.
    pub skip_lead_time: bool,
}

fn minutes(value: i64) -> Duration {
    Duration::minutes(value.clamp(0, MAX_RULE_MINUTES))
}

// Serde default functions
fn default_lead_time_minutes() -> i64 {
    180
}

fn default_buffer_minutes() -> i64 {
    30
}

fn default_max_goals_per_day() -> usize {
    18
}

fn default_min_goals_floor() -> usize {
    5
}

fn default_confirm_window_minutes() -> i64 {
    5
}

fn default_expiry_grace_minutes() -> i64 {
    5
}

fn default_expiry_catch_all_hours() -> i64 {
    24
}

fn default_edit_cutoff_minutes() -> i64 {
    180
}

fn default_max_title_chars() -> usize {
    100
}

fn default_max_batch_size() -> usize {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let rules: RulesConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(rules, RulesConfig::default());
        assert_eq!(rules.lead_time(), Duration::hours(3));
        assert_eq!(rules.buffer(), Duration::minutes(30));
        assert_eq!(rules.max_goals_per_day, 18);
        assert_eq!(rules.min_goals_floor, 5);
    }

    #[test]
    fn zone_reads_offset_minutes() {
        let rules: RulesConfig = serde_json::from_str(r#"{"utc_offset_minutes": 0}"#).unwrap();
        assert_eq!(rules.zone, ReferenceZone::utc());
        assert_eq!(rules.validation_options().zone, ReferenceZone::utc());
    }

    #[test]
    fn defaults_pass_check() {
        assert_eq!(RulesConfig::default().check(), Ok(()));
    }

    #[test]
    fn check_names_the_bad_field() {
        let rules = RulesConfig {
            buffer_minutes: -30,
            ..RulesConfig::default()
        };
        assert_eq!(rules.check().unwrap_err().0, "buffer_minutes");

        let rules = RulesConfig {
            min_goals_floor: 20,
            ..RulesConfig::default()
        };
        assert_eq!(rules.check().unwrap_err().0, "min_goals_floor");

        let rules = RulesConfig {
            expiry_catch_all_hours: 0,
            ..RulesConfig::default()
        };
        assert_eq!(rules.check().unwrap_err().0, "expiry_catch_all_hours");
    }

    #[test]
    fn huge_values_clamp_instead_of_overflowing() {
        let rules = RulesConfig {
            lead_time_minutes: i64::MAX,
            buffer_minutes: i64::MIN,
            expiry_catch_all_hours: i64::MAX,
            ..RulesConfig::default()
        };
        assert_eq!(rules.lead_time(), Duration::minutes(MAX_RULE_MINUTES));
        assert_eq!(rules.buffer(), Duration::zero());
        assert_eq!(rules.expiry_catch_all(), Duration::hours(MAX_CATCH_ALL_HOURS));
    }
}
