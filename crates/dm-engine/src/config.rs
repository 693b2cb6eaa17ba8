// config.rs — daymark.toml: every tunable of the engine in one file.
//
// ```toml
// [rules]
// lead_time_minutes = 180
// utc_offset_minutes = 540
//
// [streak]
// max_level = 12
//
// [sweep]
// interval_secs = 60
//
// [sync]
// min_foreground_interval_ms = 3000
// ```
//
// Every section and field is optional.

use std::path::Path;
use std::time::Duration;

use dm_goal::RulesConfig;
use dm_streak::{StreakConfig, MAX_LEVEL};
use dm_sync::SyncConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaymarkConfig {
    #[serde(default)]
    pub rules: RulesConfig,

    #[serde(default)]
    pub streak: StreakConfig,

    #[serde(default)]
    pub sweep: SweepConfig,

    #[serde(default)]
    pub sync: SyncConfig,
}

/// Expiration sweep timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Period of the background sweep while a session is open.
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl DaymarkConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but break the rules they configure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |section: &str, (field, reason): (&str, String)| ConfigError::Invalid {
            field: format!("{section}.{field}"),
            reason,
        };
        self.rules.check().map_err(|e| invalid("rules", e))?;
        self.sync.check().map_err(|e| invalid("sync", e))?;
        if !(1..=MAX_LEVEL).contains(&self.streak.max_level) {
            return Err(invalid(
                "streak",
                (
                    "max_level",
                    format!("{} is outside 1..={MAX_LEVEL}", self.streak.max_level),
                ),
            ));
        }
        if self.sweep.interval_secs == 0 {
            return Err(invalid(
                "sweep",
                ("interval_secs", "must be at least 1".to_string()),
            ));
        }
        Ok(())
    }

    /// Load config, falling back to defaults when the file is missing,
    /// unreadable or out of range.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("using default config: {}", e);
            Self::default()
        })
    }
}
