// config.rs — Sync scheduler configuration (`[sync]` in daymark.toml).

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Minimum gap between two action-driven syncs while in the foreground.
    #[serde(default = "default_min_foreground_interval_ms")]
    pub min_foreground_interval_ms: u64,

    /// Period of the foreground ticker.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// A tick syncs even with an empty queue once this much time passed since
    /// the last successful sync.
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,

    /// Pending-action queue capacity; the oldest entry is dropped when full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How long a critical action waits for an in-flight sync.
    #[serde(default = "default_critical_wait_ms")]
    pub critical_wait_ms: u64,

    /// Poll period while waiting.
    #[serde(default = "default_critical_poll_ms")]
    pub critical_poll_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_foreground_interval_ms: default_min_foreground_interval_ms(),
            tick_interval_secs: default_tick_interval_secs(),
            max_idle_secs: default_max_idle_secs(),
            queue_capacity: default_queue_capacity(),
            critical_wait_ms: default_critical_wait_ms(),
            critical_poll_ms: default_critical_poll_ms(),
        }
    }
}

/// Upper bound for the interval and idle settings (one day).
const MAX_SECS: u64 = 24 * 60 * 60;

impl SyncConfig {
    pub fn min_foreground_interval(&self) -> chrono::Duration {
        let ms = self.min_foreground_interval_ms.min(MAX_SECS * 1_000);
        chrono::Duration::milliseconds(ms as i64)
    }

    pub fn max_idle(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_idle_secs.min(MAX_SECS) as i64)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.clamp(1, MAX_SECS))
    }

    pub fn critical_wait(&self) -> Duration {
        Duration::from_millis(self.critical_wait_ms)
    }

    pub fn critical_poll(&self) -> Duration {
        Duration::from_millis(self.critical_poll_ms.max(1))
    }

    /// Check every setting. Returns the offending field and why.
    pub fn check(&self) -> Result<(), (&'static str, String)> {
        if self.queue_capacity == 0 {
            return Err(("queue_capacity", "must be at least 1".to_string()));
        }
        if !(1..=MAX_SECS).contains(&self.tick_interval_secs) {
            return Err((
                "tick_interval_secs",
                format!("{} is outside 1..={MAX_SECS}", self.tick_interval_secs),
            ));
        }
        if self.max_idle_secs > MAX_SECS {
            return Err(("max_idle_secs", format!("{} exceeds {MAX_SECS}", self.max_idle_secs)));
        }
        if self.min_foreground_interval_ms > MAX_SECS * 1_000 {
            return Err((
                "min_foreground_interval_ms",
                format!("{} exceeds one day", self.min_foreground_interval_ms),
            ));
        }
        Ok(())
    }
}

// Serde default functions
fn default_min_foreground_interval_ms() -> u64 {
    3_000
}

fn default_tick_interval_secs() -> u64 {
    120
}

fn default_max_idle_secs() -> u64 {
    600
}

fn default_queue_capacity() -> usize {
    5
}

fn default_critical_wait_ms() -> u64 {
    500
}

fn default_critical_poll_ms() -> u64 {
    50
}
