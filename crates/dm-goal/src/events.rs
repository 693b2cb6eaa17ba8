// events.rs — Goal lifecycle events, sink dispatch, and the day journal.
//
// The engine emits an event after every committed mutation. Sinks (the day
// journal, an analytics forwarder, a test recorder) subscribe to them.
// Sinks observe only: a failing sink is logged and never affects the
// mutation that produced the event.
//
// DayJournal files events under the civil day they happened on:
//   <dir>/2026-05-11.jsonl
// so one day's history can be replayed without scanning the rest.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dm_clock::{civil_day, DayKey, ReferenceZone};
use serde::{Deserialize, Serialize};

use crate::error::GoalError;
use crate::goal::{Goal, GoalId, GoalStatus};

/// Events emitted at goal lifecycle points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GoalEvent {
    GoalCreated {
        goal_id: GoalId,
        title: String,
        target: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    GoalEdited {
        goal_id: GoalId,
        title: String,
        target: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    GoalDeleted {
        goal_id: GoalId,
        timestamp: DateTime<Utc>,
    },

    GoalStateChanged {
        goal_id: GoalId,
        from_state: GoalStatus,
        to_state: GoalStatus,
        timestamp: DateTime<Utc>,
    },

    /// A streak badge was attached to a goal that succeeded.
    BadgeAwarded {
        goal_id: GoalId,
        level: u8,
        category: String,
        timestamp: DateTime<Utc>,
    },

    /// The end-of-day reflection was recorded.
    ReflectionRecorded {
        day: String,
        timestamp: DateTime<Utc>,
    },
}

impl GoalEvent {
    /// Get the event type name as a string.
    pub fn event_type(&self) -> &str {
        match self {
            GoalEvent::GoalCreated { .. } => "goal_created",
            GoalEvent::GoalEdited { .. } => "goal_edited",
            GoalEvent::GoalDeleted { .. } => "goal_deleted",
            GoalEvent::GoalStateChanged { .. } => "goal_state_changed",
            GoalEvent::BadgeAwarded { .. } => "badge_awarded",
            GoalEvent::ReflectionRecorded { .. } => "reflection_recorded",
        }
    }

    /// When the event happened.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            GoalEvent::GoalCreated { timestamp, .. }
            | GoalEvent::GoalEdited { timestamp, .. }
            | GoalEvent::GoalDeleted { timestamp, .. }
            | GoalEvent::GoalStateChanged { timestamp, .. }
            | GoalEvent::BadgeAwarded { timestamp, .. }
            | GoalEvent::ReflectionRecorded { timestamp, .. } => *timestamp,
        }
    }

    /// The goal the event is about. Reflections belong to a day, not a goal.
    pub fn goal_id(&self) -> Option<GoalId> {
        match self {
            GoalEvent::GoalCreated { goal_id, .. }
            | GoalEvent::GoalEdited { goal_id, .. }
            | GoalEvent::GoalDeleted { goal_id, .. }
            | GoalEvent::GoalStateChanged { goal_id, .. }
            | GoalEvent::BadgeAwarded { goal_id, .. } => Some(*goal_id),
            GoalEvent::ReflectionRecorded { .. } => None,
        }
    }

    pub fn goal_created(goal: &Goal, at: DateTime<Utc>) -> Self {
        GoalEvent::GoalCreated {
            goal_id: goal.id,
            title: goal.title.clone(),
            target: goal.target,
            timestamp: at,
        }
    }

    pub fn goal_edited(goal: &Goal, at: DateTime<Utc>) -> Self {
        GoalEvent::GoalEdited {
            goal_id: goal.id,
            title: goal.title.clone(),
            target: goal.target,
            timestamp: at,
        }
    }

    pub fn state_changed(
        goal_id: GoalId,
        from: GoalStatus,
        to: GoalStatus,
        at: DateTime<Utc>,
    ) -> Self {
        GoalEvent::GoalStateChanged {
            goal_id,
            from_state: from,
            to_state: to,
            timestamp: at,
        }
    }
}

/// Receives goal events.
pub trait EventSink: Send + Sync {
    /// Handle an event. Errors are logged but don't stop the system.
    fn send(&self, event: &GoalEvent) -> Result<(), GoalError>;
}

/// Per-day JSONL journal of goal events.
pub struct DayJournal {
    dir: PathBuf,
    zone: ReferenceZone,
}

impl DayJournal {
    pub fn new(dir: impl AsRef<Path>, zone: ReferenceZone) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            zone,
        }
    }

    fn day_file(&self, day: DayKey) -> PathBuf {
        self.dir.join(format!("{day}.jsonl"))
    }

    /// Events recorded on `day`, in the order they were written. A line that
    /// no longer parses is skipped with a warning.
    pub fn read_day(&self, day: DayKey) -> Result<Vec<GoalEvent>, GoalError> {
        let path = self.day_file(day);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(GoalError::IoError {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        let mut events = Vec::new();
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(day = %day, line = n + 1, "skipping journal line: {}", e),
            }
        }
        Ok(events)
    }

    /// Events on `day` that concern `goal_id`.
    pub fn history(&self, day: DayKey, goal_id: GoalId) -> Result<Vec<GoalEvent>, GoalError> {
        Ok(self
            .read_day(day)?
            .into_iter()
            .filter(|e| e.goal_id() == Some(goal_id))
            .collect())
    }
}

impl EventSink for DayJournal {
    fn send(&self, event: &GoalEvent) -> Result<(), GoalError> {
        fs::create_dir_all(&self.dir).map_err(|source| GoalError::IoError {
            path: self.dir.display().to_string(),
            source,
        })?;

        let path = self.day_file(civil_day(event.timestamp(), self.zone));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| GoalError::IoError {
                path: path.display().to_string(),
                source,
            })?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{json}").map_err(|source| GoalError::IoError {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Dispatches events to multiple sinks.
#[derive(Default)]
pub struct EventDispatcher {
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn dispatch(&self, event: &GoalEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!(
                    event = event.event_type(),
                    goal_id = ?event.goal_id(),
                    "event sink error: {}",
                    e
                );
            }
        }
    }
}
