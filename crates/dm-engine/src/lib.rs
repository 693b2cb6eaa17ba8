//! # dm-engine
//!
//! The Daymark goal lifecycle engine.
//!
//! [`GoalLifecycleEngine`] admits goals through the validator, persists them
//! through a [`RemoteGoalStore`], schedules reminders through a
//! [`NotificationGateway`], confirms and expires them, keeps the per-day
//! streak current and tells the sync scheduler what changed. A
//! [`GoalSession`] moves the engine into a single owning task and exposes it
//! through a cloneable [`SessionHandle`], with a periodic expiration sweep
//! and app-lifecycle handling.
//!
//! ## Key components
//!
//! - [`GoalLifecycleEngine`] — create / update / delete / confirm / sweep
//! - [`GoalSession`] / [`SessionHandle`] — actor, sweep timer, teardown
//! - [`GoalSnapshot`] — the read model, published over a watch channel
//! - [`DaymarkConfig`] — daymark.toml
//! - [`MemoryGoalStore`] / [`MemoryNotifier`] — in-process adapters

pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod ports;
pub mod session;

pub use config::{DaymarkConfig, SweepConfig};
pub use engine::{GoalDraft, GoalLifecycleEngine, GoalSnapshot, SessionEpoch, SweepReport};
pub use error::{ConfigError, RemoteError};
pub use memory::{MemoryGoalStore, MemoryNotifier};
pub use ports::{NotificationGateway, NotificationPayload, RemoteGoalStore};
pub use session::{AppLifecycle, GoalSession, SessionHandle};
