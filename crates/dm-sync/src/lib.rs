//! # dm-sync
//!
//! Decides when Daymark reconciles its read projections with the remote
//! store.
//!
//! Mutations already hit the remote store synchronously; the scheduler only
//! refreshes what the app reads back. It coalesces bursts of actions, runs
//! at most one reconciliation at a time, does a full pass when the app comes
//! to the foreground, and keeps a slow ticker going while it stays there.
//! Failures are logged and retried at the next natural trigger; nothing is
//! ever returned to the caller as an error.
//!
//! ## Key components
//!
//! - [`SyncScheduler`] — the scheduler handle (cheap to clone)
//! - [`Reconciler`] — the port that performs a reconciliation pass
//! - [`ActionKind`] / [`SyncDomain`] / [`SyncScope`] — what to refresh
//! - [`SyncConfig`] — intervals, queue capacity, critical wait

pub mod action;
pub mod config;
pub mod scheduler;

pub use action::{ActionKind, PendingAction, SyncDomain, SyncScope};
pub use config::SyncConfig;
pub use scheduler::{Reconciler, SchedulerStatus, SyncOutcome, SyncScheduler};
