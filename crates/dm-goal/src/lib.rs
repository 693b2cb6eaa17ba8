//! # dm-goal
//!
//! Goal model, status state machine and admission rules for Daymark.
//!
//! A [`Goal`] is a time-boxed commitment: a title and a target instant that
//! must be confirmed within a few minutes of the target, or it expires.
//! This crate holds everything about goals that needs no I/O: the
//! [`GoalStatus`] state machine, the conflict [`validator`] (lead time,
//! buffer, per-day cardinality), the edit/confirm/expiry [`window`]
//! predicates, and lifecycle [`events`].
//!
//! ## Key components
//!
//! - [`Goal`] / [`GoalStatus`] — Pending → Success | Failure
//! - [`RulesConfig`] — every threshold the rules use, with defaults
//! - [`validator::validate`] — admission check for one candidate
//! - [`validator::validate_batch`] — all-or-nothing admission for a batch
//! - [`EventDispatcher`] / [`EventSink`] — lifecycle event fan-out

pub mod error;
pub mod events;
pub mod goal;
pub mod rules;
pub mod validator;
pub mod window;

pub use error::{GoalError, GoalRef, ValidationError};
pub use events::{DayJournal, EventDispatcher, EventSink, GoalEvent};
pub use goal::{Goal, GoalEdit, GoalId, GoalPatch, GoalStatus, NewGoal};
pub use rules::{RulesConfig, ValidationOptions, MAX_CATCH_ALL_HOURS, MAX_RULE_MINUTES};
pub use validator::Candidate;
