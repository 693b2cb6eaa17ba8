// engine.rs — GoalLifecycleEngine: the single writer of goal state.
//
// Every mutation follows the same pipeline:
//
//   1. Check the session is still open
//   2. Validate against the in-memory collection (rules, windows, caps)
//   3. Persist through the RemoteGoalStore
//   4. Re-check the session (a teardown during the await discards the result)
//   5. Commit locally, then side effects: notifications, streak, events
//   6. Publish a new snapshot, notify the sync scheduler
//
// Side effects after the commit are best-effort: they log and never undo a
// mutation the remote store already accepted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dm_clock::{civil_day, ClockSource, DayKey, ReferenceZone};
use dm_goal::validator::{
    check_daily_cap, check_delete_floor, goals_per_day, validate, validate_batch, validate_title,
};
use dm_goal::window::{check_confirm_window, editable_window, is_expired};
use dm_goal::{
    Candidate, EventDispatcher, EventSink, Goal, GoalEdit, GoalError, GoalEvent, GoalId, GoalPatch,
    GoalStatus, NewGoal, RulesConfig, ValidationError,
};
use dm_store::KeyValueStore;
use dm_streak::{Badge, StreakConfig, StreakTracker};
use dm_sync::{ActionKind, SyncScheduler};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::ports::{NotificationGateway, NotificationPayload, RemoteGoalStore};

/// A goal to create: title and target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalDraft {
    pub title: String,
    pub target: DateTime<Utc>,
}

impl GoalDraft {
    pub fn new(title: impl Into<String>, target: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            target,
        }
    }
}

/// Result of one expiration sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Goals moved to Failure.
    pub expired: Vec<GoalId>,
    /// Overdue goals whose update failed; they stay Pending for the next sweep.
    pub retry: Vec<GoalId>,
}

/// The read model published after every committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GoalSnapshot {
    /// Today, in the reference zone, when the snapshot was taken.
    pub day: DayKey,
    /// All loaded goals, in target order.
    pub goals: Vec<Goal>,
    /// Badges of loaded goals that earned one.
    pub badges: BTreeMap<GoalId, Badge>,
    /// Today's streak level.
    pub streak_level: u8,
    /// Whether today's reflection has been recorded.
    pub reflection_done: bool,
}

impl GoalSnapshot {
    fn empty(day: DayKey) -> Self {
        Self {
            day,
            goals: Vec::new(),
            badges: BTreeMap::new(),
            streak_level: 0,
            reflection_done: false,
        }
    }
}

/// Generation counter for a session. Bumping it invalidates every engine
/// opened under an earlier generation.
#[derive(Debug, Clone, Default)]
pub struct SessionEpoch(Arc<AtomicU64>);

impl SessionEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Owns one user's goals and drives them through their lifecycle.
pub struct GoalLifecycleEngine {
    owner_id: String,
    rules: RulesConfig,
    clock: Arc<dyn ClockSource>,
    remote: Arc<dyn RemoteGoalStore>,
    notifier: Arc<dyn NotificationGateway>,
    local: Arc<dyn KeyValueStore>,
    streak: StreakTracker,
    sync: Option<SyncScheduler>,
    events: EventDispatcher,
    goals: Vec<Goal>,
    snapshot: watch::Sender<GoalSnapshot>,
    epoch: SessionEpoch,
    opened_at: u64,
}

impl GoalLifecycleEngine {
    pub fn new(
        owner_id: impl Into<String>,
        rules: RulesConfig,
        streak: StreakConfig,
        clock: Arc<dyn ClockSource>,
        remote: Arc<dyn RemoteGoalStore>,
        notifier: Arc<dyn NotificationGateway>,
        local: Arc<dyn KeyValueStore>,
    ) -> Self {
        let tracker = StreakTracker::new(local.clone(), rules.zone, streak);
        let today = civil_day(clock.now(), rules.zone);
        let (snapshot, _) = watch::channel(GoalSnapshot::empty(today));
        let epoch = SessionEpoch::new();
        let opened_at = epoch.current();
        Self {
            owner_id: owner_id.into(),
            rules,
            clock,
            remote,
            notifier,
            local,
            streak: tracker,
            sync: None,
            events: EventDispatcher::new(),
            goals: Vec::new(),
            snapshot,
            epoch,
            opened_at,
        }
    }

    /// Route committed mutations to a sync scheduler.
    pub fn with_sync(mut self, sync: SyncScheduler) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Fix the daily badge-category draw (tests, replays).
    pub fn with_streak_seed(mut self, seed: u64) -> Self {
        self.streak = self.streak.with_seed(seed);
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.events.add_sink(sink);
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn rules(&self) -> &RulesConfig {
        &self.rules
    }

    pub fn streak(&self) -> &StreakTracker {
        &self.streak
    }

    pub fn sync(&self) -> Option<&SyncScheduler> {
        self.sync.as_ref()
    }

    pub fn epoch(&self) -> SessionEpoch {
        self.epoch.clone()
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn goal(&self, id: GoalId) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == id)
    }

    /// The last published snapshot.
    pub fn snapshot(&self) -> GoalSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch published snapshots. Readers never wait on a mutation.
    pub fn subscribe(&self) -> watch::Receiver<GoalSnapshot> {
        self.snapshot.subscribe()
    }

    /// Replace the collection with the remote store's goals for
    /// `[from, to]` and rebuild each loaded day's streak.
    pub async fn load(&mut self, from: DayKey, to: DayKey) -> Result<usize, GoalError> {
        self.ensure_open()?;
        let listed = self.remote.list(&self.owner_id, from, to).await;
        self.ensure_open()?;
        let mut goals = listed?;
        goals.sort_by(|a, b| a.target.cmp(&b.target));

        let days: BTreeSet<DayKey> = goals.iter().map(|g| g.day(self.rules.zone)).collect();
        for day in days {
            self.streak.recompute(day, &goals).map_err(local_store)?;
        }
        self.goals = goals;
        info!(
            owner = %self.owner_id,
            from = %from,
            to = %to,
            count = self.goals.len(),
            "goals loaded"
        );
        self.publish();
        Ok(self.goals.len())
    }

    /// Create one goal.
    pub async fn create(&mut self, draft: GoalDraft) -> Result<Goal, GoalError> {
        self.ensure_open()?;
        let now = self.clock.now();
        let title = validate_title(&draft.title, self.rules.max_title_chars)?;
        validate(
            &Candidate::new(draft.target),
            &self.goals,
            &self.rules.validation_options(),
            now,
        )?;
        let day = civil_day(draft.target, self.rules.zone);
        check_daily_cap(day, self.count_on(day), 1, self.rules.max_goals_per_day)?;

        let row = NewGoal {
            owner_id: self.owner_id.clone(),
            title,
            target: draft.target,
        };
        let created = self.remote.create(vec![row.clone()]).await;
        self.ensure_open()?;
        let id = created?
            .first()
            .copied()
            .ok_or_else(|| GoalError::StoreUnavailable("store assigned no id".to_string()))?;

        let goal = Goal::from_row(id, &row, now);
        self.insert(goal.clone());
        info!(goal_id = %id, target = %goal.target, "goal created");

        self.schedule_reminder(&goal).await;
        self.events.dispatch(&GoalEvent::goal_created(&goal, now));
        self.publish();
        self.notify_sync(ActionKind::GoalMutation, Some(id.to_string())).await;
        Ok(goal)
    }

    /// Create several goals at once: all are admitted or none.
    pub async fn create_batch(&mut self, drafts: Vec<GoalDraft>) -> Result<Vec<Goal>, GoalError> {
        self.ensure_open()?;
        let now = self.clock.now();
        if drafts.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }
        if drafts.len() > self.rules.max_batch_size {
            return Err(ValidationError::BatchTooLarge {
                len: drafts.len(),
                max: self.rules.max_batch_size,
            }
            .into());
        }

        let mut rows = Vec::with_capacity(drafts.len());
        for draft in &drafts {
            rows.push(NewGoal {
                owner_id: self.owner_id.clone(),
                title: validate_title(&draft.title, self.rules.max_title_chars)?,
                target: draft.target,
            });
        }
        let targets: Vec<DateTime<Utc>> = rows.iter().map(|r| r.target).collect();
        validate_batch(&targets, &self.goals, &self.rules.validation_options(), now)?;

        let adding = targets_per_day(&targets, self.rules.zone);
        let existing = goals_per_day(&self.goals, self.rules.zone);
        for (day, count) in adding {
            let on_day = existing.get(&day).copied().unwrap_or(0);
            check_daily_cap(day, on_day, count, self.rules.max_goals_per_day)?;
        }

        let created = self.remote.create(rows.clone()).await;
        self.ensure_open()?;
        let ids = created?;
        if ids.len() != rows.len() {
            return Err(GoalError::StoreUnavailable(format!(
                "store assigned {} ids for {} rows",
                ids.len(),
                rows.len()
            )));
        }

        let goals: Vec<Goal> = ids
            .iter()
            .zip(&rows)
            .map(|(id, row)| Goal::from_row(*id, row, now))
            .collect();
        for goal in &goals {
            self.insert(goal.clone());
        }
        info!(count = goals.len(), "goal batch created");

        for goal in &goals {
            self.schedule_reminder(goal).await;
            self.events.dispatch(&GoalEvent::goal_created(goal, now));
        }
        self.publish();
        let detail = format!("batch of {}", goals.len());
        self.notify_sync(ActionKind::GoalMutation, Some(detail)).await;
        Ok(goals)
    }

    /// Edit a Pending goal inside its editable window.
    pub async fn update(&mut self, id: GoalId, edit: GoalEdit) -> Result<Goal, GoalError> {
        self.ensure_open()?;
        let now = self.clock.now();
        if edit.is_empty() {
            return Err(ValidationError::EmptyEdit.into());
        }
        let current = self.goal(id).cloned().ok_or(GoalError::NotFound(id))?;
        if !current.is_pending() || !self.editable_at(&current, now)? {
            return Err(ValidationError::NotEditable { id }.into());
        }

        let mut patch = GoalPatch::from(&edit);
        if let Some(title) = &edit.title {
            patch.title = Some(validate_title(title, self.rules.max_title_chars)?);
        }
        let retarget = edit.target.filter(|t| *t != current.target);
        if let Some(target) = retarget {
            validate(
                &Candidate::replacing(target, id),
                &self.goals,
                &self.rules.validation_options(),
                now,
            )?;
            // Moves are bound by the daily cap; the floor only binds deletes.
            let new_day = civil_day(target, self.rules.zone);
            if new_day != current.day(self.rules.zone) {
                let on_day = self.count_on(new_day);
                check_daily_cap(new_day, on_day, 1, self.rules.max_goals_per_day)?;
            }
        } else {
            patch.target = None;
        }

        let result = self.remote.update(id, &patch).await;
        self.ensure_open()?;
        result?;

        let goal = {
            let goal = self.goal_mut(id)?;
            patch.apply_to(goal, now);
            goal.clone()
        };
        self.sort();
        info!(goal_id = %id, retargeted = retarget.is_some(), "goal edited");

        if retarget.is_some() {
            self.cancel_reminder(id).await;
            self.schedule_reminder(&goal).await;
        }
        self.events.dispatch(&GoalEvent::goal_edited(&goal, now));
        self.publish();
        self.notify_sync(ActionKind::GoalMutation, Some(id.to_string())).await;
        Ok(goal)
    }

    /// Delete a goal, unless that would take a day that reached the floor
    /// below it.
    pub async fn delete(&mut self, id: GoalId) -> Result<(), GoalError> {
        self.ensure_open()?;
        let now = self.clock.now();
        let goal = self.goal(id).cloned().ok_or(GoalError::NotFound(id))?;
        let day = goal.day(self.rules.zone);
        check_delete_floor(day, self.count_on(day), self.rules.min_goals_floor)?;

        let result = self.remote.delete(id).await;
        self.ensure_open()?;
        result?;

        self.goals.retain(|g| g.id != id);
        info!(goal_id = %id, day = %day, "goal deleted");

        self.cancel_reminder(id).await;
        self.events.dispatch(&GoalEvent::GoalDeleted {
            goal_id: id,
            timestamp: now,
        });
        self.publish();
        self.notify_sync(ActionKind::GoalMutation, Some(id.to_string())).await;
        Ok(())
    }

    /// Confirm a goal inside its confirm window. Returns the badge it earned.
    pub async fn confirm_success(
        &mut self,
        id: GoalId,
        note: Option<String>,
    ) -> Result<Badge, GoalError> {
        self.ensure_open()?;
        let now = self.clock.now();
        let mut goal = self.goal(id).cloned().ok_or(GoalError::NotFound(id))?;
        if !goal.status.can_transition_to(GoalStatus::Success) {
            return Err(GoalError::InvalidTransition {
                goal_id: id,
                from: goal.status,
                to: GoalStatus::Success,
            });
        }
        check_confirm_window(&goal, now, &self.rules)?;
        // Resolve the badge while nothing is committed yet; a local read
        // failure here aborts cleanly.
        let expected = self.streak.preview_success(&goal).map_err(local_store)?;

        let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let patch = GoalPatch {
            achievement_note: note.clone(),
            ..GoalPatch::status(GoalStatus::Success)
        };
        let result = self.remote.update(id, &patch).await;
        self.ensure_open()?;
        result?;

        goal.transition(GoalStatus::Success, now)?;
        goal.achievement_note = note;
        *self.goal_mut(id)? = goal.clone();
        // The remote store accepted the transition: from here on the commit
        // always completes. A lost streak write is rebuilt by the next load.
        let badge = match self.streak.on_success(&goal) {
            Ok(badge) => badge,
            Err(e) => {
                warn!(goal_id = %id, "streak update failed, badge not persisted: {}", e);
                expected
            }
        };
        info!(goal_id = %id, level = badge.level, category = %badge.category, "goal confirmed");

        self.cancel_reminder(id).await;
        self.events.dispatch(&GoalEvent::state_changed(
            id,
            GoalStatus::Pending,
            GoalStatus::Success,
            now,
        ));
        self.events.dispatch(&GoalEvent::BadgeAwarded {
            goal_id: id,
            level: badge.level,
            category: badge.category.to_string(),
            timestamp: now,
        });
        self.publish();
        self.notify_sync(ActionKind::GoalTransition, Some(id.to_string())).await;
        self.notify_sync(ActionKind::BadgeAwarded, Some(id.to_string())).await;
        Ok(badge)
    }

    /// Move every overdue Pending goal to Failure.
    ///
    /// Uses one clock reading for the whole pass. A goal whose update fails
    /// is logged, left Pending, and reported in `retry`. Running the sweep
    /// twice in a row changes nothing the second time.
    pub async fn sweep_expired(&mut self) -> Result<SweepReport, GoalError> {
        self.ensure_open()?;
        let now = self.clock.now();
        let overdue: Vec<GoalId> = self
            .goals
            .iter()
            .filter(|g| is_expired(g, now, &self.rules))
            .map(|g| g.id)
            .collect();

        let mut report = SweepReport::default();
        for id in overdue {
            let result = self
                .remote
                .update(id, &GoalPatch::status(GoalStatus::Failure))
                .await;
            self.ensure_open()?;
            if let Err(e) = result {
                warn!(goal_id = %id, "expiry update failed, will retry next sweep: {}", e);
                report.retry.push(id);
                continue;
            }

            let goal = {
                let goal = self.goal_mut(id)?;
                goal.transition(GoalStatus::Failure, now)?;
                goal.clone()
            };
            if let Err(e) = self.streak.on_failure(&goal) {
                warn!(goal_id = %id, "streak update failed: {}", e);
            }
            self.cancel_reminder(id).await;
            self.events.dispatch(&GoalEvent::state_changed(
                id,
                GoalStatus::Pending,
                GoalStatus::Failure,
                now,
            ));
            info!(goal_id = %id, target = %goal.target, "goal expired");
            report.expired.push(id);
        }

        if !report.expired.is_empty() {
            self.publish();
            let detail = format!("{} expired", report.expired.len());
            self.notify_sync(ActionKind::GoalTransition, Some(detail)).await;
        } else {
            debug!(retry = report.retry.len(), "sweep found nothing to expire");
        }
        Ok(report)
    }

    /// Whether `id` may be edited right now.
    pub fn editable(&self, id: GoalId) -> Result<bool, GoalError> {
        let goal = self.goal(id).ok_or(GoalError::NotFound(id))?;
        Ok(goal.is_pending() && self.editable_at(goal, self.clock.now())?)
    }

    /// Record today's end-of-day reflection. Closes today's editable window.
    pub async fn record_reflection(&mut self) -> Result<DayKey, GoalError> {
        self.ensure_open()?;
        let now = self.clock.now();
        let today = civil_day(now, self.rules.zone);
        self.local
            .set(&reflection_key(today), &now.to_rfc3339())
            .map_err(local_store)?;
        info!(day = %today, "reflection recorded");

        self.events.dispatch(&GoalEvent::ReflectionRecorded {
            day: today.to_string(),
            timestamp: now,
        });
        self.publish();
        self.notify_sync(ActionKind::ReflectionSaved, Some(today.to_string())).await;
        Ok(today)
    }

    /// Whether the reflection for `day` has been recorded.
    pub fn reflection_done(&self, day: DayKey) -> Result<bool, GoalError> {
        Ok(self
            .local
            .get(&reflection_key(day))
            .map_err(local_store)?
            .is_some())
    }

    fn ensure_open(&self) -> Result<(), GoalError> {
        if self.epoch.current() == self.opened_at {
            Ok(())
        } else {
            Err(GoalError::SessionClosed)
        }
    }

    fn editable_at(&self, goal: &Goal, now: DateTime<Utc>) -> Result<bool, GoalError> {
        let today = civil_day(now, self.rules.zone);
        let reflected = self.reflection_done(today)?;
        Ok(editable_window(goal, reflected, now, &self.rules))
    }

    fn count_on(&self, day: DayKey) -> usize {
        self.goals
            .iter()
            .filter(|g| g.day(self.rules.zone) == day)
            .count()
    }

    fn goal_mut(&mut self, id: GoalId) -> Result<&mut Goal, GoalError> {
        self.goals
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or(GoalError::NotFound(id))
    }

    fn insert(&mut self, goal: Goal) {
        self.goals.push(goal);
        self.sort();
    }

    fn sort(&mut self) {
        self.goals.sort_by(|a, b| a.target.cmp(&b.target));
    }

    async fn schedule_reminder(&self, goal: &Goal) {
        let payload = NotificationPayload {
            goal_id: goal.id,
            title: goal.title.clone(),
            target: goal.target,
        };
        if let Err(e) = self.notifier.schedule(goal.id, goal.target, payload).await {
            warn!(goal_id = %goal.id, "failed to schedule reminder: {:#}", e);
        }
    }

    async fn cancel_reminder(&self, id: GoalId) {
        if let Err(e) = self.notifier.cancel(id).await {
            warn!(goal_id = %id, "failed to cancel reminder: {:#}", e);
        }
    }

    async fn notify_sync(&self, kind: ActionKind, detail: Option<String>) {
        if let Some(sync) = &self.sync {
            let outcome = sync.notify_action(kind, detail).await;
            debug!(kind = %kind, ?outcome, "sync notified");
        }
    }

    /// Publish a fresh snapshot. A local-store read failure keeps the
    /// previous snapshot.
    fn publish(&self) {
        match self.build_snapshot() {
            Ok(snapshot) => {
                self.snapshot.send_replace(snapshot);
            }
            Err(e) => warn!("snapshot not published: {}", e),
        }
    }

    fn build_snapshot(&self) -> Result<GoalSnapshot, GoalError> {
        let today = civil_day(self.clock.now(), self.rules.zone);
        let days: BTreeSet<DayKey> = self
            .goals
            .iter()
            .map(|g| g.day(self.rules.zone))
            .collect();
        let mut badges = BTreeMap::new();
        for day in days {
            let state = self.streak.day_state(day).map_err(local_store)?;
            badges.extend(
                state
                    .badges
                    .into_iter()
                    .filter(|(id, _)| self.goals.iter().any(|g| g.id == *id)),
            );
        }
        Ok(GoalSnapshot {
            day: today,
            goals: self.goals.clone(),
            badges,
            streak_level: self.streak.level(today).map_err(local_store)?,
            reflection_done: self.reflection_done(today)?,
        })
    }
}

fn targets_per_day(targets: &[DateTime<Utc>], zone: ReferenceZone) -> BTreeMap<DayKey, usize> {
    let mut counts = BTreeMap::new();
    for target in targets {
        *counts.entry(civil_day(*target, zone)).or_insert(0) += 1;
    }
    counts
}

fn reflection_key(day: DayKey) -> String {
    format!("reflection/{day}")
}

/// Local persistence failures surface as an unavailable store.
fn local_store(err: impl std::fmt::Display) -> GoalError {
    GoalError::StoreUnavailable(format!("local store: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryGoalStore, MemoryNotifier};
    use chrono::{Duration, TimeZone};
    use dm_clock::{FakeClock, ReferenceZone};
    use dm_goal::DayJournal;
    use dm_store::MemoryKvStore;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct Fixture {
        clock: Arc<FakeClock>,
        remote: Arc<MemoryGoalStore>,
        notifier: Arc<MemoryNotifier>,
        engine: GoalLifecycleEngine,
    }

    /// Day 11 is today, day 12 tomorrow. Civil days are UTC.
    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, day, h, m, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let rules = RulesConfig {
            zone: ReferenceZone::utc(),
            ..RulesConfig::default()
        };
        fixture_with(rules, Arc::new(MemoryKvStore::new()))
    }

    fn fixture_with(rules: RulesConfig, local: Arc<dyn KeyValueStore>) -> Fixture {
        let clock = Arc::new(FakeClock::new(at(11, 8, 0)));
        let remote = Arc::new(MemoryGoalStore::new(clock.clone(), rules.zone));
        let notifier = Arc::new(MemoryNotifier::new());
        let engine = GoalLifecycleEngine::new(
            "user-1",
            rules,
            StreakConfig::default(),
            clock.clone(),
            remote.clone(),
            notifier.clone(),
            local,
        )
        .with_streak_seed(7);
        Fixture {
            clock,
            remote,
            notifier,
            engine,
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl EventSink for RecordingSink {
        fn send(&self, event: &GoalEvent) -> Result<(), GoalError> {
            self.events
                .lock()
                .unwrap()
                .push(event.event_type().to_string());
            Ok(())
        }
    }

    /// Local store whose reads or writes can be switched off.
    #[derive(Default)]
    struct FlakyKv {
        inner: MemoryKvStore,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl FlakyKv {
        fn check(&self, flag: &AtomicBool) -> Result<(), dm_store::StoreError> {
            if flag.load(Ordering::SeqCst) {
                let io = std::io::Error::new(std::io::ErrorKind::Other, "disk unavailable");
                return Err(dm_store::StoreError::IoError {
                    path: "kv".to_string(),
                    source: io,
                });
            }
            Ok(())
        }
    }

    impl KeyValueStore for FlakyKv {
        fn get(&self, key: &str) -> Result<Option<String>, dm_store::StoreError> {
            self.check(&self.fail_reads)?;
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), dm_store::StoreError> {
            self.check(&self.fail_writes)?;
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<bool, dm_store::StoreError> {
            self.check(&self.fail_writes)?;
            self.inner.remove(key)
        }

        fn set_if_absent(&self, key: &str, value: &str) -> Result<String, dm_store::StoreError> {
            self.inner.set_if_absent(key, value)
        }
    }

    #[tokio::test]
    async fn create_persists_schedules_and_publishes() {
        let mut fx = fixture();
        let mut rx = fx.engine.subscribe();

        let goal = fx
            .engine
            .create(GoalDraft::new("  Read a chapter  ", at(11, 12, 0)))
            .await
            .unwrap();

        assert_eq!(goal.title, "Read a chapter");
        assert_eq!(goal.status, GoalStatus::Pending);
        assert!(fx.remote.get(goal.id).is_some());
        assert_eq!(fx.notifier.fire_at(goal.id), Some(at(11, 12, 0)));

        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.goals, vec![goal]);
        assert_eq!(snapshot.streak_level, 0);
    }

    #[tokio::test]
    async fn rejected_create_leaves_no_trace() {
        let mut fx = fixture();
        fx.engine
            .create(GoalDraft::new("Run", at(11, 12, 0)))
            .await
            .unwrap();

        let err = fx
            .engine
            .create(GoalDraft::new("Swim", at(11, 12, 20)))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(fx.remote.len(), 1);
        assert_eq!(fx.engine.goals().len(), 1);
        assert_eq!(fx.notifier.len(), 1);
    }

    #[tokio::test]
    async fn remote_conflict_is_reported_as_validation() {
        let mut fx = fixture();
        // Created from another device: unknown to this engine.
        fx.remote
            .create(vec![NewGoal {
                owner_id: "user-1".to_string(),
                title: "Elsewhere".to_string(),
                target: at(12, 9, 0),
            }])
            .await
            .unwrap();

        let err = fx
            .engine
            .create(GoalDraft::new("Here", at(12, 9, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, GoalError::Conflict { .. }));
        assert!(err.is_validation());
        assert!(fx.engine.goals().is_empty());
    }

    #[tokio::test]
    async fn store_outage_surfaces_and_commits_nothing() {
        let mut fx = fixture();
        fx.remote.set_offline(true);
        let err = fx
            .engine
            .create(GoalDraft::new("Run", at(12, 9, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, GoalError::StoreUnavailable(_)));
        assert!(fx.engine.goals().is_empty());
        assert!(fx.notifier.is_empty());
    }

    #[tokio::test]
    async fn reminder_failure_does_not_fail_the_mutation() {
        let mut fx = fixture();
        fx.notifier.set_failing(true);
        let goal = fx
            .engine
            .create(GoalDraft::new("Run", at(12, 9, 0)))
            .await
            .unwrap();
        assert!(fx.engine.goal(goal.id).is_some());
        fx.engine.delete(goal.id).await.unwrap();
    }

    #[tokio::test]
    async fn batch_is_one_store_call_and_all_or_nothing() {
        let mut fx = fixture();
        let drafts = vec![
            GoalDraft::new("A", at(12, 9, 0)),
            GoalDraft::new("B", at(12, 9, 30)),
            GoalDraft::new("C", at(12, 10, 0)),
        ];
        let goals = fx.engine.create_batch(drafts).await.unwrap();
        assert_eq!(goals.len(), 3);
        assert_eq!(fx.remote.create_calls(), 1);
        assert_eq!(fx.notifier.len(), 3);

        let clashing = vec![
            GoalDraft::new("D", at(12, 14, 0)),
            GoalDraft::new("E", at(12, 14, 10)),
        ];
        let err = fx.engine.create_batch(clashing).await.unwrap_err();
        assert!(matches!(
            err.validation(),
            Some(ValidationError::BatchOverlap {
                first: 0,
                second: 1,
                ..
            })
        ));
        assert_eq!(fx.remote.create_calls(), 1);
        assert_eq!(fx.engine.goals().len(), 3);
    }

    #[tokio::test]
    async fn batch_limits() {
        let mut fx = fixture();
        assert!(matches!(
            fx.engine.create_batch(Vec::new()).await.unwrap_err().validation(),
            Some(ValidationError::EmptyBatch)
        ));

        let too_many: Vec<GoalDraft> = (0..21)
            .map(|i| GoalDraft::new(format!("#{i}"), at(13, 1, 0) + Duration::hours(i)))
            .collect();
        assert!(matches!(
            fx.engine.create_batch(too_many).await.unwrap_err().validation(),
            Some(ValidationError::BatchTooLarge { len: 21, max: 20 })
        ));
    }

    #[tokio::test]
    async fn daily_cap_counts_existing_and_batch() {
        let mut fx = fixture();
        let first: Vec<GoalDraft> = (0..17)
            .map(|i| GoalDraft::new(format!("#{i}"), at(12, 1, 0) + Duration::minutes(30 * i)))
            .collect();
        fx.engine.create_batch(first).await.unwrap();

        let two_more = vec![
            GoalDraft::new("x", at(12, 20, 0)),
            GoalDraft::new("y", at(12, 21, 0)),
        ];
        let err = fx.engine.create_batch(two_more).await.unwrap_err();
        assert!(matches!(
            err.validation(),
            Some(ValidationError::DailyCap { limit: 18, .. })
        ));

        fx.engine
            .create(GoalDraft::new("18th", at(12, 20, 0)))
            .await
            .unwrap();
        let err = fx
            .engine
            .create(GoalDraft::new("19th", at(12, 21, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err.validation(), Some(ValidationError::DailyCap { .. })));
    }

    #[tokio::test]
    async fn moving_a_goal_off_a_floor_day_is_allowed() {
        let mut fx = fixture();
        let mut tomorrow = Vec::new();
        for h in 9..14 {
            let goal = fx
                .engine
                .create(GoalDraft::new(format!("Block {h}"), at(12, h, 0)))
                .await
                .unwrap();
            tomorrow.push(goal);
        }
        let err = fx.engine.delete(tomorrow[0].id).await.unwrap_err();
        assert!(matches!(err.validation(), Some(ValidationError::MinCardinality { .. })));

        // The floor binds deletions only; a move takes the day to 4.
        let moved = fx
            .engine
            .update(tomorrow[0].id, GoalEdit::target(at(13, 9, 0)))
            .await
            .unwrap();
        assert_eq!(moved.target, at(13, 9, 0));
        let day12 = DayKey::from_ymd(2026, 5, 12).unwrap();
        let left = fx
            .engine
            .goals()
            .iter()
            .filter(|g| g.day(ReferenceZone::utc()) == day12)
            .count();
        assert_eq!(left, 4);
    }

    #[tokio::test]
    async fn update_retargets_and_reschedules() {
        let mut fx = fixture();
        let goal = fx
            .engine
            .create(GoalDraft::new("Run", at(12, 9, 0)))
            .await
            .unwrap();
        let other = fx
            .engine
            .create(GoalDraft::new("Swim", at(12, 11, 0)))
            .await
            .unwrap();

        let edited = fx
            .engine
            .update(goal.id, GoalEdit::target(at(12, 10, 0)))
            .await
            .unwrap();
        assert_eq!(edited.target, at(12, 10, 0));
        assert_eq!(fx.notifier.fire_at(goal.id), Some(at(12, 10, 0)));
        assert_eq!(fx.remote.get(goal.id).unwrap().target, at(12, 10, 0));

        // Moving onto the other goal's buffer names it.
        let err = fx
            .engine
            .update(goal.id, GoalEdit::target(at(12, 10, 45)))
            .await
            .unwrap_err();
        match err.validation() {
            Some(ValidationError::Overlap { conflicting, .. }) => {
                assert_eq!(conflicting.id, other.id)
            }
            unexpected => panic!("expected overlap, got {:?}", unexpected),
        }

        // Keeping its own target does not collide with itself.
        let edit = GoalEdit {
            title: Some("Long run".to_string()),
            target: Some(at(12, 10, 0)),
        };
        fx.engine.update(goal.id, edit).await.unwrap();
        assert_eq!(fx.engine.goal(goal.id).unwrap().title, "Long run");
    }

    #[tokio::test]
    async fn edits_close_near_target_and_after_reflection() {
        let mut fx = fixture();
        let today = fx
            .engine
            .create(GoalDraft::new("Today", at(11, 13, 0)))
            .await
            .unwrap();
        let tomorrow = fx
            .engine
            .create(GoalDraft::new("Tomorrow", at(12, 13, 0)))
            .await
            .unwrap();
        assert!(fx.engine.editable(today.id).unwrap());

        // Within three hours of the target.
        fx.clock.set(at(11, 10, 30));
        assert!(!fx.engine.editable(today.id).unwrap());
        let err = fx
            .engine
            .update(today.id, GoalEdit::title("Later"))
            .await
            .unwrap_err();
        assert!(matches!(err.validation(), Some(ValidationError::NotEditable { .. })));

        // The reflection closes today but not tomorrow.
        fx.clock.set(at(11, 8, 30));
        assert!(fx.engine.editable(today.id).unwrap());
        fx.engine.record_reflection().await.unwrap();
        assert!(!fx.engine.editable(today.id).unwrap());
        assert!(fx.engine.editable(tomorrow.id).unwrap());
        assert!(fx.engine.snapshot().reflection_done);

        assert!(matches!(
            fx.engine
                .update(tomorrow.id, GoalEdit::default())
                .await
                .unwrap_err()
                .validation(),
            Some(ValidationError::EmptyEdit)
        ));
    }

    #[tokio::test]
    async fn confirm_inside_window_awards_badge() {
        let mut fx = fixture();
        let goal = fx
            .engine
            .create(GoalDraft::new("Stretch", at(11, 12, 0)))
            .await
            .unwrap();

        fx.clock.set(at(11, 11, 50));
        let err = fx.engine.confirm_success(goal.id, None).await.unwrap_err();
        assert!(matches!(
            err.validation(),
            Some(ValidationError::OutsideConfirmWindow { .. })
        ));

        fx.clock.set(at(11, 12, 5));
        let badge = fx
            .engine
            .confirm_success(goal.id, Some(" felt good ".to_string()))
            .await
            .unwrap();
        assert_eq!(badge.level, 1);
        let confirmed = fx.engine.goal(goal.id).unwrap();
        assert_eq!(confirmed.status, GoalStatus::Success);
        assert_eq!(confirmed.achievement_note.as_deref(), Some("felt good"));
        assert_eq!(fx.remote.get(goal.id).unwrap().status, GoalStatus::Success);
        assert!(!fx.notifier.is_scheduled(goal.id));

        let snapshot = fx.engine.snapshot();
        assert_eq!(snapshot.streak_level, 1);
        assert_eq!(snapshot.badges.get(&goal.id), Some(&badge));

        let again = fx.engine.confirm_success(goal.id, None).await.unwrap_err();
        assert!(matches!(again, GoalError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn confirm_completes_when_streak_write_fails() {
        let local = Arc::new(FlakyKv::default());
        let rules = RulesConfig {
            zone: ReferenceZone::utc(),
            ..RulesConfig::default()
        };
        let mut fx = fixture_with(rules, local.clone());
        let goal = fx
            .engine
            .create(GoalDraft::new("Stretch", at(11, 12, 0)))
            .await
            .unwrap();

        fx.clock.set(at(11, 12, 0));
        local.fail_writes.store(true, Ordering::SeqCst);
        let badge = fx.engine.confirm_success(goal.id, None).await.unwrap();
        assert_eq!(badge.level, 1);

        assert_eq!(fx.engine.goal(goal.id).unwrap().status, GoalStatus::Success);
        assert_eq!(fx.remote.get(goal.id).unwrap().status, GoalStatus::Success);
        let snapshot = fx.engine.snapshot();
        assert_eq!(snapshot.goals[0].status, GoalStatus::Success);
        assert!(!fx.notifier.is_scheduled(goal.id));

        // The next load rebuilds the lost streak write.
        local.fail_writes.store(false, Ordering::SeqCst);
        let today = DayKey::from_ymd(2026, 5, 11).unwrap();
        fx.engine.load(today, today).await.unwrap();
        assert_eq!(fx.engine.snapshot().streak_level, 1);
        assert_eq!(fx.engine.snapshot().badges.get(&goal.id), Some(&badge));
    }

    #[tokio::test]
    async fn confirm_aborts_before_commit_when_streak_unreadable() {
        let local = Arc::new(FlakyKv::default());
        let rules = RulesConfig {
            zone: ReferenceZone::utc(),
            ..RulesConfig::default()
        };
        let mut fx = fixture_with(rules, local.clone());
        let goal = fx
            .engine
            .create(GoalDraft::new("Stretch", at(11, 12, 0)))
            .await
            .unwrap();

        fx.clock.set(at(11, 12, 0));
        local.fail_reads.store(true, Ordering::SeqCst);
        let err = fx.engine.confirm_success(goal.id, None).await.unwrap_err();
        assert!(matches!(err, GoalError::StoreUnavailable(_)));
        assert_eq!(fx.engine.goal(goal.id).unwrap().status, GoalStatus::Pending);
        assert_eq!(fx.remote.get(goal.id).unwrap().status, GoalStatus::Pending);

        local.fail_reads.store(false, Ordering::SeqCst);
        assert!(fx.engine.confirm_success(goal.id, None).await.is_ok());
    }

    #[tokio::test]
    async fn oversized_rule_values_do_not_panic() {
        let rules = RulesConfig {
            zone: ReferenceZone::utc(),
            lead_time_minutes: i64::MAX,
            expiry_catch_all_hours: i64::MAX,
            ..RulesConfig::default()
        };
        let mut fx = fixture_with(rules, Arc::new(MemoryKvStore::new()));
        let err = fx
            .engine
            .create(GoalDraft::new("Soon", at(11, 12, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err.validation(), Some(ValidationError::LeadTime { .. })));
        assert!(fx.engine.sweep_expired().await.unwrap().expired.is_empty());
    }

    #[tokio::test]
    async fn sweep_expires_overdue_goals_once() {
        let mut fx = fixture();
        let early = fx
            .engine
            .create(GoalDraft::new("Early", at(11, 11, 0)))
            .await
            .unwrap();
        let late = fx
            .engine
            .create(GoalDraft::new("Late", at(11, 15, 0)))
            .await
            .unwrap();

        fx.clock.set(at(11, 11, 5));
        assert!(fx.engine.sweep_expired().await.unwrap().expired.is_empty());

        fx.clock.set(at(11, 11, 6));
        let report = fx.engine.sweep_expired().await.unwrap();
        assert_eq!(report.expired, vec![early.id]);
        assert_eq!(fx.engine.goal(early.id).unwrap().status, GoalStatus::Failure);
        assert_eq!(fx.engine.goal(late.id).unwrap().status, GoalStatus::Pending);
        assert!(!fx.notifier.is_scheduled(early.id));

        let statuses: Vec<GoalStatus> = fx.engine.goals().iter().map(|g| g.status).collect();
        let second = fx.engine.sweep_expired().await.unwrap();
        assert_eq!(second, SweepReport::default());
        let after: Vec<GoalStatus> = fx.engine.goals().iter().map(|g| g.status).collect();
        assert_eq!(statuses, after);
    }

    #[tokio::test]
    async fn sweep_failure_keeps_goal_pending_for_retry() {
        let mut fx = fixture();
        let a = fx
            .engine
            .create(GoalDraft::new("A", at(11, 11, 0)))
            .await
            .unwrap();
        let b = fx
            .engine
            .create(GoalDraft::new("B", at(11, 12, 0)))
            .await
            .unwrap();
        fx.remote.fail_updates_for(a.id);

        fx.clock.set(at(11, 13, 0));
        let report = fx.engine.sweep_expired().await.unwrap();
        assert_eq!(report.expired, vec![b.id]);
        assert_eq!(report.retry, vec![a.id]);
        assert!(fx.engine.goal(a.id).unwrap().is_pending());

        fx.remote.clear_failures();
        let report = fx.engine.sweep_expired().await.unwrap();
        assert_eq!(report.expired, vec![a.id]);
        assert!(report.retry.is_empty());
    }

    #[tokio::test]
    async fn catch_all_expires_goals_missed_across_days() {
        let mut fx = fixture();
        let goal = fx
            .engine
            .create(GoalDraft::new("Yesterday", at(12, 9, 0)))
            .await
            .unwrap();
        fx.clock.set(at(14, 9, 0));
        let report = fx.engine.sweep_expired().await.unwrap();
        assert_eq!(report.expired, vec![goal.id]);
    }

    #[tokio::test]
    async fn load_replaces_goals_and_rebuilds_streak() {
        let mut fx = fixture();
        let day = DayKey::from_ymd(2026, 5, 11).unwrap();
        let ids = fx
            .remote
            .create(vec![
                NewGoal {
                    owner_id: "user-1".to_string(),
                    title: "A".to_string(),
                    target: at(11, 9, 0),
                },
                NewGoal {
                    owner_id: "user-1".to_string(),
                    title: "B".to_string(),
                    target: at(11, 10, 0),
                },
                NewGoal {
                    owner_id: "someone-else".to_string(),
                    title: "C".to_string(),
                    target: at(11, 11, 0),
                },
            ])
            .await
            .unwrap();
        fx.remote
            .update(ids[0], &GoalPatch::status(GoalStatus::Success))
            .await
            .unwrap();
        fx.remote
            .update(ids[1], &GoalPatch::status(GoalStatus::Success))
            .await
            .unwrap();

        assert_eq!(fx.engine.load(day, day).await.unwrap(), 2);
        let snapshot = fx.engine.snapshot();
        assert_eq!(snapshot.streak_level, 2);
        assert_eq!(snapshot.badges.len(), 2);
        assert_eq!(snapshot.badges[&ids[1]].level, 2);

        // Loading again is idempotent.
        fx.engine.load(day, day).await.unwrap();
        assert_eq!(fx.engine.snapshot().streak_level, 2);
    }

    #[tokio::test]
    async fn closed_session_discards_everything() {
        let mut fx = fixture();
        fx.engine.epoch().bump();
        let err = fx
            .engine
            .create(GoalDraft::new("Run", at(12, 9, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, GoalError::SessionClosed));
        assert!(fx.remote.is_empty());
        assert!(matches!(
            fx.engine.sweep_expired().await,
            Err(GoalError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn events_reach_registered_sinks() {
        let mut fx = fixture();
        let recorder = RecordingSink::default();
        let seen = recorder.events.clone();
        fx.engine.add_sink(Box::new(recorder));
        let dir = tempdir().unwrap();
        fx.engine
            .add_sink(Box::new(DayJournal::new(dir.path(), ReferenceZone::utc())));

        let goal = fx
            .engine
            .create(GoalDraft::new("Stretch", at(11, 12, 0)))
            .await
            .unwrap();
        fx.clock.set(at(11, 12, 0));
        fx.engine.confirm_success(goal.id, None).await.unwrap();
        fx.engine.record_reflection().await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "goal_created",
                "goal_state_changed",
                "badge_awarded",
                "reflection_recorded"
            ]
        );
        let journal = DayJournal::new(dir.path(), ReferenceZone::utc());
        let today = DayKey::from_ymd(2026, 5, 11).unwrap();
        assert_eq!(journal.read_day(today).unwrap().len(), 4);
        assert_eq!(journal.history(today, goal.id).unwrap().len(), 3);
    }
}
