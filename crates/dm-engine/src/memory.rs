// memory.rs — In-process adapters for the outbound ports.
//
// MemoryGoalStore behaves like the remote store as far as the engine can
// observe: it assigns ids, enforces (owner, target) uniqueness, and applies
// batches all-or-nothing. It can also be switched offline, or made to fail
// updates for chosen goals, to exercise error paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dm_clock::{ClockSource, DayKey, ReferenceZone};
use dm_goal::{Goal, GoalId, GoalPatch, NewGoal};
use uuid::Uuid;

use crate::error::RemoteError;
use crate::ports::{NotificationGateway, NotificationPayload, RemoteGoalStore};

/// In-memory [`RemoteGoalStore`].
pub struct MemoryGoalStore {
    clock: Arc<dyn ClockSource>,
    zone: ReferenceZone,
    goals: Mutex<HashMap<GoalId, Goal>>,
    offline: AtomicBool,
    failing_updates: Mutex<HashSet<GoalId>>,
    create_calls: AtomicUsize,
}

impl MemoryGoalStore {
    /// `zone` decides which civil day a goal belongs to for `list`.
    pub fn new(clock: Arc<dyn ClockSource>, zone: ReferenceZone) -> Self {
        Self {
            clock,
            zone,
            goals: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            failing_updates: Mutex::new(HashSet::new()),
            create_calls: AtomicUsize::new(0),
        }
    }

    /// Make every call fail with `Unavailable` until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make updates of `id` fail with `Unavailable`.
    pub fn fail_updates_for(&self, id: GoalId) {
        lock(&self.failing_updates).insert(id);
    }

    pub fn clear_failures(&self) {
        lock(&self.failing_updates).clear();
    }

    /// Number of `create` calls received (batches count once).
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn get(&self, id: GoalId) -> Option<Goal> {
        lock(&self.goals).get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.goals).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RemoteError::Unavailable("remote store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn taken(
    goals: &HashMap<GoalId, Goal>,
    owner: &str,
    target: DateTime<Utc>,
    skip: Option<GoalId>,
) -> bool {
    goals
        .values()
        .any(|g| g.owner_id == owner && g.target == target && Some(g.id) != skip)
}

#[async_trait]
impl RemoteGoalStore for MemoryGoalStore {
    async fn create(&self, rows: Vec<NewGoal>) -> Result<Vec<GoalId>, RemoteError> {
        self.check_online()?;
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.now();
        let mut goals = lock(&self.goals);

        for (i, row) in rows.iter().enumerate() {
            let dup_in_batch = rows[..i]
                .iter()
                .any(|r| r.owner_id == row.owner_id && r.target == row.target);
            if dup_in_batch || taken(&goals, &row.owner_id, row.target, None) {
                return Err(RemoteError::Conflict { target: row.target });
            }
        }

        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            let id = Uuid::new_v4();
            goals.insert(id, Goal::from_row(id, row, now));
            ids.push(id);
        }
        Ok(ids)
    }

    async fn update(&self, id: GoalId, patch: &GoalPatch) -> Result<(), RemoteError> {
        self.check_online()?;
        if lock(&self.failing_updates).contains(&id) {
            return Err(RemoteError::Unavailable(format!("update of {id} failed")));
        }
        let now = self.clock.now();
        let mut goals = lock(&self.goals);
        let owner = match goals.get(&id) {
            Some(goal) => goal.owner_id.clone(),
            None => return Err(RemoteError::NotFound(id)),
        };
        if let Some(target) = patch.target {
            if taken(&goals, &owner, target, Some(id)) {
                return Err(RemoteError::Conflict { target });
            }
        }
        if let Some(goal) = goals.get_mut(&id) {
            patch.apply_to(goal, now);
        }
        Ok(())
    }

    async fn delete(&self, id: GoalId) -> Result<(), RemoteError> {
        self.check_online()?;
        match lock(&self.goals).remove(&id) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(id)),
        }
    }

    async fn list(&self, owner: &str, from: DayKey, to: DayKey) -> Result<Vec<Goal>, RemoteError> {
        self.check_online()?;
        let mut goals: Vec<Goal> = lock(&self.goals)
            .values()
            .filter(|g| g.owner_id == owner)
            .filter(|g| {
                let day = g.day(self.zone);
                day >= from && day <= to
            })
            .cloned()
            .collect();
        goals.sort_by(|a, b| a.target.cmp(&b.target));
        Ok(goals)
    }
}

/// In-memory [`NotificationGateway`] that remembers what is scheduled.
#[derive(Default)]
pub struct MemoryNotifier {
    scheduled: Mutex<BTreeMap<GoalId, (DateTime<Utc>, NotificationPayload)>>,
    failing: AtomicBool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail, to exercise best-effort handling.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fire_at(&self, id: GoalId) -> Option<DateTime<Utc>> {
        lock(&self.scheduled).get(&id).map(|(at, _)| *at)
    }

    pub fn is_scheduled(&self, id: GoalId) -> bool {
        lock(&self.scheduled).contains_key(&id)
    }

    pub fn len(&self) -> usize {
        lock(&self.scheduled).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NotificationGateway for MemoryNotifier {
    async fn schedule(
        &self,
        id: GoalId,
        fire_at: DateTime<Utc>,
        payload: NotificationPayload,
    ) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("notification permission denied");
        }
        lock(&self.scheduled).insert(id, (fire_at, payload));
        Ok(())
    }

    async fn cancel(&self, id: GoalId) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("notification permission denied");
        }
        lock(&self.scheduled).remove(&id);
        Ok(())
    }
}
