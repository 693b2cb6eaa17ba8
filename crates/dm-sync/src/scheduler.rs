// scheduler.rs — SyncScheduler: when to reconcile with the remote store.
//
// Triggers:
//   notify_action(kind)   → queue the action; if foreground, idle, and the
//                           min interval has passed, sync kind's domain now
//   on_foreground_enter() → full reconciliation, then start the ticker
//   tick()                → every tick_interval while foreground; syncs the
//                           queued domains, or everything after max_idle
//   on_foreground_exit()  → stop the ticker, one best-effort sync of the queue
//
// At most one reconciliation runs at a time (the in-flight flag). A request
// that finds a sync running either polls for a short bound (critical
// actions) or is left for the next tick. Failures are logged and retried at
// the next natural trigger; callers only ever see a SyncOutcome.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dm_clock::ClockSource;
use dm_store::json::{get_json, set_json};
use dm_store::KeyValueStore;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::action::{ActionKind, PendingAction, SyncScope};
use crate::config::SyncConfig;

/// Key under which the pending queue is persisted.
const PENDING_KEY: &str = "sync/pending";

/// Performs one reconciliation pass against the remote store.
#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn reconcile(&self, scope: &SyncScope) -> anyhow::Result<()>;
}

/// What a trigger ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A reconciliation ran and succeeded.
    Ran(SyncScope),
    /// Nothing ran now; queued work waits for the next trigger.
    Deferred,
    /// Nothing needed syncing.
    Idle,
    /// A reconciliation ran and failed; it will be retried later.
    Failed,
}

/// Point-in-time view of the scheduler, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub foreground: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub pending: usize,
    pub in_flight: bool,
    pub completed_runs: u64,
    pub ticker_running: bool,
}

#[derive(Default)]
struct State {
    foreground: bool,
    last_sync: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
    pending: VecDeque<PendingAction>,
    next_seq: u64,
}

struct Inner {
    config: SyncConfig,
    clock: Arc<dyn ClockSource>,
    reconciler: Arc<dyn Reconciler>,
    store: Option<Arc<dyn KeyValueStore>>,
    state: Mutex<State>,
    in_flight: AtomicBool,
    completed_runs: AtomicU64,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

/// Clears the in-flight flag when a sync finishes, fails, or is cancelled.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// The sync scheduler. Clones share one state.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<Inner>,
}

impl SyncScheduler {
    /// A scheduler whose queue lives only in memory.
    pub fn new(
        config: SyncConfig,
        clock: Arc<dyn ClockSource>,
        reconciler: Arc<dyn Reconciler>,
    ) -> Self {
        Self::build(config, clock, reconciler, None)
    }

    /// A scheduler that persists its queue in `store` and restores it now.
    pub fn with_store(
        config: SyncConfig,
        clock: Arc<dyn ClockSource>,
        reconciler: Arc<dyn Reconciler>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self::build(config, clock, reconciler, Some(store))
    }

    fn build(
        config: SyncConfig,
        clock: Arc<dyn ClockSource>,
        reconciler: Arc<dyn Reconciler>,
        store: Option<Arc<dyn KeyValueStore>>,
    ) -> Self {
        let mut state = State::default();
        if let Some(store) = &store {
            match get_json::<Vec<PendingAction>>(store.as_ref(), PENDING_KEY) {
                Ok(Some(saved)) => {
                    state.next_seq = saved.iter().map(|a| a.seq + 1).max().unwrap_or(0);
                    state.pending = saved.into_iter().collect();
                    while state.pending.len() > config.queue_capacity {
                        state.pending.pop_front();
                    }
                    debug!(pending = state.pending.len(), "restored sync queue");
                }
                Ok(None) => {}
                Err(e) => warn!("could not restore sync queue, starting empty: {}", e),
            }
        }
        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                reconciler,
                store,
                state: Mutex::new(state),
                in_flight: AtomicBool::new(false),
                completed_runs: AtomicU64::new(0),
                ticker: Mutex::new(None),
            }),
        }
    }

    /// Record an action and sync its domain now if conditions allow.
    pub async fn notify_action(&self, kind: ActionKind, detail: Option<String>) -> SyncOutcome {
        let now = self.inner.clock.now();
        let due = {
            let mut state = self.lock_state();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.pending.push_back(PendingAction {
                seq,
                kind,
                detail,
                queued_at: now,
            });
            while state.pending.len() > self.inner.config.queue_capacity {
                if let Some(dropped) = state.pending.pop_front() {
                    debug!(kind = %dropped.kind, "sync queue full, dropped oldest action");
                }
            }
            let interval_ok = state
                .last_attempt
                .map_or(true, |t| now - t >= self.inner.config.min_foreground_interval());
            state.foreground && interval_ok
        };
        self.persist_queue();

        if !due {
            debug!(kind = %kind, "sync deferred to next tick");
            return SyncOutcome::Deferred;
        }
        match self.acquire(kind.is_critical()).await {
            Some(guard) => self.run(guard, SyncScope::only(kind.domain())).await,
            None => {
                debug!(kind = %kind, "sync in flight, deferred");
                SyncOutcome::Deferred
            }
        }
    }

    /// One ticker firing. Syncs queued domains, or everything once the
    /// scheduler has been idle for `max_idle`.
    pub async fn tick(&self) -> SyncOutcome {
        let now = self.inner.clock.now();
        let scope = {
            let state = self.lock_state();
            if !state.foreground {
                return SyncOutcome::Idle;
            }
            if !state.pending.is_empty() {
                Some(SyncScope::for_actions(&state.pending))
            } else if state
                .last_sync
                .map_or(true, |t| now - t >= self.inner.config.max_idle())
            {
                Some(SyncScope::Full)
            } else {
                None
            }
        };
        let Some(scope) = scope else {
            return SyncOutcome::Idle;
        };
        match self.acquire(false).await {
            Some(guard) => self.run(guard, scope).await,
            None => SyncOutcome::Deferred,
        }
    }

    /// The app came to the foreground: reconcile everything, then tick.
    pub async fn on_foreground_enter(&self) -> SyncOutcome {
        self.lock_state().foreground = true;
        let outcome = match self.acquire(true).await {
            Some(guard) => self.run(guard, SyncScope::Full).await,
            None => SyncOutcome::Deferred,
        };
        self.start_ticker();
        outcome
    }

    /// The app went to the background: stop ticking and flush the queue once.
    pub async fn on_foreground_exit(&self) -> SyncOutcome {
        self.lock_state().foreground = false;
        self.stop_ticker();
        let scope = {
            let state = self.lock_state();
            if state.pending.is_empty() {
                None
            } else {
                Some(SyncScope::for_actions(&state.pending))
            }
        };
        let Some(scope) = scope else {
            return SyncOutcome::Idle;
        };
        match self.acquire(false).await {
            Some(guard) => self.run(guard, scope).await,
            None => SyncOutcome::Deferred,
        }
    }

    /// Stop the ticker and leave the foreground. Used on session teardown.
    pub fn shutdown(&self) {
        self.lock_state().foreground = false;
        self.stop_ticker();
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.lock_state();
        SchedulerStatus {
            foreground: state.foreground,
            last_sync: state.last_sync,
            last_attempt: state.last_attempt,
            pending: state.pending.len(),
            in_flight: self.inner.in_flight.load(Ordering::Acquire),
            completed_runs: self.inner.completed_runs.load(Ordering::Relaxed),
            ticker_running: self.ticker_running(),
        }
    }

    pub fn pending(&self) -> Vec<PendingAction> {
        self.lock_state().pending.iter().cloned().collect()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn try_acquire(&self) -> Option<FlightGuard<'_>> {
        self.inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                flag: &self.inner.in_flight,
            })
    }

    /// Take the single-flight slot. Critical callers poll for up to
    /// `critical_wait`; others give up immediately.
    async fn acquire(&self, critical: bool) -> Option<FlightGuard<'_>> {
        if let Some(guard) = self.try_acquire() {
            return Some(guard);
        }
        if !critical {
            return None;
        }
        let deadline = tokio::time::Instant::now() + self.inner.config.critical_wait();
        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(self.inner.config.critical_poll()).await;
            if let Some(guard) = self.try_acquire() {
                return Some(guard);
            }
        }
        None
    }

    async fn run(&self, _guard: FlightGuard<'_>, scope: SyncScope) -> SyncOutcome {
        let covered_below = {
            let mut state = self.lock_state();
            state.last_attempt = Some(self.inner.clock.now());
            state.next_seq
        };

        match self.inner.reconciler.reconcile(&scope).await {
            Ok(()) => {
                {
                    let mut state = self.lock_state();
                    state.last_sync = Some(self.inner.clock.now());
                    // Actions queued while the pass ran stay for the next one.
                    state
                        .pending
                        .retain(|a| a.seq >= covered_below || !scope.covers(a.kind.domain()));
                }
                self.persist_queue();
                self.inner.completed_runs.fetch_add(1, Ordering::Relaxed);
                info!(scope = %scope, "sync completed");
                SyncOutcome::Ran(scope)
            }
            Err(e) => {
                warn!(scope = %scope, "sync failed, will retry at next trigger: {:#}", e);
                SyncOutcome::Failed
            }
        }
    }

    fn persist_queue(&self) {
        let Some(store) = &self.inner.store else {
            return;
        };
        let snapshot: Vec<PendingAction> = self.pending();
        if let Err(e) = set_json(store.as_ref(), PENDING_KEY, &snapshot) {
            warn!("could not persist sync queue: {}", e);
        }
    }

    fn start_ticker(&self) {
        let mut slot = self.inner.ticker.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.tick_interval();
        *slot = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                SyncScheduler { inner }.tick().await;
            }
        }));
        debug!(period_secs = period.as_secs(), "sync ticker started");
    }

    fn stop_ticker(&self) {
        let handle = self
            .inner
            .ticker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("sync ticker stopped");
        }
    }

    fn ticker_running(&self) -> bool {
        self.inner
            .ticker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}
