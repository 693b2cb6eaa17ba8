// session.rs — GoalSession: one task owns the engine, everyone else talks
// to it through a SessionHandle.
//
// Tasks started per session:
//   actor: receives Commands over mpsc, applies them one at a time in
//          arrival order, answers on a oneshot
//   sweep: posts a Sweep command every `sweep.interval_secs`
//
// Readers use the watch-channel snapshot and never queue behind mutations.
// `shutdown()` bumps the session epoch first, so a remote call that is in
// flight when the session closes has its result discarded (SessionClosed),
// then stops the sweep timer and the sync ticker and wakes the actor so it
// exits and drops the engine.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dm_clock::DayKey;
use dm_goal::{Goal, GoalEdit, GoalError, GoalId};
use dm_streak::Badge;
use dm_sync::{SyncOutcome, SyncScheduler};
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{GoalDraft, GoalLifecycleEngine, GoalSnapshot, SessionEpoch, SweepReport};

/// Command queue depth. Senders wait when it is full.
const COMMAND_BUFFER: usize = 64;

/// Signal from the host app's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycle {
    Foreground,
    Background,
}

type Reply<T> = oneshot::Sender<Result<T, GoalError>>;

enum Command {
    Load {
        from: DayKey,
        to: DayKey,
        reply: Reply<usize>,
    },
    Create {
        draft: GoalDraft,
        reply: Reply<Goal>,
    },
    CreateBatch {
        drafts: Vec<GoalDraft>,
        reply: Reply<Vec<Goal>>,
    },
    Update {
        id: GoalId,
        edit: GoalEdit,
        reply: Reply<Goal>,
    },
    Delete {
        id: GoalId,
        reply: Reply<()>,
    },
    Confirm {
        id: GoalId,
        note: Option<String>,
        reply: Reply<Badge>,
    },
    Editable {
        id: GoalId,
        reply: Reply<bool>,
    },
    RecordReflection {
        reply: Reply<DayKey>,
    },
    /// From the sweep timer (no reply) or an explicit request.
    Sweep {
        reply: Option<Reply<SweepReport>>,
    },
    Lifecycle {
        signal: AppLifecycle,
        reply: oneshot::Sender<Option<SyncOutcome>>,
    },
}

/// Starts sessions.
pub struct GoalSession;

impl GoalSession {
    /// Move `engine` into a new actor task and start the sweep timer.
    /// Must be called inside a tokio runtime.
    pub fn spawn(engine: GoalLifecycleEngine, sweep_interval: Duration) -> SessionHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let snapshot = engine.subscribe();
        let epoch = engine.epoch();
        let opened_at = epoch.current();
        let sync = engine.sync().cloned();
        let stop = Arc::new(Notify::new());

        tokio::spawn(run_actor(engine, rx, Arc::clone(&stop)));
        let sweeper = tokio::spawn(run_sweep_timer(tx.downgrade(), sweep_interval));
        info!(sweep_secs = sweep_interval.as_secs(), "goal session started");

        SessionHandle {
            tx,
            snapshot,
            epoch,
            opened_at,
            sync,
            sweeper: Arc::new(Mutex::new(Some(sweeper))),
            stop,
        }
    }
}

async fn run_actor(
    mut engine: GoalLifecycleEngine,
    mut rx: mpsc::Receiver<Command>,
    stop: Arc<Notify>,
) {
    let epoch = engine.epoch();
    let opened_at = epoch.current();
    loop {
        tokio::select! {
            biased;
            _ = stop.notified() => break,
            cmd = rx.recv() => {
                let Some(cmd) = cmd else {
                    break;
                };
                handle(&mut engine, cmd).await;
            }
        }
        if epoch.current() != opened_at {
            break;
        }
    }
    debug!("goal session actor stopped");
}

async fn handle(engine: &mut GoalLifecycleEngine, cmd: Command) {
    match cmd {
        Command::Load { from, to, reply } => {
            let _ = reply.send(engine.load(from, to).await);
        }
        Command::Create { draft, reply } => {
            let _ = reply.send(engine.create(draft).await);
        }
        Command::CreateBatch { drafts, reply } => {
            let _ = reply.send(engine.create_batch(drafts).await);
        }
        Command::Update { id, edit, reply } => {
            let _ = reply.send(engine.update(id, edit).await);
        }
        Command::Delete { id, reply } => {
            let _ = reply.send(engine.delete(id).await);
        }
        Command::Confirm { id, note, reply } => {
            let _ = reply.send(engine.confirm_success(id, note).await);
        }
        Command::Editable { id, reply } => {
            let _ = reply.send(engine.editable(id));
        }
        Command::RecordReflection { reply } => {
            let _ = reply.send(engine.record_reflection().await);
        }
        Command::Sweep { reply } => {
            let result = engine.sweep_expired().await;
            match reply {
                Some(reply) => {
                    let _ = reply.send(result);
                }
                None => {
                    if let Err(e) = result {
                        warn!("scheduled sweep failed: {}", e);
                    }
                }
            }
        }
        Command::Lifecycle { signal, reply } => {
            let _ = reply.send(on_lifecycle(engine, signal).await);
        }
    }
}

/// Foreground: sweep what expired while away, then a full sync. Background:
/// flush the sync queue.
async fn on_lifecycle(
    engine: &mut GoalLifecycleEngine,
    signal: AppLifecycle,
) -> Option<SyncOutcome> {
    match signal {
        AppLifecycle::Foreground => {
            match engine.sweep_expired().await {
                Ok(report) if !report.expired.is_empty() => {
                    info!(expired = report.expired.len(), "expired goals swept on foreground");
                }
                Ok(_) => {}
                Err(e) => warn!("foreground sweep failed: {}", e),
            }
            match engine.sync() {
                Some(sync) => Some(sync.on_foreground_enter().await),
                None => None,
            }
        }
        AppLifecycle::Background => match engine.sync() {
            Some(sync) => Some(sync.on_foreground_exit().await),
            None => None,
        },
    }
}

/// Posts Sweep commands until the session's command channel closes.
async fn run_sweep_timer(tx: mpsc::WeakSender<Command>, period: Duration) {
    loop {
        tokio::time::sleep(period).await;
        let Some(tx) = tx.upgrade() else {
            break;
        };
        if tx.send(Command::Sweep { reply: None }).await.is_err() {
            break;
        }
    }
}

/// Cheap-to-clone access to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
    snapshot: watch::Receiver<GoalSnapshot>,
    epoch: SessionEpoch,
    opened_at: u64,
    sync: Option<SyncScheduler>,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
    stop: Arc<Notify>,
}

impl SessionHandle {
    pub async fn load(&self, from: DayKey, to: DayKey) -> Result<usize, GoalError> {
        self.request(|reply| Command::Load { from, to, reply }).await
    }

    pub async fn create(
        &self,
        title: impl Into<String>,
        target: DateTime<Utc>,
    ) -> Result<Goal, GoalError> {
        let draft = GoalDraft::new(title, target);
        self.request(|reply| Command::Create { draft, reply }).await
    }

    pub async fn create_batch(&self, drafts: Vec<GoalDraft>) -> Result<Vec<Goal>, GoalError> {
        self.request(|reply| Command::CreateBatch { drafts, reply }).await
    }

    pub async fn update(&self, id: GoalId, edit: GoalEdit) -> Result<Goal, GoalError> {
        self.request(|reply| Command::Update { id, edit, reply }).await
    }

    pub async fn delete(&self, id: GoalId) -> Result<(), GoalError> {
        self.request(|reply| Command::Delete { id, reply }).await
    }

    pub async fn confirm_success(
        &self,
        id: GoalId,
        note: Option<String>,
    ) -> Result<Badge, GoalError> {
        self.request(|reply| Command::Confirm { id, note, reply }).await
    }

    pub async fn editable(&self, id: GoalId) -> Result<bool, GoalError> {
        self.request(|reply| Command::Editable { id, reply }).await
    }

    pub async fn record_reflection(&self) -> Result<DayKey, GoalError> {
        self.request(|reply| Command::RecordReflection { reply }).await
    }

    /// Run an expiration sweep now, in order with other commands.
    pub async fn sweep_expired(&self) -> Result<SweepReport, GoalError> {
        self.request(|reply| Command::Sweep { reply: Some(reply) }).await
    }

    /// Feed an app-lifecycle signal. Returns what the sync scheduler did,
    /// if one is attached.
    pub async fn lifecycle(
        &self,
        signal: AppLifecycle,
    ) -> Result<Option<SyncOutcome>, GoalError> {
        self.ensure_open()?;
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Lifecycle { signal, reply })
            .await
            .map_err(|_| GoalError::SessionClosed)?;
        rx.await.map_err(|_| GoalError::SessionClosed)
    }

    /// The last committed snapshot.
    pub fn snapshot(&self) -> GoalSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GoalSnapshot> {
        self.snapshot.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.epoch.current() != self.opened_at
    }

    /// Tear the session down: discard in-flight results, stop the sweep
    /// timer and the sync ticker. Idempotent.
    pub fn shutdown(&self) {
        if !self.is_closed() {
            self.epoch.bump();
        }
        // Stored as a permit if the actor is mid-command.
        self.stop.notify_one();
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        if let Some(sync) = &self.sync {
            sync.shutdown();
        }
        info!("goal session shut down");
    }

    fn ensure_open(&self) -> Result<(), GoalError> {
        if self.is_closed() {
            Err(GoalError::SessionClosed)
        } else {
            Ok(())
        }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, GoalError> {
        self.ensure_open()?;
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| GoalError::SessionClosed)?;
        rx.await.map_err(|_| GoalError::SessionClosed)?
    }
}
