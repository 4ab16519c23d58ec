//! Binds one engine to session persistence and completion notifications.
//!
//! The coordinator is the layer a front-end talks to. It forwards commands to
//! the `FocusclockEngine`, keeps a `SessionRecord` per started session, and
//! keeps a single completion notification aligned with the time left. Storage
//! and delivery sit behind the `SessionStore` and `Notifier` traits; the
//! in-tree implementations keep records in memory and only log.
//!
//! Failures of either collaborator are logged and never reach the caller: the
//! timer keeps running whether or not its bookkeeping succeeded.

use crate::common::{SessionId, SessionMode};
use crate::engine::FocusclockEngine;
use crate::events::{FinishCause, SessionEvent, SessionEventKind};
use crate::machine::Transition;
use crate::state::TimerState;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything known about a session when it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub started_at: DateTime<Utc>,
    pub planned: Duration,
    pub mode: SessionMode,
    pub preset_id: Option<String>,
    pub title: String,
}

/// A persisted session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    pub planned: Duration,
    /// Time accounted for when the session ended. Zero until then.
    pub elapsed: Duration,
    pub mode: SessionMode,
    pub preset_id: Option<String>,
    pub title: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Storage trait for pluggable session backends.
pub trait SessionStore: Send + Sync {
    /// Persists a new, not yet completed session and returns its id.
    fn create(&self, session: NewSession) -> anyhow::Result<SessionId>;

    /// Marks a session completed with the time that was accounted for.
    fn mark_completed(&self, id: SessionId, elapsed: Duration) -> anyhow::Result<()>;

    fn set_title(&self, id: SessionId, title: String) -> anyhow::Result<()>;

    fn get(&self, id: SessionId) -> Option<SessionRecord>;

    /// Up to `limit` sessions, newest first.
    fn recent(&self, limit: usize) -> Vec<SessionRecord>;
}

/// Delivery of the "session complete" notification.
///
/// At most one notification is pending at a time; scheduling replaces it.
pub trait Notifier: Send + Sync {
    fn schedule_completion(&self, after: Duration, mode: SessionMode) -> anyhow::Result<()>;

    fn cancel_pending(&self) -> anyhow::Result<()>;
}

/// A `SessionStore` that keeps records in process memory.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    next_id: u64,
    records: Vec<SessionRecord>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new store wrapped in `Arc` for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(
        &self,
        id: SessionId,
        apply: impl FnOnce(&mut SessionRecord),
    ) -> anyhow::Result<()> {
        let mut inner = self.lock();
        let record = inner
            .records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or_else(|| anyhow::anyhow!("no session with id {}", id))?;
        apply(record);
        Ok(())
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, session: NewSession) -> anyhow::Result<SessionId> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = SessionId(inner.next_id);
        inner.records.push(SessionRecord {
            id,
            started_at: session.started_at,
            planned: session.planned,
            elapsed: Duration::ZERO,
            mode: session.mode,
            preset_id: session.preset_id,
            title: session.title,
            completed: false,
            completed_at: None,
        });
        Ok(id)
    }

    fn mark_completed(&self, id: SessionId, elapsed: Duration) -> anyhow::Result<()> {
        self.update(id, |record| {
            record.elapsed = elapsed.min(record.planned);
            record.completed = true;
            record.completed_at = Some(Utc::now());
        })
    }

    fn set_title(&self, id: SessionId, title: String) -> anyhow::Result<()> {
        self.update(id, |record| record.title = title)
    }

    fn get(&self, id: SessionId) -> Option<SessionRecord> {
        self.lock().records.iter().find(|record| record.id == id).cloned()
    }

    fn recent(&self, limit: usize) -> Vec<SessionRecord> {
        self.lock().records.iter().rev().take(limit).cloned().collect()
    }
}

/// A completion notification waiting to be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingNotification {
    pub due: DateTime<Utc>,
    pub mode: SessionMode,
}

/// A `Notifier` that only logs, remembering the last scheduled notification.
#[derive(Debug, Default)]
pub struct LogNotifier {
    pending: Mutex<Option<PendingNotification>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// The notification scheduled last, unless it was cancelled since.
    pub fn pending(&self) -> Option<PendingNotification> {
        *self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Notifier for LogNotifier {
    fn schedule_completion(&self, after: Duration, mode: SessionMode) -> anyhow::Result<()> {
        let after = chrono::Duration::from_std(after)?;
        let due = Utc::now()
            .checked_add_signed(after)
            .ok_or_else(|| anyhow::anyhow!("notification due time out of range"))?;
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(PendingNotification { due, mode });
        info!(%mode, due = %due.format("%H:%M:%S"), "completion notification scheduled");
        Ok(())
    }

    fn cancel_pending(&self) -> anyhow::Result<()> {
        if self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some()
        {
            info!("pending completion notification cancelled");
        }
        Ok(())
    }
}

/// The session the coordinator currently keeps a record open for.
#[derive(Debug, Clone, Copy)]
struct OpenSession {
    record: Option<SessionId>,
    session: u64,
    planned: Duration,
    mode: SessionMode,
}

#[derive(Debug, Default)]
struct Ledger {
    open: Option<OpenSession>,
    /// The record created last, completed or not. Notes attach to it.
    last_record: Option<SessionId>,
    /// Notes jotted for the open session, applied to its record when it ends.
    notes: Option<String>,
}

/// Drives an engine while keeping records and notifications in step with it.
///
/// Operations are serialized among themselves and with the background task
/// that completes records when the engine reports a finished session.
pub struct SessionCoordinator {
    engine: FocusclockEngine,
    store: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
    ledger: Arc<AsyncMutex<Ledger>>,
    observer: JoinHandle<()>,
}

impl SessionCoordinator {
    /// Must be called from within a tokio runtime.
    pub fn new(
        engine: FocusclockEngine,
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let ledger = Arc::new(AsyncMutex::new(Ledger::default()));
        let observer = tokio::spawn(observe(
            engine.subscribe_session_events(),
            ledger.clone(),
            store.clone(),
            notifier.clone(),
        ));
        Self {
            engine,
            store,
            notifier,
            ledger,
            observer,
        }
    }

    pub fn engine(&self) -> &FocusclockEngine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Starts a session and opens a record for it.
    ///
    /// A zero `duration` is ignored and returns `None`. A blank `title` falls
    /// back to the mode's default title.
    pub async fn start(
        &self,
        duration: Duration,
        mode: SessionMode,
        preset_id: Option<String>,
        title: Option<&str>,
    ) -> Option<Transition> {
        if duration.is_zero() {
            debug!("ignoring start with a zero duration");
            return None;
        }
        let mut ledger = self.ledger.lock().await;
        let applied = self.engine.start(duration).await;

        // The previous session may have finished without the observer having
        // caught up yet; its event will no longer match the open session.
        let notes = ledger.notes.take();
        if let Some(previous) = ledger.open.take() {
            if applied.from == TimerState::Finished {
                self.complete(previous.record, previous.planned);
                attach_notes(self.store.as_ref(), previous.record, notes);
            }
        }

        let title = non_blank(title).unwrap_or_else(|| mode.default_title().to_string());
        let record = self
            .store
            .create(NewSession {
                started_at: Utc::now(),
                planned: duration,
                mode,
                preset_id,
                title,
            })
            .map_err(|e| warn!(error = %e, "failed to record session start"))
            .ok();
        ledger.open = Some(OpenSession {
            record,
            session: applied.session,
            planned: duration,
            mode,
        });
        ledger.last_record = record.or(ledger.last_record);

        info!(session = applied.session, %mode, secs = duration.as_secs_f64(), "session started");
        self.schedule(duration, mode);
        Some(applied)
    }

    pub async fn pause(&self) -> Transition {
        let _ledger = self.ledger.lock().await;
        let applied = self.engine.pause().await;
        if applied.changed() {
            self.cancel_notification();
        }
        applied
    }

    pub async fn resume(&self) -> Transition {
        let ledger = self.ledger.lock().await;
        let applied = self.engine.resume().await;
        if applied.changed() {
            self.schedule(applied.remaining_after(), open_mode(&ledger));
        }
        applied
    }

    /// Advances the session. A skip that finishes it is completed by the observer.
    pub async fn skip(&self, by: Duration) -> Transition {
        let ledger = self.ledger.lock().await;
        let applied = self.engine.skip(by).await;
        if applied.changed() && applied.to.is_running() {
            self.schedule(applied.remaining_after(), open_mode(&ledger));
        }
        applied
    }

    /// Keeps `notes` for the open session. They replace the record's title when
    /// the session ends, however it ends. Returns `false` when no session is open.
    pub async fn set_notes(&self, notes: Option<&str>) -> bool {
        let mut ledger = self.ledger.lock().await;
        if ledger.open.is_none() {
            return false;
        }
        ledger.notes = non_blank(notes);
        true
    }

    /// Completes the session now. Non-blank `notes` replace the record's title,
    /// taking precedence over notes kept with `set_notes`.
    pub async fn finish(&self, notes: Option<&str>) -> Transition {
        let mut ledger = self.ledger.lock().await;
        let applied = self.engine.finish().await;
        let notes = non_blank(notes).or_else(|| ledger.notes.take());
        attach_notes(self.store.as_ref(), ledger.last_record, notes);
        applied
    }

    /// Abandons the session, recording the time accounted for at the moment of
    /// stopping. Non-blank `notes` replace the record's title, taking precedence
    /// over notes kept with `set_notes`.
    pub async fn stop(&self, notes: Option<&str>) -> Transition {
        let mut ledger = self.ledger.lock().await;
        let applied = self.engine.stop().await;
        if applied.changed() {
            self.cancel_notification();
            if let Some(open) = ledger.open.take() {
                self.complete(open.record, applied.elapsed_before());
            }
            info!(
                session = applied.session,
                elapsed_secs = applied.elapsed_before().as_secs_f64(),
                "session stopped"
            );
        }
        let notes = non_blank(notes).or_else(|| ledger.notes.take());
        attach_notes(self.store.as_ref(), ledger.last_record, notes);
        applied
    }

    /// The record of the session currently open, if any.
    pub async fn open_record(&self) -> Option<SessionRecord> {
        let record = self.ledger.lock().await.open.and_then(|open| open.record)?;
        self.store.get(record)
    }

    /// Up to `limit` records, newest first.
    pub fn history(&self, limit: usize) -> Vec<SessionRecord> {
        self.store.recent(limit)
    }

    fn complete(&self, record: Option<SessionId>, elapsed: Duration) {
        complete_record(self.store.as_ref(), record, elapsed);
    }

    fn schedule(&self, after: Duration, mode: SessionMode) {
        if let Err(e) = self.notifier.schedule_completion(after, mode) {
            warn!(error = %e, "failed to schedule completion notification");
        }
    }

    fn cancel_notification(&self) {
        cancel_notification(self.notifier.as_ref());
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.observer.abort();
    }
}

/// Completes the open record when the engine reports that its session finished.
async fn observe(
    mut events: broadcast::Receiver<SessionEvent>,
    ledger: Arc<AsyncMutex<Ledger>>,
    store: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "session observer lagged behind the engine");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let SessionEventKind::Finished { planned, cause } = event.kind else {
            continue;
        };

        let mut ledger = ledger.lock().await;
        let Some(open) = ledger.open.filter(|open| open.session == event.session) else {
            debug!(session = event.session, "finished session has no open record");
            continue;
        };
        ledger.open = None;
        complete_record(store.as_ref(), open.record, planned);
        attach_notes(store.as_ref(), open.record, ledger.notes.take());
        if cause != FinishCause::Elapsed {
            cancel_notification(notifier.as_ref());
        }
        info!(session = event.session, ?cause, "session finished");
    }
    debug!("session observer stopped");
}

fn complete_record(store: &dyn SessionStore, record: Option<SessionId>, elapsed: Duration) {
    let Some(record) = record else {
        return;
    };
    if let Err(e) = store.mark_completed(record, elapsed) {
        warn!(%record, error = %e, "failed to mark session completed");
    }
}

fn attach_notes(store: &dyn SessionStore, record: Option<SessionId>, notes: Option<String>) {
    let (Some(record), Some(notes)) = (record, notes) else {
        return;
    };
    if let Err(e) = store.set_title(record, notes) {
        warn!(%record, error = %e, "failed to attach notes to session");
    }
}

fn cancel_notification(notifier: &dyn Notifier) {
    if let Err(e) = notifier.cancel_pending() {
        warn!(error = %e, "failed to cancel completion notification");
    }
}

fn open_mode(ledger: &Ledger) -> SessionMode {
    ledger.open.map(|open| open.mode).unwrap_or_default()
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}
