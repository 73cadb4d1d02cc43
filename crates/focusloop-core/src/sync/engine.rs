//! Bidirectional synchronization between the durable store and the remote
//! document store.
//!
//! Reconciliation is planned as pure data first (`plan_task_reconcile`,
//! `plan_session_reconcile`) and then applied: created-missing on both
//! sides, last-writer-wins by `updated_at` for tasks, progress-wins for
//! sessions. Equal timestamps are a deliberate no-op so repeated passes
//! with no intervening mutation write nothing.
//!
//! All sync work funnels through a single mpsc-consuming worker task, so
//! passes are serialized FIFO and never touch the same rows concurrently.
//! An atomic in-flight flag additionally guarantees at most one full sync
//! at a time for direct callers.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthSession;
use crate::bus::Publisher;
use crate::model::{FocusSession, Identity, Task};
use crate::remote::{collections, RemoteStore, PROFILE_DOC_ID, SETTINGS_DOC_ID};
use crate::store::Database;

use super::types::{
    RemoteProfileRecord, RemoteSessionRecord, RemoteSettingsRecord, RemoteTaskRecord, SyncError,
    SyncReport, SyncStatus, LAST_SYNC_KEY,
};

/// Default quiet period between a local write and the sync it triggers.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(5);

/// Outcome of diffing the local and remote task sets.
#[derive(Debug, Clone, Default)]
pub struct TaskSyncPlan {
    /// Remote-only records to insert locally.
    pub create_local: Vec<RemoteTaskRecord>,
    /// Local-only tasks to create remotely (document id = task id).
    pub create_remote: Vec<Task>,
    /// Present on both sides, local strictly newer: push to the existing
    /// remote document.
    pub push_remote: Vec<(Task, String)>,
    /// Present on both sides, remote strictly newer: overwrite local.
    pub pull_local: Vec<RemoteTaskRecord>,
}

impl TaskSyncPlan {
    pub fn is_empty(&self) -> bool {
        self.create_local.is_empty()
            && self.create_remote.is_empty()
            && self.push_remote.is_empty()
            && self.pull_local.is_empty()
    }
}

/// Diff local and remote task sets.
///
/// Last-writer-wins by `updated_at`, strict comparison in both directions;
/// equal timestamps produce no work, which is what makes a repeated pass
/// idempotent.
pub fn plan_task_reconcile(local: &[Task], remote: &[RemoteTaskRecord]) -> TaskSyncPlan {
    let local_ids: HashSet<Uuid> = local.iter().map(|t| t.id).collect();
    let remote_by_id: HashMap<Uuid, &RemoteTaskRecord> =
        remote.iter().map(|r| (r.id, r)).collect();

    let mut plan = TaskSyncPlan::default();

    for record in remote {
        if !local_ids.contains(&record.id) {
            plan.create_local.push(record.clone());
        }
    }

    for task in local {
        match remote_by_id.get(&task.id) {
            None => plan.create_remote.push(task.clone()),
            Some(record) => {
                if task.updated_at > record.updated_at {
                    plan.push_remote.push((task.clone(), record.doc_id.clone()));
                } else if record.updated_at > task.updated_at {
                    plan.pull_local.push((*record).clone());
                }
                // Equal timestamps: no-op.
            }
        }
    }

    plan
}

/// Outcome of diffing the local and remote session sets.
#[derive(Debug, Clone, Default)]
pub struct SessionSyncPlan {
    pub create_local: Vec<RemoteSessionRecord>,
    pub create_remote: Vec<FocusSession>,
    pub push_remote: Vec<(FocusSession, String)>,
    pub pull_local: Vec<RemoteSessionRecord>,
}

impl SessionSyncPlan {
    pub fn is_empty(&self) -> bool {
        self.create_local.is_empty()
            && self.create_remote.is_empty()
            && self.push_remote.is_empty()
            && self.pull_local.is_empty()
    }
}

/// Diff local and remote session sets.
///
/// Sessions carry no `updated_at`; for copies present on both sides,
/// completion wins: a completed copy overwrites an in-flight one, and two
/// copies in the same completion state are left alone.
pub fn plan_session_reconcile(
    local: &[FocusSession],
    remote: &[RemoteSessionRecord],
) -> SessionSyncPlan {
    let local_ids: HashSet<Uuid> = local.iter().map(|s| s.id).collect();
    let remote_by_id: HashMap<Uuid, &RemoteSessionRecord> =
        remote.iter().map(|r| (r.id, r)).collect();

    let mut plan = SessionSyncPlan::default();

    for record in remote {
        if !local_ids.contains(&record.id) {
            plan.create_local.push(record.clone());
        }
    }

    for session in local {
        match remote_by_id.get(&session.id) {
            None => plan.create_remote.push(session.clone()),
            Some(record) => {
                if session.is_completed && !record.is_completed {
                    plan.push_remote
                        .push((session.clone(), record.doc_id.clone()));
                } else if record.is_completed && !session.is_completed {
                    plan.pull_local.push((*record).clone());
                }
            }
        }
    }

    plan
}

struct SyncRequest;

/// Clonable trigger shared with the session, task, and profile services.
///
/// `notify_local_change` is the debounced path: each call cancels and
/// replaces the pending timer wholesale, so a burst of writes collapses
/// into a single pass. `request_sync` enqueues immediately.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncRequest>,
    pending: Arc<Mutex<Option<AbortHandle>>>,
    debounce: Duration,
}

impl SyncHandle {
    /// A handle wired to nothing; local writes go unnoticed. For tests and
    /// for running without a sync engine.
    pub fn disconnected() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self {
            tx,
            pending: Arc::new(Mutex::new(None)),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Schedule a full sync after the debounce window, replacing any
    /// previously scheduled one.
    pub fn notify_local_change(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            // No runtime to host the timer; degrade to an immediate request.
            let _ = self.tx.send(SyncRequest);
            return;
        };
        let mut pending = self.pending.lock().unwrap();
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        let tx = self.tx.clone();
        let delay = self.debounce;
        let timer = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SyncRequest);
        });
        *pending = Some(timer.abort_handle());
    }

    /// Enqueue a full sync right now, ahead of any pending debounce.
    pub fn request_sync(&self) {
        let _ = self.tx.send(SyncRequest);
    }
}

/// The synchronization engine. Construct once, share by `Arc`.
pub struct SyncEngine {
    db: Arc<Database>,
    remote: Arc<dyn RemoteStore>,
    auth: Arc<AuthSession>,
    status: Publisher<SyncStatus>,
    in_flight: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        db: Arc<Database>,
        remote: Arc<dyn RemoteStore>,
        auth: Arc<AuthSession>,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            remote,
            auth,
            status: Publisher::new(SyncStatus::Idle),
            in_flight: AtomicBool::new(false),
        })
    }

    /// Spawn the serialized background worker and hand out a trigger for
    /// it. Requests drain one at a time, FIFO.
    pub fn handle(self: &Arc<Self>, debounce: Duration) -> SyncHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<SyncRequest>();
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                if let Err(e) = engine.perform_full_sync().await {
                    warn!("background sync failed: {e}");
                }
            }
        });
        SyncHandle {
            tx,
            pending: Arc::new(Mutex::new(None)),
            debounce,
        }
    }

    /// Sync status bus: exactly one `Syncing` per started pass and exactly
    /// one terminal `Completed`/`Failed` after it.
    pub fn status(&self) -> &Publisher<SyncStatus> {
        &self.status
    }

    /// Watermark of the last successful full sync.
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        let raw = self.db.kv_get(LAST_SYNC_KEY).ok().flatten()?;
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Run one full pass: profile, tasks, sessions, watermark.
    ///
    /// Fails fast when no identity is resolvable. A pass that finds
    /// another one already in flight returns a skipped report without
    /// touching the status bus.
    pub async fn perform_full_sync(&self) -> Result<SyncReport, SyncError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("full sync already in flight; request coalesced");
            return Ok(SyncReport::skipped());
        }
        let result = self.run_full_sync().await;
        self.in_flight.store(false, Ordering::SeqCst);
        match &result {
            Ok(report) => {
                info!(
                    tasks_pushed = report.tasks_pushed,
                    tasks_pulled = report.tasks_pulled,
                    sessions_pushed = report.sessions_pushed,
                    sessions_pulled = report.sessions_pulled,
                    "full sync completed"
                );
                self.status.publish(SyncStatus::Completed);
            }
            Err(e) => {
                warn!("full sync failed: {e}");
                self.status.publish(SyncStatus::Failed {
                    reason: e.to_string(),
                });
            }
        }
        result
    }

    async fn run_full_sync(&self) -> Result<SyncReport, SyncError> {
        let identity = self.auth.current().ok_or(SyncError::NotAuthenticated)?;
        self.status.publish(SyncStatus::Syncing);

        let mut report = SyncReport::default();
        report.profile_pushed = self.sync_profile(&identity).await?;
        let (pushed, pulled) = self.sync_tasks(&identity).await?;
        report.tasks_pushed = pushed;
        report.tasks_pulled = pulled;
        let (pushed, pulled) = self.sync_sessions(&identity).await?;
        report.sessions_pushed = pushed;
        report.sessions_pulled = pulled;

        self.db.kv_set(LAST_SYNC_KEY, &Utc::now().to_rfc3339())?;
        Ok(report)
    }

    /// Profile and settings: local always wins when a local profile
    /// exists; otherwise pull, and seed the remote from identity fields if
    /// it is empty too.
    async fn sync_profile(&self, identity: &Identity) -> Result<bool, SyncError> {
        if let Some(profile) = self.db.fetch_profile_by_auth_uid(&identity.uid)? {
            let record = RemoteProfileRecord::from_profile(&profile);
            self.remote
                .set(
                    &identity.uid,
                    collections::PROFILE,
                    PROFILE_DOC_ID,
                    record.to_fields()?,
                    true,
                )
                .await?;
            if let Some(settings) = self.db.fetch_settings(profile.id)? {
                let record = RemoteSettingsRecord::from_settings(&settings);
                self.remote
                    .set(
                        &identity.uid,
                        collections::SETTINGS,
                        SETTINGS_DOC_ID,
                        record.to_fields()?,
                        true,
                    )
                    .await?;
            }
            return Ok(true);
        }

        match self
            .remote
            .get(&identity.uid, collections::PROFILE, PROFILE_DOC_ID)
            .await?
        {
            Some(doc) => {
                let record = RemoteProfileRecord::from_document(&doc)?;
                let profile = self.db.create_profile(
                    &identity.uid,
                    &record.display_name,
                    &record.phone_number,
                    record.recovery_email.as_deref(),
                )?;
                if let Some(settings_doc) = self
                    .remote
                    .get(&identity.uid, collections::SETTINGS, SETTINGS_DOC_ID)
                    .await?
                {
                    let settings = RemoteSettingsRecord::from_document(&settings_doc)?;
                    self.db
                        .update_settings(profile.id, &settings.to_settings_update())?;
                }
                debug!("pulled remote profile for {}", identity.uid);
                Ok(false)
            }
            None => {
                let record = RemoteProfileRecord::seed_from_identity(identity);
                self.remote
                    .set(
                        &identity.uid,
                        collections::PROFILE,
                        PROFILE_DOC_ID,
                        record.to_fields()?,
                        false,
                    )
                    .await?;
                let settings = RemoteSettingsRecord::defaults();
                self.remote
                    .set(
                        &identity.uid,
                        collections::SETTINGS,
                        SETTINGS_DOC_ID,
                        settings.to_fields()?,
                        false,
                    )
                    .await?;
                debug!("seeded remote profile for {}", identity.uid);
                Ok(false)
            }
        }
    }

    async fn sync_tasks(&self, identity: &Identity) -> Result<(usize, usize), SyncError> {
        let Some(profile) = self.db.fetch_profile_by_auth_uid(&identity.uid)? else {
            return Ok((0, 0));
        };
        let local = self.db.fetch_tasks(profile.id, true)?;
        let docs = self.remote.list(&identity.uid, collections::TASKS).await?;
        let mut remote = Vec::with_capacity(docs.len());
        for doc in &docs {
            match RemoteTaskRecord::from_document(doc) {
                Ok(record) => remote.push(record),
                Err(e) => warn!("skipping malformed remote task {}: {e}", doc.id),
            }
        }

        let plan = plan_task_reconcile(&local, &remote);
        let pushed = plan.create_remote.len() + plan.push_remote.len();
        let pulled = plan.create_local.len() + plan.pull_local.len();

        for record in &plan.create_local {
            self.db.insert_synced_task(&record.into_task(profile.id))?;
        }
        for task in &plan.create_remote {
            let record = RemoteTaskRecord::from_task(task);
            self.remote
                .set(
                    &identity.uid,
                    collections::TASKS,
                    &task.id.to_string(),
                    record.to_fields()?,
                    false,
                )
                .await?;
        }
        for (task, doc_id) in &plan.push_remote {
            let record = RemoteTaskRecord::from_task(task);
            self.remote
                .update(&identity.uid, collections::TASKS, doc_id, record.to_fields()?)
                .await?;
        }
        for record in &plan.pull_local {
            self.db.apply_synced_task(&record.into_task(profile.id))?;
        }

        Ok((pushed, pulled))
    }

    async fn sync_sessions(&self, identity: &Identity) -> Result<(usize, usize), SyncError> {
        let Some(profile) = self.db.fetch_profile_by_auth_uid(&identity.uid)? else {
            return Ok((0, 0));
        };
        let local = self.db.fetch_sessions(profile.id, 0)?;
        let docs = self
            .remote
            .list(&identity.uid, collections::SESSIONS)
            .await?;
        let mut remote = Vec::with_capacity(docs.len());
        for doc in &docs {
            match RemoteSessionRecord::from_document(doc) {
                Ok(record) => remote.push(record),
                Err(e) => warn!("skipping malformed remote session {}: {e}", doc.id),
            }
        }

        let plan = plan_session_reconcile(&local, &remote);
        let pushed = plan.create_remote.len() + plan.push_remote.len();
        let pulled = plan.create_local.len() + plan.pull_local.len();

        for record in &plan.create_local {
            self.db
                .insert_synced_session(&record.into_session(profile.id))?;
        }
        for session in &plan.create_remote {
            let record = RemoteSessionRecord::from_session(session);
            self.remote
                .set(
                    &identity.uid,
                    collections::SESSIONS,
                    &session.id.to_string(),
                    record.to_fields()?,
                    false,
                )
                .await?;
        }
        for (session, doc_id) in &plan.push_remote {
            let record = RemoteSessionRecord::from_session(session);
            self.remote
                .update(
                    &identity.uid,
                    collections::SESSIONS,
                    doc_id,
                    record.to_fields()?,
                )
                .await?;
        }
        for record in &plan.pull_local {
            self.db
                .apply_synced_session(&record.into_session(profile.id))?;
        }

        Ok((pushed, pulled))
    }
}
