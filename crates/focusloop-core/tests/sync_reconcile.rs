//! Integration tests for the synchronization engine.
//!
//! The in-memory remote store stands in for the network side; the tests
//! check the reconciliation directions, idempotency, the profile-wins
//! rule, the in-flight guard, and the status contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use proptest::prelude::*;
use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

use focusloop_core::auth::AuthSession;
use focusloop_core::model::{Identity, Task};
use focusloop_core::profile::ProfileService;
use focusloop_core::remote::{
    collections, Document, MemoryRemoteStore, RemoteError, RemoteStore, PROFILE_DOC_ID,
    SETTINGS_DOC_ID,
};
use focusloop_core::store::{Database, NewTask};
use focusloop_core::sync::{
    plan_task_reconcile, RemoteProfileRecord, RemoteSessionRecord, RemoteSettingsRecord,
    RemoteTaskRecord, SyncEngine, SyncError, SyncHandle, SyncStatus,
};

fn identity() -> Identity {
    Identity {
        uid: "auth-1".to_string(),
        display_name: "Ada".to_string(),
        phone_number: "+15550100".to_string(),
        email: Some("ada@example.com".to_string()),
    }
}

struct Harness {
    db: Arc<Database>,
    auth: Arc<AuthSession>,
    profiles: Arc<ProfileService>,
    remote: Arc<MemoryRemoteStore>,
    engine: Arc<SyncEngine>,
}

fn setup(signed_in: bool) -> Harness {
    let db = Arc::new(Database::open_memory().unwrap());
    let auth = Arc::new(AuthSession::new());
    let profiles = ProfileService::new(
        Arc::clone(&db),
        Arc::clone(&auth),
        SyncHandle::disconnected(),
    );
    if signed_in {
        auth.sign_in(identity());
        profiles.refresh_current_user().unwrap();
    }
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = SyncEngine::new(
        Arc::clone(&db),
        Arc::clone(&remote) as Arc<dyn RemoteStore>,
        Arc::clone(&auth),
    );
    Harness {
        db,
        auth,
        profiles,
        remote,
        engine,
    }
}

async fn put_remote_task(harness: &Harness, record: &RemoteTaskRecord) {
    harness
        .remote
        .set(
            "auth-1",
            collections::TASKS,
            &record.doc_id,
            record.to_fields().unwrap(),
            false,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn full_sync_fails_fast_without_identity() {
    let h = setup(false);
    let err = h.engine.perform_full_sync().await.unwrap_err();
    assert!(matches!(err, SyncError::NotAuthenticated));
    assert!(matches!(
        h.engine.status().get(),
        SyncStatus::Failed { .. }
    ));
}

#[tokio::test]
async fn full_sync_pushes_profile_settings_and_tasks() {
    let h = setup(true);
    let user = h.profiles.current_user().unwrap();
    h.db.create_task(
        user.id,
        &NewTask {
            title: "alpha".to_string(),
            ..Default::default()
        },
    )
    .unwrap();
    h.db.create_task(
        user.id,
        &NewTask {
            title: "beta".to_string(),
            ..Default::default()
        },
    )
    .unwrap();

    let report = h.engine.perform_full_sync().await.unwrap();
    assert!(report.profile_pushed);
    assert_eq!(report.tasks_pushed, 2);
    assert_eq!(report.tasks_pulled, 0);
    assert_eq!(h.engine.status().get(), SyncStatus::Completed);
    assert!(h.engine.last_sync_time().is_some());

    let profile_doc = h
        .remote
        .get("auth-1", collections::PROFILE, PROFILE_DOC_ID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile_doc.fields["display_name"], "Ada");
    assert!(h
        .remote
        .get("auth-1", collections::SETTINGS, SETTINGS_DOC_ID)
        .await
        .unwrap()
        .is_some());
    assert_eq!(h.remote.len("auth-1", collections::TASKS).await, 2);
}

#[tokio::test]
async fn second_pass_with_no_mutation_writes_nothing() {
    let h = setup(true);
    let user = h.profiles.current_user().unwrap();
    h.db.create_task(
        user.id,
        &NewTask {
            title: "alpha".to_string(),
            ..Default::default()
        },
    )
    .unwrap();

    let first = h.engine.perform_full_sync().await.unwrap();
    assert_eq!(first.tasks_pushed, 1);

    let second = h.engine.perform_full_sync().await.unwrap();
    assert_eq!(second.tasks_pushed, 0);
    assert_eq!(second.tasks_pulled, 0);
    assert_eq!(second.sessions_pushed, 0);
    assert_eq!(second.sessions_pulled, 0);
}

#[tokio::test]
async fn newer_remote_overwrites_local_without_remote_writes() {
    let h = setup(true);
    let user = h.profiles.current_user().unwrap();
    let task = h
        .db
        .create_task(
            user.id,
            &NewTask {
                title: "stale local".to_string(),
                ..Default::default()
            },
        )
        .unwrap();

    let mut record = RemoteTaskRecord::from_task(&task);
    record.title = "fresh remote".to_string();
    record.updated_at = task.updated_at + Duration::hours(2);
    put_remote_task(&h, &record).await;

    let report = h.engine.perform_full_sync().await.unwrap();
    assert_eq!(report.tasks_pulled, 1);
    assert_eq!(report.tasks_pushed, 0);

    let local = h.db.fetch_task(task.id).unwrap().unwrap();
    assert_eq!(local.title, "fresh remote");
    assert_eq!(local.updated_at, record.updated_at);

    // The remote document was not touched.
    let doc = h
        .remote
        .get("auth-1", collections::TASKS, &record.doc_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.fields["title"], "fresh remote");
}

#[tokio::test]
async fn newer_local_pushes_to_existing_remote_document() {
    let h = setup(true);
    let user = h.profiles.current_user().unwrap();
    let task = h
        .db
        .create_task(
            user.id,
            &NewTask {
                title: "fresh local".to_string(),
                ..Default::default()
            },
        )
        .unwrap();

    let mut record = RemoteTaskRecord::from_task(&task);
    record.title = "stale remote".to_string();
    record.updated_at = task.updated_at - Duration::hours(2);
    put_remote_task(&h, &record).await;

    let report = h.engine.perform_full_sync().await.unwrap();
    assert_eq!(report.tasks_pushed, 1);
    assert_eq!(report.tasks_pulled, 0);

    let doc = h
        .remote
        .get("auth-1", collections::TASKS, &record.doc_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.fields["title"], "fresh local");
    // Local kept its own copy.
    assert_eq!(
        h.db.fetch_task(task.id).unwrap().unwrap().title,
        "fresh local"
    );
}

#[tokio::test]
async fn remote_only_task_is_created_locally_for_the_owner() {
    let h = setup(true);
    let user = h.profiles.current_user().unwrap();
    let now = Utc::now();
    let record = RemoteTaskRecord {
        doc_id: Uuid::new_v4().to_string(),
        id: Uuid::new_v4(),
        title: "from other device".to_string(),
        details: None,
        category: None,
        due_date: None,
        priority: 1,
        is_important: false,
        estimated_duration: 1500,
        order: 7,
        is_completed: false,
        completed_date: None,
        created_at: now,
        updated_at: now,
    };
    put_remote_task(&h, &record).await;

    let report = h.engine.perform_full_sync().await.unwrap();
    assert_eq!(report.tasks_pulled, 1);

    let local = h.db.fetch_task(record.id).unwrap().unwrap();
    assert_eq!(local.user_id, user.id);
    assert_eq!(local.title, "from other device");
    assert_eq!(local.order, 7);
}

#[tokio::test]
async fn missing_local_profile_is_pulled_from_remote() {
    let h = setup(false);
    h.auth.sign_in(identity());
    // No local profile created: the engine must pull.
    let profile_record = RemoteProfileRecord {
        display_name: "Remote Ada".to_string(),
        phone_number: "+15550199".to_string(),
        recovery_email: None,
        account_status: "active".to_string(),
        last_active_date: Utc::now(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    h.remote
        .set(
            "auth-1",
            collections::PROFILE,
            PROFILE_DOC_ID,
            profile_record.to_fields().unwrap(),
            false,
        )
        .await
        .unwrap();
    let mut settings_record = RemoteSettingsRecord::defaults();
    settings_record.default_session_duration = 900;
    h.remote
        .set(
            "auth-1",
            collections::SETTINGS,
            SETTINGS_DOC_ID,
            settings_record.to_fields().unwrap(),
            false,
        )
        .await
        .unwrap();

    let report = h.engine.perform_full_sync().await.unwrap();
    assert!(!report.profile_pushed);

    let profile = h.db.fetch_profile_by_auth_uid("auth-1").unwrap().unwrap();
    assert_eq!(profile.display_name, "Remote Ada");
    let settings = h.db.fetch_settings(profile.id).unwrap().unwrap();
    assert_eq!(settings.default_session_duration, 900);
}

#[tokio::test]
async fn empty_both_sides_seeds_remote_from_identity() {
    let h = setup(false);
    h.auth.sign_in(identity());

    h.engine.perform_full_sync().await.unwrap();

    let doc = h
        .remote
        .get("auth-1", collections::PROFILE, PROFILE_DOC_ID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.fields["display_name"], "Ada");
    assert_eq!(doc.fields["phone_number"], "+15550100");
    assert!(h
        .remote
        .get("auth-1", collections::SETTINGS, SETTINGS_DOC_ID)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn local_profile_always_wins_over_remote() {
    let h = setup(true);
    // Remote already has a divergent profile; no timestamps are consulted.
    h.remote
        .set(
            "auth-1",
            collections::PROFILE,
            PROFILE_DOC_ID,
            serde_json::json!({"display_name": "Old Name", "phone_number": "0"}),
            false,
        )
        .await
        .unwrap();

    h.engine.perform_full_sync().await.unwrap();

    let doc = h
        .remote
        .get("auth-1", collections::PROFILE, PROFILE_DOC_ID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.fields["display_name"], "Ada");
}

#[tokio::test]
async fn completed_session_overwrites_in_flight_remote_copy() {
    let h = setup(true);
    let user = h.profiles.current_user().unwrap();
    let session = h.db.create_session(user.id, None, "focus", 1500).unwrap();
    h.db.complete_session(session.id, 0).unwrap();
    let completed = h.db.fetch_session(session.id).unwrap().unwrap();

    let mut record = RemoteSessionRecord::from_session(&completed);
    record.is_completed = false;
    record.is_active = true;
    record.time_remaining = 600;
    record.completion_date = None;
    h.remote
        .set(
            "auth-1",
            collections::SESSIONS,
            &record.doc_id,
            record.to_fields().unwrap(),
            false,
        )
        .await
        .unwrap();

    let report = h.engine.perform_full_sync().await.unwrap();
    assert_eq!(report.sessions_pushed, 1);

    let doc = h
        .remote
        .get("auth-1", collections::SESSIONS, &session.id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.fields["is_completed"], true);
}

#[tokio::test]
async fn remote_only_session_is_created_locally() {
    let h = setup(true);
    let user = h.profiles.current_user().unwrap();
    let now = Utc::now();
    let record = RemoteSessionRecord {
        doc_id: Uuid::new_v4().to_string(),
        id: Uuid::new_v4(),
        task_id: None,
        title: "watch session".to_string(),
        target_duration: 1500,
        time_remaining: 0,
        paused_time: 0,
        duration: 1500,
        is_active: false,
        is_paused: false,
        is_completed: true,
        created_at: now,
        completion_date: Some(now),
    };
    h.remote
        .set(
            "auth-1",
            collections::SESSIONS,
            &record.doc_id,
            record.to_fields().unwrap(),
            false,
        )
        .await
        .unwrap();

    let report = h.engine.perform_full_sync().await.unwrap();
    assert_eq!(report.sessions_pulled, 1);

    let sessions = h.db.fetch_sessions(user.id, 0).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, record.id);
    assert!(sessions[0].is_completed);
}

// A remote that blocks its first `list` call until released, to hold a
// sync pass open while another request arrives.
struct GatedRemote {
    inner: MemoryRemoteStore,
    entered: Notify,
    release: Notify,
    gated: AtomicBool,
}

impl GatedRemote {
    fn new() -> Self {
        Self {
            inner: MemoryRemoteStore::new(),
            entered: Notify::new(),
            release: Notify::new(),
            gated: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl RemoteStore for GatedRemote {
    async fn get(
        &self,
        owner: &str,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<Document>, RemoteError> {
        self.inner.get(owner, collection, doc_id).await
    }

    async fn set(
        &self,
        owner: &str,
        collection: &str,
        doc_id: &str,
        fields: Value,
        merge: bool,
    ) -> Result<(), RemoteError> {
        self.inner.set(owner, collection, doc_id, fields, merge).await
    }

    async fn update(
        &self,
        owner: &str,
        collection: &str,
        doc_id: &str,
        fields: Value,
    ) -> Result<(), RemoteError> {
        self.inner.update(owner, collection, doc_id, fields).await
    }

    async fn list(&self, owner: &str, collection: &str) -> Result<Vec<Document>, RemoteError> {
        if self.gated.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.list(owner, collection).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overlapping_full_syncs_are_coalesced() {
    let db = Arc::new(Database::open_memory().unwrap());
    let auth = Arc::new(AuthSession::new());
    let profiles = ProfileService::new(
        Arc::clone(&db),
        Arc::clone(&auth),
        SyncHandle::disconnected(),
    );
    auth.sign_in(identity());
    profiles.refresh_current_user().unwrap();

    let remote = Arc::new(GatedRemote::new());
    let engine = SyncEngine::new(db, Arc::clone(&remote) as Arc<dyn RemoteStore>, auth);

    let engine_bg = Arc::clone(&engine);
    let first = tokio::spawn(async move { engine_bg.perform_full_sync().await });

    // Wait until the first pass is provably mid-flight.
    remote.entered.notified().await;
    assert_eq!(engine.status().get(), SyncStatus::Syncing);

    let second = engine.perform_full_sync().await.unwrap();
    assert!(second.skipped);
    // A coalesced request emits nothing on the status bus.
    assert_eq!(engine.status().get(), SyncStatus::Syncing);

    remote.release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert!(!first.skipped);
    assert_eq!(engine.status().get(), SyncStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn debounce_collapses_bursts_and_reschedules() {
    use std::time::Duration as StdDuration;

    let h = setup(true);
    let handle = h.engine.handle(StdDuration::from_secs(5));

    // Two writes 3 seconds apart: the second replaces the first timer, so
    // nothing fires at the 5-second mark of the first write.
    handle.notify_local_change();
    tokio::time::advance(StdDuration::from_secs(3)).await;
    handle.notify_local_change();
    tokio::time::advance(StdDuration::from_secs(3)).await;
    assert_eq!(h.engine.status().get(), SyncStatus::Idle);

    // 5 seconds after the second write the single pass runs.
    let mut status_rx = h.engine.status().subscribe();
    tokio::time::advance(StdDuration::from_secs(2)).await;
    loop {
        status_rx.changed().await.unwrap();
        let status = status_rx.borrow_and_update().clone();
        if matches!(status, SyncStatus::Completed | SyncStatus::Failed { .. }) {
            assert_eq!(status, SyncStatus::Completed);
            break;
        }
    }
    assert!(h.engine.last_sync_time().is_some());
}

// ── Reconciliation fixpoint property ─────────────────────────────────

fn task_with(id: Uuid, offset_secs: i64) -> Task {
    let base = Utc::now();
    Task {
        id,
        user_id: Uuid::from_u128(999),
        title: format!("task-{id}"),
        details: None,
        category: None,
        due_date: None,
        priority: 0,
        is_important: false,
        estimated_duration: 1500,
        order: 1,
        is_completed: false,
        completed_date: None,
        created_at: base,
        updated_at: base + Duration::seconds(offset_secs),
    }
}

fn apply_plan(local: &mut Vec<Task>, remote: &mut Vec<RemoteTaskRecord>) {
    let plan = plan_task_reconcile(local, remote);
    for record in &plan.create_local {
        local.push(record.into_task(Uuid::from_u128(999)));
    }
    for task in &plan.create_remote {
        remote.push(RemoteTaskRecord::from_task(task));
    }
    for (task, doc_id) in &plan.push_remote {
        let record = remote.iter_mut().find(|r| &r.doc_id == doc_id).unwrap();
        let mut updated = RemoteTaskRecord::from_task(task);
        updated.doc_id = doc_id.clone();
        *record = updated;
    }
    for record in &plan.pull_local {
        let task = local.iter_mut().find(|t| t.id == record.id).unwrap();
        *task = record.into_task(task.user_id);
    }
}

proptest! {
    // One reconciliation pass reaches a fixpoint: planning again right
    // after applying the plan finds nothing left to do.
    #[test]
    fn reconcile_reaches_fixpoint(
        entries in proptest::collection::vec(
            (0u8..8, 0i64..3, 0i64..3, any::<bool>(), any::<bool>()),
            0..12,
        )
    ) {
        let mut local: Vec<Task> = Vec::new();
        let mut remote: Vec<RemoteTaskRecord> = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for (id_idx, local_off, remote_off, in_local, in_remote) in entries {
            if !seen.insert(id_idx) {
                continue;
            }
            let id = Uuid::from_u128(u128::from(id_idx) + 1);
            if in_local {
                local.push(task_with(id, local_off));
            }
            if in_remote {
                let mut record = RemoteTaskRecord::from_task(&task_with(id, remote_off));
                record.doc_id = format!("doc-{id}");
                remote.push(record);
            }
        }

        apply_plan(&mut local, &mut remote);
        let second = plan_task_reconcile(&local, &remote);
        prop_assert!(second.is_empty());
    }
}
