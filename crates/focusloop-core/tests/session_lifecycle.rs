//! Integration tests for the session lifecycle state machine.
//!
//! These drive the service the way a frontend would: explicit transitions
//! plus manual `tick()` calls standing in for the 1 Hz driver. Paused
//! tokio time keeps the spawned driver from interfering.

use std::sync::Arc;

use focusloop_core::auth::AuthSession;
use focusloop_core::error::SessionError;
use focusloop_core::model::{Identity, SessionState};
use focusloop_core::profile::ProfileService;
use focusloop_core::session::SessionService;
use focusloop_core::store::{Database, NewTask, SettingsUpdate};
use focusloop_core::sync::SyncHandle;

struct Harness {
    db: Arc<Database>,
    auth: Arc<AuthSession>,
    profiles: Arc<ProfileService>,
    sessions: Arc<SessionService>,
}

fn setup() -> Harness {
    let db = Arc::new(Database::open_memory().unwrap());
    let auth = Arc::new(AuthSession::new());
    let profiles = ProfileService::new(
        Arc::clone(&db),
        Arc::clone(&auth),
        SyncHandle::disconnected(),
    );
    auth.sign_in(Identity {
        uid: "auth-1".to_string(),
        display_name: "Ada".to_string(),
        phone_number: "+15550100".to_string(),
        email: None,
    });
    profiles.refresh_current_user().unwrap();
    let sessions = SessionService::new(
        Arc::clone(&db),
        Arc::clone(&profiles),
        SyncHandle::disconnected(),
    );
    Harness {
        db,
        auth,
        profiles,
        sessions,
    }
}

#[tokio::test(start_paused = true)]
async fn start_without_user_fails() {
    let h = setup();
    h.auth.sign_out();
    h.profiles.refresh_current_user().unwrap();
    let err = h.sessions.start(None, None, None).unwrap_err();
    assert!(matches!(err, SessionError::UserNotAuthenticated));
}

#[tokio::test(start_paused = true)]
async fn second_start_fails_with_session_already_active() {
    let h = setup();
    h.sessions.start(None, None, Some(120)).unwrap();
    let err = h.sessions.start(None, None, Some(120)).unwrap_err();
    assert!(matches!(err, SessionError::SessionAlreadyActive));
}

#[tokio::test(start_paused = true)]
async fn double_pause_fails_with_invalid_transition() {
    let h = setup();
    h.sessions.start(None, None, Some(120)).unwrap();
    h.sessions.pause().unwrap();
    let err = h.sessions.pause().unwrap_err();
    assert!(matches!(err, SessionError::InvalidStateTransition));
}

#[tokio::test(start_paused = true)]
async fn resume_requires_paused_state() {
    let h = setup();
    let err = h.sessions.pause().unwrap_err();
    assert!(matches!(err, SessionError::NoActiveSession));

    h.sessions.start(None, None, Some(120)).unwrap();
    let err = h.sessions.resume().unwrap_err();
    assert!(matches!(err, SessionError::InvalidStateTransition));

    h.sessions.pause().unwrap();
    h.sessions.resume().unwrap();
    assert_eq!(h.sessions.state(), SessionState::Running);
}

#[tokio::test(start_paused = true)]
async fn pause_persists_remaining_time_and_counts() {
    let h = setup();
    let session = h.sessions.start(None, None, Some(100)).unwrap();
    for _ in 0..10 {
        h.sessions.tick().unwrap();
    }
    h.sessions.pause().unwrap();

    let stored = h.db.fetch_session(session.id).unwrap().unwrap();
    assert!(stored.is_paused);
    assert_eq!(stored.time_remaining, 90);
    let stats = h.db.fetch_statistics(session.id).unwrap().unwrap();
    assert_eq!(stats.pause_count, 1);
}

#[tokio::test(start_paused = true)]
async fn tick_from_one_completes_with_full_duration() {
    let h = setup();
    let session = h.sessions.start(None, None, Some(1)).unwrap();
    h.sessions.tick().unwrap();

    assert_eq!(h.sessions.state(), SessionState::Completed);
    assert_eq!(h.sessions.remaining_time(), 0);
    assert!(h.sessions.current_session().is_none());

    let stored = h.db.fetch_session(session.id).unwrap().unwrap();
    assert!(stored.is_completed);
    assert_eq!(stored.duration, stored.target_duration);
    let stats = h.db.fetch_statistics(session.id).unwrap().unwrap();
    assert_eq!(stats.total_focus_time, 1);
    assert_eq!(stats.completion_rate, 1.0);
}

#[tokio::test(start_paused = true)]
async fn checkpoints_land_only_on_fifteen_second_marks() {
    let h = setup();
    let session = h.sessions.start(None, None, Some(45)).unwrap();

    // 44..31: no multiple of 15 crossed, store still holds the initial value.
    for _ in 0..14 {
        h.sessions.tick().unwrap();
    }
    let stored = h.db.fetch_session(session.id).unwrap().unwrap();
    assert_eq!(stored.time_remaining, 45);

    // 30: checkpoint.
    h.sessions.tick().unwrap();
    let stored = h.db.fetch_session(session.id).unwrap().unwrap();
    assert_eq!(stored.time_remaining, 30);

    // 29..16: no further write.
    for _ in 0..14 {
        h.sessions.tick().unwrap();
    }
    let stored = h.db.fetch_session(session.id).unwrap().unwrap();
    assert_eq!(stored.time_remaining, 30);

    // 15: checkpoint.
    h.sessions.tick().unwrap();
    let stored = h.db.fetch_session(session.id).unwrap().unwrap();
    assert_eq!(stored.time_remaining, 15);
}

#[tokio::test(start_paused = true)]
async fn full_countdown_emits_one_terminal_state() {
    let h = setup();
    h.sessions.start(None, None, None).unwrap();
    let session = h.sessions.current_session().unwrap();
    assert_eq!(session.target_duration, 1500);

    let mut state_rx = h.sessions.subscribe_state();
    assert_eq!(*state_rx.borrow_and_update(), SessionState::Running);
    let mut remaining_rx = h.sessions.subscribe_remaining_time();

    let mut terminal_events = 0;
    for _ in 0..1500 {
        h.sessions.tick().unwrap();
        if state_rx.has_changed().unwrap() {
            let state = *state_rx.borrow_and_update();
            if state.is_terminal() {
                terminal_events += 1;
                assert_eq!(state, SessionState::Completed);
            }
        }
    }

    assert_eq!(terminal_events, 1);
    assert_eq!(*remaining_rx.borrow_and_update(), 0);
    let stored = h.db.fetch_session(session.id).unwrap().unwrap();
    assert_eq!(stored.duration, 1500);
}

#[tokio::test(start_paused = true)]
async fn cancel_credits_only_elapsed_time() {
    let h = setup();
    let session = h.sessions.start(None, None, Some(100)).unwrap();
    for _ in 0..10 {
        h.sessions.tick().unwrap();
    }
    h.sessions.cancel().unwrap();

    assert_eq!(h.sessions.state(), SessionState::Canceled);
    let stored = h.db.fetch_session(session.id).unwrap().unwrap();
    assert!(!stored.is_completed);
    assert!(!stored.is_active);
    let stats = h.db.fetch_statistics(session.id).unwrap().unwrap();
    assert_eq!(stats.total_focus_time, 10);
    assert_eq!(stats.completion_rate, 0.0);
}

#[tokio::test(start_paused = true)]
async fn at_most_one_active_session_across_transitions() {
    let h = setup();
    let user = h.profiles.current_user().unwrap();

    h.sessions.start(None, None, Some(60)).unwrap();
    assert!(h.db.fetch_active_session(user.id).unwrap().is_some());

    h.sessions.pause().unwrap();
    h.sessions.resume().unwrap();
    h.sessions.complete().unwrap();
    assert!(h.db.fetch_active_session(user.id).unwrap().is_none());

    // Terminal state permits a fresh start.
    h.sessions.start(None, None, Some(60)).unwrap();
    h.sessions.cancel().unwrap();
    assert!(h.db.fetch_active_session(user.id).unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn duration_falls_back_to_settings_not_task_estimate() {
    let h = setup();
    let user = h.profiles.current_user().unwrap();
    h.profiles
        .update_settings(&SettingsUpdate {
            default_session_duration: Some(600),
            ..Default::default()
        })
        .unwrap();
    let task = h
        .db
        .create_task(
            user.id,
            &NewTask {
                title: "deep work".to_string(),
                estimated_duration: Some(1200),
                ..Default::default()
            },
        )
        .unwrap();

    let session = h.sessions.start(Some(task.id), None, None).unwrap();
    assert_eq!(session.target_duration, 600);
    assert_eq!(session.title, "deep work");
    assert_eq!(session.task_id, Some(task.id));
}

#[tokio::test(start_paused = true)]
async fn refresh_recovers_running_session_from_checkpoint() {
    let h = setup();
    let session = h.sessions.start(None, None, Some(100)).unwrap();
    // Tick down to 90 so a checkpoint lands (90 % 15 == 0).
    for _ in 0..10 {
        h.sessions.tick().unwrap();
    }
    drop(h.sessions);

    // A fresh service over the same store stands in for a restarted process.
    let recovered = SessionService::new(
        Arc::clone(&h.db),
        Arc::clone(&h.profiles),
        SyncHandle::disconnected(),
    );
    recovered.refresh().unwrap();

    assert_eq!(recovered.state(), SessionState::Running);
    assert_eq!(recovered.remaining_time(), 90);
    assert_eq!(recovered.current_session().unwrap().id, session.id);
}

#[tokio::test(start_paused = true)]
async fn refresh_recovers_paused_session_without_ticking() {
    let h = setup();
    h.sessions.start(None, None, Some(100)).unwrap();
    for _ in 0..5 {
        h.sessions.tick().unwrap();
    }
    h.sessions.pause().unwrap();
    drop(h.sessions);

    let recovered = SessionService::new(
        Arc::clone(&h.db),
        Arc::clone(&h.profiles),
        SyncHandle::disconnected(),
    );
    recovered.refresh().unwrap();

    assert_eq!(recovered.state(), SessionState::Paused);
    assert_eq!(recovered.remaining_time(), 95);

    // Ticks do nothing while paused.
    recovered.tick().unwrap();
    assert_eq!(recovered.remaining_time(), 95);
}

#[tokio::test(start_paused = true)]
async fn friction_events_attach_to_the_active_session() {
    let h = setup();
    let err = h.sessions.create_friction_event(2, "breathing").unwrap_err();
    assert!(matches!(err, SessionError::NoActiveSession));

    let session = h.sessions.start(None, None, Some(60)).unwrap();
    let event = h.sessions.create_friction_event(2, "breathing").unwrap();
    let stats = h.db.fetch_statistics(session.id).unwrap().unwrap();
    assert_eq!(stats.friction_count, 1);

    let completed = h
        .sessions
        .complete_friction_event(event.id, Some("ok"), 3.5)
        .unwrap();
    assert!(completed.is_completed);

    let err = h
        .sessions
        .complete_friction_event(uuid::Uuid::new_v4(), None, 0.0)
        .unwrap_err();
    assert!(matches!(err, SessionError::FrictionEventNotFound));
}
