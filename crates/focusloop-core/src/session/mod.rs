//! Focus session state machine.
//!
//! ## State transitions
//!
//! ```text
//! Idle -> Running -> (Paused <-> Running) -> (Completed | Canceled)
//! ```
//!
//! `Idle` and the terminal states permit a new `start`. Transitions are
//! strictly sequential per session; invalid requests fail synchronously
//! with [`SessionError`] and nothing is retried internally.
//!
//! The countdown itself is caller-driven: `tick()` advances one second and
//! is invoked by the spawned 1 Hz driver in production, or directly by
//! tests. Every 15th remaining second the countdown is checkpointed to the
//! durable store, which is the recovery point `refresh()` restores from
//! after a process death.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::Publisher;
use crate::error::SessionError;
use crate::model::{
    FocusSession, FrictionEvent, SessionState, DEFAULT_SESSION_DURATION_SECS,
};
use crate::profile::ProfileService;
use crate::store::Database;
use crate::sync::SyncHandle;

/// The countdown is persisted whenever the remaining time crosses a
/// multiple of this many seconds.
pub const CHECKPOINT_INTERVAL_SECS: i64 = 15;

/// Cadence of the spawned tick driver.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Drives the lifecycle of the (single) active focus session per user.
pub struct SessionService {
    db: Arc<Database>,
    profiles: Arc<ProfileService>,
    sync: SyncHandle,
    current_session: Publisher<Option<FocusSession>>,
    session_state: Publisher<SessionState>,
    remaining_time: Publisher<i64>,
    ticker: Mutex<Option<AbortHandle>>,
}

impl SessionService {
    pub fn new(db: Arc<Database>, profiles: Arc<ProfileService>, sync: SyncHandle) -> Arc<Self> {
        Arc::new(Self {
            db,
            profiles,
            sync,
            current_session: Publisher::new(None),
            session_state: Publisher::new(SessionState::Idle),
            remaining_time: Publisher::new(0),
            ticker: Mutex::new(None),
        })
    }

    // ── Observables ──────────────────────────────────────────────────

    pub fn current_session(&self) -> Option<FocusSession> {
        self.current_session.get()
    }

    pub fn state(&self) -> SessionState {
        self.session_state.get()
    }

    pub fn remaining_time(&self) -> i64 {
        self.remaining_time.get()
    }

    pub fn subscribe_current_session(&self) -> watch::Receiver<Option<FocusSession>> {
        self.current_session.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.session_state.subscribe()
    }

    pub fn subscribe_remaining_time(&self) -> watch::Receiver<i64> {
        self.remaining_time.subscribe()
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Start a new session.
    ///
    /// Duration resolution: the explicit argument wins, else the user's
    /// configured default. The linked task's estimate is deliberately not
    /// consulted.
    pub fn start(
        self: &Arc<Self>,
        task_id: Option<Uuid>,
        title: Option<String>,
        duration: Option<i64>,
    ) -> Result<FocusSession, SessionError> {
        if let Some(session) = self.current_session.get() {
            if session.is_active {
                return Err(SessionError::SessionAlreadyActive);
            }
        }
        let user = self
            .profiles
            .current_user()
            .ok_or(SessionError::UserNotAuthenticated)?;
        if self.db.fetch_active_session(user.id)?.is_some() {
            return Err(SessionError::SessionAlreadyActive);
        }

        let duration = match duration {
            Some(explicit) => explicit,
            None => self
                .db
                .fetch_settings(user.id)?
                .map(|s| s.default_session_duration)
                .unwrap_or(DEFAULT_SESSION_DURATION_SECS),
        };
        let task = match task_id {
            Some(id) => self.db.fetch_task(id)?,
            None => None,
        };
        let title = title
            .or_else(|| task.as_ref().map(|t| t.title.clone()))
            .unwrap_or_else(|| "Focus Session".to_string());

        let session =
            self.db
                .create_session(user.id, task.as_ref().map(|t| t.id), &title, duration)?;
        debug!(session = %session.id, duration, "session started");

        self.current_session.publish(Some(session.clone()));
        self.session_state.publish(SessionState::Running);
        self.remaining_time.publish(session.time_remaining);
        self.spawn_ticker();
        self.sync.notify_local_change();
        Ok(session)
    }

    /// Pause the running session, persisting the current remaining time.
    pub fn pause(&self) -> Result<(), SessionError> {
        let session = self
            .current_session
            .get()
            .ok_or(SessionError::NoActiveSession)?;
        if !session.is_active || session.is_paused {
            return Err(SessionError::InvalidStateTransition);
        }

        self.stop_ticker();
        let remaining = self.remaining_time.get();
        self.db.pause_session(session.id, remaining)?;
        let stored = self
            .db
            .fetch_session(session.id)?
            .ok_or(SessionError::SessionNotFound)?;

        self.current_session.publish(Some(stored));
        self.session_state.publish(SessionState::Paused);
        self.sync.notify_local_change();
        Ok(())
    }

    /// Resume a paused session from its last persisted remaining time.
    pub fn resume(self: &Arc<Self>) -> Result<(), SessionError> {
        let session = self
            .current_session
            .get()
            .ok_or(SessionError::NoActiveSession)?;
        if !session.is_active || !session.is_paused {
            return Err(SessionError::InvalidStateTransition);
        }

        self.db.resume_session(session.id)?;
        let stored = self
            .db
            .fetch_session(session.id)?
            .ok_or(SessionError::SessionNotFound)?;

        self.remaining_time.publish(stored.time_remaining);
        self.current_session.publish(Some(stored));
        self.session_state.publish(SessionState::Running);
        self.spawn_ticker();
        self.sync.notify_local_change();
        Ok(())
    }

    /// Complete the active session. Statistics get full credit for the
    /// target duration.
    pub fn complete(&self) -> Result<(), SessionError> {
        let session = self
            .current_session
            .get()
            .ok_or(SessionError::NoActiveSession)?;
        if !session.is_active {
            return Err(SessionError::InvalidStateTransition);
        }

        self.stop_ticker();
        let remaining = self.remaining_time.get();
        self.db.complete_session(session.id, remaining)?;
        debug!(session = %session.id, "session completed");

        self.current_session.publish(None);
        self.session_state.publish(SessionState::Completed);
        self.remaining_time.publish(0);
        self.sync.notify_local_change();
        Ok(())
    }

    /// Cancel the active session. It stays incomplete; statistics only
    /// get credit for the time actually spent.
    pub fn cancel(&self) -> Result<(), SessionError> {
        let session = self
            .current_session
            .get()
            .ok_or(SessionError::NoActiveSession)?;
        if !session.is_active {
            return Err(SessionError::InvalidStateTransition);
        }

        self.stop_ticker();
        let remaining = self.remaining_time.get();
        self.db.cancel_session(session.id, remaining)?;
        debug!(session = %session.id, "session canceled");

        self.current_session.publish(None);
        self.session_state.publish(SessionState::Canceled);
        self.remaining_time.publish(0);
        self.sync.notify_local_change();
        Ok(())
    }

    /// Advance the countdown by one second.
    ///
    /// No-op outside the Running state. Reaching zero completes the
    /// session automatically; every 15th remaining second is checkpointed
    /// to the store (the terminal zero is not — completion persists it).
    pub fn tick(&self) -> Result<(), SessionError> {
        if self.session_state.get() != SessionState::Running {
            return Ok(());
        }
        let Some(session) = self.current_session.get() else {
            return Ok(());
        };

        let remaining = (self.remaining_time.get() - 1).max(0);
        self.remaining_time.publish(remaining);

        if remaining == 0 {
            self.complete()?;
        } else if remaining % CHECKPOINT_INTERVAL_SECS == 0 {
            self.db.checkpoint_time_remaining(session.id, remaining)?;
        }
        Ok(())
    }

    /// Restore the in-flight session after startup or a user change.
    ///
    /// Reads the persisted active session and rebuilds the observable
    /// state and ticker from its flags, without mutating the record.
    pub fn refresh(self: &Arc<Self>) -> Result<(), SessionError> {
        self.stop_ticker();
        let Some(user) = self.profiles.current_user() else {
            self.publish_idle();
            return Ok(());
        };

        match self.db.fetch_active_session(user.id)? {
            Some(session) => {
                let paused = session.is_paused;
                self.remaining_time.publish(session.time_remaining);
                self.current_session.publish(Some(session));
                if paused {
                    self.session_state.publish(SessionState::Paused);
                } else {
                    self.session_state.publish(SessionState::Running);
                    self.spawn_ticker();
                }
            }
            None => self.publish_idle(),
        }
        Ok(())
    }

    // ── Friction events ──────────────────────────────────────────────

    /// Raise a friction event against the current session.
    pub fn create_friction_event(
        &self,
        friction_level: i64,
        task_type: &str,
    ) -> Result<FrictionEvent, SessionError> {
        let session = self
            .current_session
            .get()
            .ok_or(SessionError::NoActiveSession)?;
        let event = self
            .db
            .create_friction_event(session.id, friction_level, task_type)?;
        self.sync.notify_local_change();
        Ok(event)
    }

    /// Record the user's response to a friction event.
    pub fn complete_friction_event(
        &self,
        id: Uuid,
        user_response: Option<&str>,
        response_time: f64,
    ) -> Result<FrictionEvent, SessionError> {
        let event = self
            .db
            .complete_friction_event(id, user_response, response_time)?
            .ok_or(SessionError::FrictionEventNotFound)?;
        self.sync.notify_local_change();
        Ok(event)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn publish_idle(&self) {
        self.current_session.publish(None);
        self.session_state.publish(SessionState::Idle);
        self.remaining_time.publish(0);
    }

    /// Spawn the 1 Hz driver, replacing any previous one. Outside a tokio
    /// runtime the countdown is left to explicit `tick()` calls.
    fn spawn_ticker(self: &Arc<Self>) {
        self.stop_ticker();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let service = Arc::clone(self);
        let task = runtime.spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = service.tick() {
                    warn!("session tick failed: {e}");
                }
                if service.session_state.get() != SessionState::Running {
                    break;
                }
            }
        });
        *self.ticker.lock().unwrap() = Some(task.abort_handle());
    }

    /// Cancel the tick driver synchronously.
    fn stop_ticker(&self) {
        if let Some(handle) = self.ticker.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for SessionService {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.lock().unwrap().take() {
            handle.abort();
        }
    }
}
