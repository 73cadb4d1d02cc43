//! SQLite-based durable store for profiles, tasks, sessions, and statistics.
//!
//! Every logical operation runs inside its own scoped transaction: commit on
//! success, discard on error. Callers never share row objects across
//! operations; mutating methods re-resolve rows by identifier inside their
//! transaction, so a stale in-memory copy can never corrupt the store.
//!
//! Timestamps are stored as RFC 3339 text, identifiers as UUID text.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use uuid::Uuid;

use super::data_dir;
use crate::error::DatabaseError;
use crate::model::{
    clamp, AccountStatus, FocusSession, FrictionEvent, SessionStatistics, Task, UserProfile,
    UserSettings, DEFAULT_SESSION_DURATION_SECS, FRICTION_LEVEL_RANGE, PRIORITY_RANGE,
};

/// Fields for a new task. Order is assigned by the store.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub details: Option<String>,
    pub category: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: i64,
    pub is_important: bool,
    pub estimated_duration: Option<i64>,
}

/// Partial task update; only supplied fields change.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub details: Option<String>,
    pub category: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<i64>,
    pub is_important: Option<bool>,
    pub estimated_duration: Option<i64>,
}

/// Partial settings update; only supplied fields change.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub theme: Option<String>,
    pub default_session_duration: Option<i64>,
    pub friction_enabled: Option<bool>,
    pub friction_level: Option<i64>,
    pub haptic_enabled: Option<bool>,
    pub notifications_enabled: Option<bool>,
    pub show_completed_tasks: Option<bool>,
    pub sync_across_devices: Option<bool>,
}

/// SQLite database behind a mutex; safe to share via `Arc` across the
/// session service, task service, and the sync worker.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `~/.config/focusloop/focusloop.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let path = data_dir()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
            .join("focusloop.db");
        Self::open_at(path)
    }

    /// Open the database at an explicit path.
    pub fn open_at(path: PathBuf) -> Result<Self, DatabaseError> {
        let conn = Connection::open(&path).map_err(|source| DatabaseError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_profiles (
                id               TEXT PRIMARY KEY,
                auth_uid         TEXT NOT NULL UNIQUE,
                display_name     TEXT NOT NULL,
                phone_number     TEXT NOT NULL,
                recovery_email   TEXT,
                created_at       TEXT NOT NULL,
                updated_at       TEXT NOT NULL,
                last_active_date TEXT NOT NULL,
                account_status   TEXT NOT NULL DEFAULT 'active'
            );

            CREATE TABLE IF NOT EXISTS user_settings (
                user_id                  TEXT PRIMARY KEY REFERENCES user_profiles(id),
                theme                    TEXT NOT NULL DEFAULT 'system',
                default_session_duration INTEGER NOT NULL DEFAULT 1500,
                friction_enabled         INTEGER NOT NULL DEFAULT 1,
                friction_level           INTEGER NOT NULL DEFAULT 2,
                haptic_enabled           INTEGER NOT NULL DEFAULT 1,
                notifications_enabled    INTEGER NOT NULL DEFAULT 1,
                show_completed_tasks     INTEGER NOT NULL DEFAULT 0,
                sync_across_devices      INTEGER NOT NULL DEFAULT 1,
                created_at               TEXT NOT NULL,
                updated_at               TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id                 TEXT PRIMARY KEY,
                user_id            TEXT NOT NULL REFERENCES user_profiles(id),
                title              TEXT NOT NULL,
                details            TEXT,
                category           TEXT,
                due_date           TEXT,
                priority           INTEGER NOT NULL DEFAULT 0,
                is_important       INTEGER NOT NULL DEFAULT 0,
                estimated_duration INTEGER NOT NULL DEFAULT 1500,
                sort_order         INTEGER NOT NULL DEFAULT 0,
                is_completed       INTEGER NOT NULL DEFAULT 0,
                completed_date     TEXT,
                created_at         TEXT NOT NULL,
                updated_at         TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS focus_sessions (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES user_profiles(id),
                task_id         TEXT,
                title           TEXT NOT NULL,
                target_duration INTEGER NOT NULL,
                time_remaining  INTEGER NOT NULL,
                paused_time     INTEGER NOT NULL DEFAULT 0,
                duration        INTEGER NOT NULL DEFAULT 0,
                is_active       INTEGER NOT NULL DEFAULT 0,
                is_paused       INTEGER NOT NULL DEFAULT 0,
                is_completed    INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                completion_date TEXT
            );

            CREATE TABLE IF NOT EXISTS session_statistics (
                session_id        TEXT PRIMARY KEY REFERENCES focus_sessions(id),
                total_focus_time  INTEGER NOT NULL DEFAULT 0,
                total_pause_time  INTEGER NOT NULL DEFAULT 0,
                pause_count       INTEGER NOT NULL DEFAULT 0,
                friction_count    INTEGER NOT NULL DEFAULT 0,
                distraction_count INTEGER NOT NULL DEFAULT 0,
                completion_rate   REAL NOT NULL DEFAULT 0.0,
                created_at        TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS friction_events (
                id              TEXT PRIMARY KEY,
                session_id      TEXT NOT NULL REFERENCES focus_sessions(id),
                friction_level  INTEGER NOT NULL,
                task_type       TEXT NOT NULL,
                is_completed    INTEGER NOT NULL DEFAULT 0,
                user_response   TEXT,
                response_time   REAL NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                completion_date TEXT
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_user
                ON tasks(user_id, is_completed, sort_order);
            CREATE INDEX IF NOT EXISTS idx_sessions_user_created
                ON focus_sessions(user_id, created_at);
            -- At most one active session per user, enforced at the storage layer.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_active
                ON focus_sessions(user_id) WHERE is_active = 1;",
        )?;
        Ok(())
    }

    // ── Profiles ─────────────────────────────────────────────────────

    /// Create a profile plus its default settings row, atomically.
    pub fn create_profile(
        &self,
        auth_uid: &str,
        display_name: &str,
        phone_number: &str,
        recovery_email: Option<&str>,
    ) -> Result<UserProfile, DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();
        let id = Uuid::new_v4();

        tx.execute(
            "INSERT INTO user_profiles
                 (id, auth_uid, display_name, phone_number, recovery_email,
                  created_at, updated_at, last_active_date, account_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?6, 'active')",
            params![
                id.to_string(),
                auth_uid,
                display_name,
                phone_number,
                recovery_email,
                now.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "INSERT INTO user_settings (user_id, created_at, updated_at)
             VALUES (?1, ?2, ?2)",
            params![id.to_string(), now.to_rfc3339()],
        )?;
        tx.commit()?;

        Ok(UserProfile {
            id,
            auth_uid: auth_uid.to_string(),
            display_name: display_name.to_string(),
            phone_number: phone_number.to_string(),
            recovery_email: recovery_email.map(str::to_string),
            created_at: now,
            updated_at: now,
            last_active_date: now,
            account_status: AccountStatus::Active,
        })
    }

    pub fn fetch_profile_by_auth_uid(
        &self,
        auth_uid: &str,
    ) -> Result<Option<UserProfile>, DatabaseError> {
        let conn = self.conn.lock().unwrap();
        let profile = conn
            .query_row(
                &format!("SELECT {PROFILE_COLS} FROM user_profiles WHERE auth_uid = ?1"),
                params![auth_uid],
                row_to_profile,
            )
            .optional()?;
        Ok(profile)
    }

    pub fn fetch_profile(&self, id: Uuid) -> Result<Option<UserProfile>, DatabaseError> {
        let conn = self.conn.lock().unwrap();
        let profile = conn
            .query_row(
                &format!("SELECT {PROFILE_COLS} FROM user_profiles WHERE id = ?1"),
                params![id.to_string()],
                row_to_profile,
            )
            .optional()?;
        Ok(profile)
    }

    /// Overwrite the identity-sourced fields of a profile and mark it
    /// active now. Used when authentication re-confirms the user.
    pub fn update_profile_identity(
        &self,
        id: Uuid,
        display_name: &str,
        phone_number: &str,
        recovery_email: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE user_profiles
                SET display_name = ?2, phone_number = ?3, recovery_email = ?4,
                    updated_at = ?5, last_active_date = ?5
              WHERE id = ?1",
            params![id.to_string(), display_name, phone_number, recovery_email, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Partial profile edit; only supplied fields change.
    pub fn update_profile(
        &self,
        id: Uuid,
        display_name: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        if let Some(name) = display_name {
            tx.execute(
                "UPDATE user_profiles SET display_name = ?2 WHERE id = ?1",
                params![id.to_string(), name],
            )?;
        }
        let changed = tx.execute(
            "UPDATE user_profiles SET updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(changed > 0)
    }

    // ── Settings ─────────────────────────────────────────────────────

    pub fn fetch_settings(&self, user_id: Uuid) -> Result<Option<UserSettings>, DatabaseError> {
        let conn = self.conn.lock().unwrap();
        let settings = conn
            .query_row(
                &format!("SELECT {SETTINGS_COLS} FROM user_settings WHERE user_id = ?1"),
                params![user_id.to_string()],
                row_to_settings,
            )
            .optional()?;
        Ok(settings)
    }

    /// Partial settings update. `friction_level` is clamped to 1-4.
    pub fn update_settings(
        &self,
        user_id: Uuid,
        update: &SettingsUpdate,
    ) -> Result<UserSettings, DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let uid = user_id.to_string();
            if let Some(theme) = &update.theme {
                tx.execute(
                    "UPDATE user_settings SET theme = ?2 WHERE user_id = ?1",
                    params![uid, theme],
                )?;
            }
            if let Some(duration) = update.default_session_duration {
                tx.execute(
                    "UPDATE user_settings SET default_session_duration = ?2 WHERE user_id = ?1",
                    params![uid, duration],
                )?;
            }
            if let Some(enabled) = update.friction_enabled {
                tx.execute(
                    "UPDATE user_settings SET friction_enabled = ?2 WHERE user_id = ?1",
                    params![uid, enabled],
                )?;
            }
            if let Some(level) = update.friction_level {
                tx.execute(
                    "UPDATE user_settings SET friction_level = ?2 WHERE user_id = ?1",
                    params![uid, clamp(level, FRICTION_LEVEL_RANGE)],
                )?;
            }
            if let Some(enabled) = update.haptic_enabled {
                tx.execute(
                    "UPDATE user_settings SET haptic_enabled = ?2 WHERE user_id = ?1",
                    params![uid, enabled],
                )?;
            }
            if let Some(enabled) = update.notifications_enabled {
                tx.execute(
                    "UPDATE user_settings SET notifications_enabled = ?2 WHERE user_id = ?1",
                    params![uid, enabled],
                )?;
            }
            if let Some(show) = update.show_completed_tasks {
                tx.execute(
                    "UPDATE user_settings SET show_completed_tasks = ?2 WHERE user_id = ?1",
                    params![uid, show],
                )?;
            }
            if let Some(sync) = update.sync_across_devices {
                tx.execute(
                    "UPDATE user_settings SET sync_across_devices = ?2 WHERE user_id = ?1",
                    params![uid, sync],
                )?;
            }
            tx.execute(
                "UPDATE user_settings SET updated_at = ?2 WHERE user_id = ?1",
                params![uid, Utc::now().to_rfc3339()],
            )?;
        }
        let settings = tx.query_row(
            &format!("SELECT {SETTINGS_COLS} FROM user_settings WHERE user_id = ?1"),
            params![user_id.to_string()],
            row_to_settings,
        )?;
        tx.commit()?;
        Ok(settings)
    }

    // ── Tasks ────────────────────────────────────────────────────────

    /// Create a task; order is assigned as the user's current max + 1
    /// inside the same transaction.
    pub fn create_task(&self, user_id: Uuid, new: &NewTask) -> Result<Task, DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();
        let id = Uuid::new_v4();

        let highest: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sort_order), 0) FROM tasks WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| row.get(0),
        )?;
        let order = highest + 1;
        let priority = clamp(new.priority, PRIORITY_RANGE);
        let estimated = new
            .estimated_duration
            .unwrap_or(DEFAULT_SESSION_DURATION_SECS);

        tx.execute(
            "INSERT INTO tasks
                 (id, user_id, title, details, category, due_date, priority,
                  is_important, estimated_duration, sort_order, is_completed,
                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, ?11)",
            params![
                id.to_string(),
                user_id.to_string(),
                new.title,
                new.details,
                new.category,
                new.due_date.map(|d| d.to_rfc3339()),
                priority,
                new.is_important,
                estimated,
                order,
                now.to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        Ok(Task {
            id,
            user_id,
            title: new.title.clone(),
            details: new.details.clone(),
            category: new.category.clone(),
            due_date: new.due_date,
            priority,
            is_important: new.is_important,
            estimated_duration: estimated,
            order,
            is_completed: false,
            completed_date: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Tasks for a user, incomplete first, then by assigned order.
    pub fn fetch_tasks(
        &self,
        user_id: Uuid,
        include_completed: bool,
    ) -> Result<Vec<Task>, DatabaseError> {
        let conn = self.conn.lock().unwrap();
        let sql = if include_completed {
            format!(
                "SELECT {TASK_COLS} FROM tasks WHERE user_id = ?1
                 ORDER BY is_completed ASC, sort_order ASC"
            )
        } else {
            format!(
                "SELECT {TASK_COLS} FROM tasks WHERE user_id = ?1 AND is_completed = 0
                 ORDER BY is_completed ASC, sort_order ASC"
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id.to_string()], row_to_task)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    pub fn fetch_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError> {
        let conn = self.conn.lock().unwrap();
        let task = conn
            .query_row(
                &format!("SELECT {TASK_COLS} FROM tasks WHERE id = ?1"),
                params![id.to_string()],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    /// Partial task update; bumps `updated_at`.
    pub fn update_task(&self, id: Uuid, update: &TaskUpdate) -> Result<Option<Task>, DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let tid = id.to_string();
            if let Some(title) = &update.title {
                tx.execute(
                    "UPDATE tasks SET title = ?2 WHERE id = ?1",
                    params![tid, title],
                )?;
            }
            if let Some(details) = &update.details {
                tx.execute(
                    "UPDATE tasks SET details = ?2 WHERE id = ?1",
                    params![tid, details],
                )?;
            }
            if let Some(category) = &update.category {
                tx.execute(
                    "UPDATE tasks SET category = ?2 WHERE id = ?1",
                    params![tid, category],
                )?;
            }
            if let Some(due) = update.due_date {
                tx.execute(
                    "UPDATE tasks SET due_date = ?2 WHERE id = ?1",
                    params![tid, due.to_rfc3339()],
                )?;
            }
            if let Some(priority) = update.priority {
                tx.execute(
                    "UPDATE tasks SET priority = ?2 WHERE id = ?1",
                    params![tid, clamp(priority, PRIORITY_RANGE)],
                )?;
            }
            if let Some(important) = update.is_important {
                tx.execute(
                    "UPDATE tasks SET is_important = ?2 WHERE id = ?1",
                    params![tid, important],
                )?;
            }
            if let Some(estimated) = update.estimated_duration {
                tx.execute(
                    "UPDATE tasks SET estimated_duration = ?2 WHERE id = ?1",
                    params![tid, estimated],
                )?;
            }
            tx.execute(
                "UPDATE tasks SET updated_at = ?2 WHERE id = ?1",
                params![tid, Utc::now().to_rfc3339()],
            )?;
        }
        let task = tx
            .query_row(
                &format!("SELECT {TASK_COLS} FROM tasks WHERE id = ?1"),
                params![id.to_string()],
                row_to_task,
            )
            .optional()?;
        tx.commit()?;
        Ok(task)
    }

    pub fn complete_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE tasks SET is_completed = 1, completed_date = ?2, updated_at = ?2
             WHERE id = ?1",
            params![id.to_string(), now],
        )?;
        let task = tx
            .query_row(
                &format!("SELECT {TASK_COLS} FROM tasks WHERE id = ?1"),
                params![id.to_string()],
                row_to_task,
            )
            .optional()?;
        tx.commit()?;
        Ok(task)
    }

    pub fn delete_task(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let deleted = tx.execute("DELETE FROM tasks WHERE id = ?1", params![id.to_string()])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    /// Insert a task discovered on the remote side, preserving its
    /// identifiers and timestamps. The owning user is re-resolved inside
    /// the transaction; inserting for an unknown user is rejected.
    pub fn insert_synced_task(&self, task: &Task) -> Result<(), DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let owner: Option<String> = tx
            .query_row(
                "SELECT id FROM user_profiles WHERE id = ?1",
                params![task.user_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if owner.is_none() {
            return Err(DatabaseError::QueryFailed(format!(
                "unknown user {} for synced task",
                task.user_id
            )));
        }
        tx.execute(
            "INSERT OR IGNORE INTO tasks
                 (id, user_id, title, details, category, due_date, priority,
                  is_important, estimated_duration, sort_order, is_completed,
                  completed_date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                task.id.to_string(),
                task.user_id.to_string(),
                task.title,
                task.details,
                task.category,
                task.due_date.map(|d| d.to_rfc3339()),
                task.priority,
                task.is_important,
                task.estimated_duration,
                task.order,
                task.is_completed,
                task.completed_date.map(|d| d.to_rfc3339()),
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Overwrite a local task's fields from its remote copy, preserving the
    /// remote `updated_at` so a repeated sync pass is a no-op.
    pub fn apply_synced_task(&self, task: &Task) -> Result<bool, DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE tasks SET
                 title = ?2, details = ?3, category = ?4, due_date = ?5,
                 priority = ?6, is_important = ?7, estimated_duration = ?8,
                 sort_order = ?9, is_completed = ?10, completed_date = ?11,
                 updated_at = ?12
             WHERE id = ?1",
            params![
                task.id.to_string(),
                task.title,
                task.details,
                task.category,
                task.due_date.map(|d| d.to_rfc3339()),
                task.priority,
                task.is_important,
                task.estimated_duration,
                task.order,
                task.is_completed,
                task.completed_date.map(|d| d.to_rfc3339()),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(changed > 0)
    }

    // ── Sessions ─────────────────────────────────────────────────────

    /// Create a session and its statistics row atomically. The partial
    /// unique index rejects a second active session for the same user.
    pub fn create_session(
        &self,
        user_id: Uuid,
        task_id: Option<Uuid>,
        title: &str,
        target_duration: i64,
    ) -> Result<FocusSession, DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();
        let id = Uuid::new_v4();

        tx.execute(
            "INSERT INTO focus_sessions
                 (id, user_id, task_id, title, target_duration, time_remaining,
                  is_active, is_paused, is_completed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, 1, 0, 0, ?6)",
            params![
                id.to_string(),
                user_id.to_string(),
                task_id.map(|t| t.to_string()),
                title,
                target_duration,
                now.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "INSERT INTO session_statistics (session_id, created_at) VALUES (?1, ?2)",
            params![id.to_string(), now.to_rfc3339()],
        )?;
        tx.commit()?;

        Ok(FocusSession {
            id,
            user_id,
            task_id,
            title: title.to_string(),
            target_duration,
            time_remaining: target_duration,
            paused_time: 0,
            duration: 0,
            is_active: true,
            is_paused: false,
            is_completed: false,
            created_at: now,
            completion_date: None,
        })
    }

    pub fn fetch_active_session(
        &self,
        user_id: Uuid,
    ) -> Result<Option<FocusSession>, DatabaseError> {
        let conn = self.conn.lock().unwrap();
        let session = conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLS} FROM focus_sessions
                     WHERE user_id = ?1 AND is_active = 1"
                ),
                params![user_id.to_string()],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    pub fn fetch_session(&self, id: Uuid) -> Result<Option<FocusSession>, DatabaseError> {
        let conn = self.conn.lock().unwrap();
        let session = conn
            .query_row(
                &format!("SELECT {SESSION_COLS} FROM focus_sessions WHERE id = ?1"),
                params![id.to_string()],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Sessions for a user, newest first. `limit = 0` means no limit.
    pub fn fetch_sessions(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<FocusSession>, DatabaseError> {
        let conn = self.conn.lock().unwrap();
        let sql = if limit > 0 {
            format!(
                "SELECT {SESSION_COLS} FROM focus_sessions WHERE user_id = ?1
                 ORDER BY created_at DESC LIMIT {limit}"
            )
        } else {
            format!(
                "SELECT {SESSION_COLS} FROM focus_sessions WHERE user_id = ?1
                 ORDER BY created_at DESC"
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id.to_string()], row_to_session)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    /// Pause: persist the paused flag and current remaining time, and bump
    /// the pause counter, in one transaction.
    pub fn pause_session(&self, id: Uuid, time_remaining: i64) -> Result<(), DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE focus_sessions SET is_paused = 1, time_remaining = ?2 WHERE id = ?1",
            params![id.to_string(), time_remaining],
        )?;
        tx.execute(
            "UPDATE session_statistics SET pause_count = pause_count + 1 WHERE session_id = ?1",
            params![id.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn resume_session(&self, id: Uuid) -> Result<(), DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE focus_sessions SET is_paused = 0 WHERE id = ?1",
            params![id.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Complete: terminal flags, elapsed duration from the live remaining
    /// time, and full-credit statistics, in one transaction.
    pub fn complete_session(
        &self,
        id: Uuid,
        time_remaining_at_completion: i64,
    ) -> Result<(), DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE focus_sessions SET
                 is_active = 0, is_paused = 0, is_completed = 1,
                 duration = target_duration - ?2, time_remaining = 0,
                 completion_date = ?3
             WHERE id = ?1",
            params![id.to_string(), time_remaining_at_completion, now],
        )?;
        tx.execute(
            "UPDATE session_statistics SET
                 total_focus_time = (SELECT target_duration FROM focus_sessions WHERE id = ?1),
                 completion_rate = 1.0
             WHERE session_id = ?1",
            params![id.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Cancel: leaves the session incomplete; statistics get credit only
    /// for the time actually spent.
    pub fn cancel_session(
        &self,
        id: Uuid,
        time_remaining_at_cancel: i64,
    ) -> Result<(), DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE focus_sessions SET is_active = 0, is_paused = 0 WHERE id = ?1",
            params![id.to_string()],
        )?;
        tx.execute(
            "UPDATE session_statistics SET
                 total_focus_time =
                     (SELECT target_duration FROM focus_sessions WHERE id = ?1) - ?2,
                 completion_rate = 0.0
             WHERE session_id = ?1",
            params![id.to_string(), time_remaining_at_cancel],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Periodic countdown checkpoint; the recovery point if the process
    /// dies mid-session.
    pub fn checkpoint_time_remaining(
        &self,
        id: Uuid,
        time_remaining: i64,
    ) -> Result<(), DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE focus_sessions SET time_remaining = ?2 WHERE id = ?1",
            params![id.to_string(), time_remaining],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn fetch_statistics(
        &self,
        session_id: Uuid,
    ) -> Result<Option<SessionStatistics>, DatabaseError> {
        let conn = self.conn.lock().unwrap();
        let stats = conn
            .query_row(
                "SELECT session_id, total_focus_time, total_pause_time, pause_count,
                        friction_count, distraction_count, completion_rate, created_at
                 FROM session_statistics WHERE session_id = ?1",
                params![session_id.to_string()],
                row_to_statistics,
            )
            .optional()?;
        Ok(stats)
    }

    /// Insert a session discovered on the remote side, with an empty
    /// statistics row. The owning user is re-resolved inside the
    /// transaction.
    pub fn insert_synced_session(&self, session: &FocusSession) -> Result<(), DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let owner: Option<String> = tx
            .query_row(
                "SELECT id FROM user_profiles WHERE id = ?1",
                params![session.user_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if owner.is_none() {
            return Err(DatabaseError::QueryFailed(format!(
                "unknown user {} for synced session",
                session.user_id
            )));
        }
        insert_session_row(&tx, session)?;
        tx.execute(
            "INSERT OR IGNORE INTO session_statistics (session_id, created_at) VALUES (?1, ?2)",
            params![session.id.to_string(), session.created_at.to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Overwrite a local session's lifecycle fields from its remote copy.
    pub fn apply_synced_session(&self, session: &FocusSession) -> Result<bool, DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE focus_sessions SET
                 title = ?2, target_duration = ?3, time_remaining = ?4,
                 paused_time = ?5, duration = ?6, is_active = ?7, is_paused = ?8,
                 is_completed = ?9, completion_date = ?10
             WHERE id = ?1",
            params![
                session.id.to_string(),
                session.title,
                session.target_duration,
                session.time_remaining,
                session.paused_time,
                session.duration,
                session.is_active,
                session.is_paused,
                session.is_completed,
                session.completion_date.map(|d| d.to_rfc3339()),
            ],
        )?;
        tx.commit()?;
        Ok(changed > 0)
    }

    // ── Friction events ──────────────────────────────────────────────

    /// Create a friction event and bump the session's friction counter in
    /// the same transaction.
    pub fn create_friction_event(
        &self,
        session_id: Uuid,
        friction_level: i64,
        task_type: &str,
    ) -> Result<FrictionEvent, DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();
        let id = Uuid::new_v4();
        let level = clamp(friction_level, FRICTION_LEVEL_RANGE);

        tx.execute(
            "INSERT INTO friction_events
                 (id, session_id, friction_level, task_type, is_completed,
                  response_time, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, 0, ?5)",
            params![
                id.to_string(),
                session_id.to_string(),
                level,
                task_type,
                now.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "UPDATE session_statistics SET friction_count = friction_count + 1
             WHERE session_id = ?1",
            params![session_id.to_string()],
        )?;
        tx.commit()?;

        Ok(FrictionEvent {
            id,
            session_id,
            friction_level: level,
            task_type: task_type.to_string(),
            is_completed: false,
            user_response: None,
            response_time: 0.0,
            created_at: now,
            completion_date: None,
        })
    }

    pub fn complete_friction_event(
        &self,
        id: Uuid,
        user_response: Option<&str>,
        response_time: f64,
    ) -> Result<Option<FrictionEvent>, DatabaseError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE friction_events SET
                 is_completed = 1, user_response = ?2, response_time = ?3,
                 completion_date = ?4
             WHERE id = ?1",
            params![
                id.to_string(),
                user_response,
                response_time,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let event = tx
            .query_row(
                &format!("SELECT {FRICTION_COLS} FROM friction_events WHERE id = ?1"),
                params![id.to_string()],
                row_to_friction_event,
            )
            .optional()?;
        tx.commit()?;
        Ok(event)
    }

    pub fn fetch_friction_event(
        &self,
        id: Uuid,
    ) -> Result<Option<FrictionEvent>, DatabaseError> {
        let conn = self.conn.lock().unwrap();
        let event = conn
            .query_row(
                &format!("SELECT {FRICTION_COLS} FROM friction_events WHERE id = ?1"),
                params![id.to_string()],
                row_to_friction_event,
            )
            .optional()?;
        Ok(event)
    }

    // ── KV store ─────────────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(result)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

// ── Row mapping ──────────────────────────────────────────────────────

const PROFILE_COLS: &str = "id, auth_uid, display_name, phone_number, recovery_email, \
                            created_at, updated_at, last_active_date, account_status";
const SETTINGS_COLS: &str = "user_id, theme, default_session_duration, friction_enabled, \
                             friction_level, haptic_enabled, notifications_enabled, \
                             show_completed_tasks, sync_across_devices, created_at, updated_at";
const TASK_COLS: &str = "id, user_id, title, details, category, due_date, priority, \
                         is_important, estimated_duration, sort_order, is_completed, \
                         completed_date, created_at, updated_at";
const SESSION_COLS: &str = "id, user_id, task_id, title, target_duration, time_remaining, \
                            paused_time, duration, is_active, is_paused, is_completed, \
                            created_at, completion_date";
const FRICTION_COLS: &str = "id, session_id, friction_level, task_type, is_completed, \
                             user_response, response_time, created_at, completion_date";

fn insert_session_row(tx: &Transaction, session: &FocusSession) -> Result<(), rusqlite::Error> {
    tx.execute(
        "INSERT OR IGNORE INTO focus_sessions
             (id, user_id, task_id, title, target_duration, time_remaining,
              paused_time, duration, is_active, is_paused, is_completed,
              created_at, completion_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            session.id.to_string(),
            session.user_id.to_string(),
            session.task_id.map(|t| t.to_string()),
            session.title,
            session.target_duration,
            session.time_remaining,
            session.paused_time,
            session.duration,
            session.is_active,
            session.is_paused,
            session.is_completed,
            session.created_at.to_rfc3339(),
            session.completion_date.map(|d| d.to_rfc3339()),
        ],
    )?;
    Ok(())
}

/// Parse datetime from RFC 3339 text with fallback to current time.
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_optional_datetime(dt_str: Option<String>) -> Option<DateTime<Utc>> {
    dt_str.map(|s| parse_datetime_fallback(&s))
}

fn parse_uuid(idx: usize, value: String) -> Result<Uuid, rusqlite::Error> {
    Uuid::parse_str(&value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_profile(row: &rusqlite::Row) -> Result<UserProfile, rusqlite::Error> {
    let status: String = row.get(8)?;
    Ok(UserProfile {
        id: parse_uuid(0, row.get(0)?)?,
        auth_uid: row.get(1)?,
        display_name: row.get(2)?,
        phone_number: row.get(3)?,
        recovery_email: row.get(4)?,
        created_at: parse_datetime_fallback(&row.get::<_, String>(5)?),
        updated_at: parse_datetime_fallback(&row.get::<_, String>(6)?),
        last_active_date: parse_datetime_fallback(&row.get::<_, String>(7)?),
        account_status: AccountStatus::parse(&status),
    })
}

fn row_to_settings(row: &rusqlite::Row) -> Result<UserSettings, rusqlite::Error> {
    Ok(UserSettings {
        user_id: parse_uuid(0, row.get(0)?)?,
        theme: row.get(1)?,
        default_session_duration: row.get(2)?,
        friction_enabled: row.get(3)?,
        friction_level: row.get(4)?,
        haptic_enabled: row.get(5)?,
        notifications_enabled: row.get(6)?,
        show_completed_tasks: row.get(7)?,
        sync_across_devices: row.get(8)?,
        created_at: parse_datetime_fallback(&row.get::<_, String>(9)?),
        updated_at: parse_datetime_fallback(&row.get::<_, String>(10)?),
    })
}

fn row_to_task(row: &rusqlite::Row) -> Result<Task, rusqlite::Error> {
    Ok(Task {
        id: parse_uuid(0, row.get(0)?)?,
        user_id: parse_uuid(1, row.get(1)?)?,
        title: row.get(2)?,
        details: row.get(3)?,
        category: row.get(4)?,
        due_date: parse_optional_datetime(row.get(5)?),
        priority: row.get(6)?,
        is_important: row.get(7)?,
        estimated_duration: row.get(8)?,
        order: row.get(9)?,
        is_completed: row.get(10)?,
        completed_date: parse_optional_datetime(row.get(11)?),
        created_at: parse_datetime_fallback(&row.get::<_, String>(12)?),
        updated_at: parse_datetime_fallback(&row.get::<_, String>(13)?),
    })
}

fn row_to_session(row: &rusqlite::Row) -> Result<FocusSession, rusqlite::Error> {
    let task_id: Option<String> = row.get(2)?;
    let task_id = match task_id {
        Some(s) => Some(parse_uuid(2, s)?),
        None => None,
    };
    Ok(FocusSession {
        id: parse_uuid(0, row.get(0)?)?,
        user_id: parse_uuid(1, row.get(1)?)?,
        task_id,
        title: row.get(3)?,
        target_duration: row.get(4)?,
        time_remaining: row.get(5)?,
        paused_time: row.get(6)?,
        duration: row.get(7)?,
        is_active: row.get(8)?,
        is_paused: row.get(9)?,
        is_completed: row.get(10)?,
        created_at: parse_datetime_fallback(&row.get::<_, String>(11)?),
        completion_date: parse_optional_datetime(row.get(12)?),
    })
}

fn row_to_statistics(row: &rusqlite::Row) -> Result<SessionStatistics, rusqlite::Error> {
    Ok(SessionStatistics {
        session_id: parse_uuid(0, row.get(0)?)?,
        total_focus_time: row.get(1)?,
        total_pause_time: row.get(2)?,
        pause_count: row.get(3)?,
        friction_count: row.get(4)?,
        distraction_count: row.get(5)?,
        completion_rate: row.get(6)?,
        created_at: parse_datetime_fallback(&row.get::<_, String>(7)?),
    })
}

fn row_to_friction_event(row: &rusqlite::Row) -> Result<FrictionEvent, rusqlite::Error> {
    Ok(FrictionEvent {
        id: parse_uuid(0, row.get(0)?)?,
        session_id: parse_uuid(1, row.get(1)?)?,
        friction_level: row.get(2)?,
        task_type: row.get(3)?,
        is_completed: row.get(4)?,
        user_response: row.get(5)?,
        response_time: row.get(6)?,
        created_at: parse_datetime_fallback(&row.get::<_, String>(7)?),
        completion_date: parse_optional_datetime(row.get(8)?),
    })
}
