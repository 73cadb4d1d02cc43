//! Core types for store-to-store synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{FocusSession, Identity, Task, UserProfile, UserSettings};
use crate::remote::{Document, RemoteError};

/// KV key under which the watermark of the last successful full sync is
/// recorded.
pub const LAST_SYNC_KEY: &str = "last_sync_time";

/// Current sync status, as observed on the bus.
///
/// A pass emits exactly one `Syncing` when it starts and exactly one
/// terminal `Completed`/`Failed` when it ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Completed,
    Failed { reason: String },
}

/// Sync error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Local store error: {0}")]
    Store(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What a full sync pass actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// The pass was coalesced because another one was already running.
    pub skipped: bool,
    pub profile_pushed: bool,
    pub tasks_pushed: usize,
    pub tasks_pulled: usize,
    pub sessions_pushed: usize,
    pub sessions_pulled: usize,
}

impl SyncReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Remote mirror of a [`Task`]. Exists only during reconciliation; the
/// document id travels out of band of the serialized fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTaskRecord {
    #[serde(skip)]
    pub doc_id: String,
    pub id: Uuid,
    pub title: String,
    pub details: Option<String>,
    pub category: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: i64,
    pub is_important: bool,
    pub estimated_duration: i64,
    pub order: i64,
    pub is_completed: bool,
    pub completed_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RemoteTaskRecord {
    pub fn from_document(doc: &Document) -> Result<Self, serde_json::Error> {
        let mut record: Self = serde_json::from_value(doc.fields.clone())?;
        record.doc_id = doc.id.clone();
        Ok(record)
    }

    pub fn from_task(task: &Task) -> Self {
        Self {
            doc_id: task.id.to_string(),
            id: task.id,
            title: task.title.clone(),
            details: task.details.clone(),
            category: task.category.clone(),
            due_date: task.due_date,
            priority: task.priority,
            is_important: task.is_important,
            estimated_duration: task.estimated_duration,
            order: task.order,
            is_completed: task.is_completed,
            completed_date: task.completed_date,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }

    pub fn to_fields(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Materialize as a local task owned by `user_id`.
    pub fn into_task(&self, user_id: Uuid) -> Task {
        Task {
            id: self.id,
            user_id,
            title: self.title.clone(),
            details: self.details.clone(),
            category: self.category.clone(),
            due_date: self.due_date,
            priority: self.priority,
            is_important: self.is_important,
            estimated_duration: self.estimated_duration,
            order: self.order,
            is_completed: self.is_completed,
            completed_date: self.completed_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Remote mirror of a [`FocusSession`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSessionRecord {
    #[serde(skip)]
    pub doc_id: String,
    pub id: Uuid,
    pub task_id: Option<Uuid>,
    pub title: String,
    pub target_duration: i64,
    pub time_remaining: i64,
    pub paused_time: i64,
    pub duration: i64,
    pub is_active: bool,
    pub is_paused: bool,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub completion_date: Option<DateTime<Utc>>,
}

impl RemoteSessionRecord {
    pub fn from_document(doc: &Document) -> Result<Self, serde_json::Error> {
        let mut record: Self = serde_json::from_value(doc.fields.clone())?;
        record.doc_id = doc.id.clone();
        Ok(record)
    }

    pub fn from_session(session: &FocusSession) -> Self {
        Self {
            doc_id: session.id.to_string(),
            id: session.id,
            task_id: session.task_id,
            title: session.title.clone(),
            target_duration: session.target_duration,
            time_remaining: session.time_remaining,
            paused_time: session.paused_time,
            duration: session.duration,
            is_active: session.is_active,
            is_paused: session.is_paused,
            is_completed: session.is_completed,
            created_at: session.created_at,
            completion_date: session.completion_date,
        }
    }

    pub fn to_fields(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn into_session(&self, user_id: Uuid) -> FocusSession {
        FocusSession {
            id: self.id,
            user_id,
            task_id: self.task_id,
            title: self.title.clone(),
            target_duration: self.target_duration,
            time_remaining: self.time_remaining,
            paused_time: self.paused_time,
            duration: self.duration,
            is_active: self.is_active,
            is_paused: self.is_paused,
            is_completed: self.is_completed,
            created_at: self.created_at,
            completion_date: self.completion_date,
        }
    }
}

/// Remote profile document, pushed unconditionally when a local profile
/// exists (local wins for profile data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteProfileRecord {
    pub display_name: String,
    pub phone_number: String,
    pub recovery_email: Option<String>,
    pub account_status: String,
    pub last_active_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RemoteProfileRecord {
    pub fn from_document(doc: &Document) -> Result<Self, serde_json::Error> {
        serde_json::from_value(doc.fields.clone())
    }

    pub fn from_profile(profile: &UserProfile) -> Self {
        Self {
            display_name: profile.display_name.clone(),
            phone_number: profile.phone_number.clone(),
            recovery_email: profile.recovery_email.clone(),
            account_status: profile.account_status.as_str().to_string(),
            last_active_date: profile.last_active_date,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        }
    }

    /// Seed a fresh remote document from identity-provider fields, for the
    /// first device of a brand-new account.
    pub fn seed_from_identity(identity: &Identity) -> Self {
        let now = Utc::now();
        Self {
            display_name: identity.display_name.clone(),
            phone_number: identity.phone_number.clone(),
            recovery_email: identity.email.clone(),
            account_status: "active".to_string(),
            last_active_date: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_fields(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Remote settings document, pushed together with the profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettingsRecord {
    pub theme: String,
    pub default_session_duration: i64,
    pub friction_enabled: bool,
    pub friction_level: i64,
    pub haptic_enabled: bool,
    pub notifications_enabled: bool,
    pub show_completed_tasks: bool,
    pub sync_across_devices: bool,
    pub updated_at: DateTime<Utc>,
}

impl RemoteSettingsRecord {
    pub fn from_document(doc: &Document) -> Result<Self, serde_json::Error> {
        serde_json::from_value(doc.fields.clone())
    }

    pub fn from_settings(settings: &UserSettings) -> Self {
        Self {
            theme: settings.theme.clone(),
            default_session_duration: settings.default_session_duration,
            friction_enabled: settings.friction_enabled,
            friction_level: settings.friction_level,
            haptic_enabled: settings.haptic_enabled,
            notifications_enabled: settings.notifications_enabled,
            show_completed_tasks: settings.show_completed_tasks,
            sync_across_devices: settings.sync_across_devices,
            updated_at: settings.updated_at,
        }
    }

    /// The settings a brand-new account starts with, for seeding the
    /// remote document when neither side has one.
    pub fn defaults() -> Self {
        Self {
            theme: "system".to_string(),
            default_session_duration: crate::model::DEFAULT_SESSION_DURATION_SECS,
            friction_enabled: true,
            friction_level: 2,
            haptic_enabled: true,
            notifications_enabled: true,
            show_completed_tasks: false,
            sync_across_devices: true,
            updated_at: Utc::now(),
        }
    }

    /// As a partial update applying every remote field locally.
    pub fn to_settings_update(&self) -> crate::store::SettingsUpdate {
        crate::store::SettingsUpdate {
            theme: Some(self.theme.clone()),
            default_session_duration: Some(self.default_session_duration),
            friction_enabled: Some(self.friction_enabled),
            friction_level: Some(self.friction_level),
            haptic_enabled: Some(self.haptic_enabled),
            notifications_enabled: Some(self.notifications_enabled),
            show_completed_tasks: Some(self.show_completed_tasks),
            sync_across_devices: Some(self.sync_across_devices),
        }
    }

    pub fn to_fields(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AccountStatus;

    fn sample_task() -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "write report".to_string(),
            details: Some("quarterly".to_string()),
            category: None,
            due_date: None,
            priority: 2,
            is_important: true,
            estimated_duration: 1800,
            order: 3,
            is_completed: false,
            completed_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn task_record_document_round_trip() {
        let task = sample_task();
        let record = RemoteTaskRecord::from_task(&task);
        let doc = Document {
            id: task.id.to_string(),
            fields: record.to_fields().unwrap(),
        };

        let parsed = RemoteTaskRecord::from_document(&doc).unwrap();
        assert_eq!(parsed.doc_id, task.id.to_string());
        assert_eq!(parsed.id, task.id);
        assert_eq!(parsed.into_task(task.user_id), task);
    }

    #[test]
    fn profile_record_carries_account_status() {
        let now = Utc::now();
        let profile = UserProfile {
            id: Uuid::new_v4(),
            auth_uid: "auth-1".to_string(),
            display_name: "Ada".to_string(),
            phone_number: "+15550100".to_string(),
            recovery_email: None,
            created_at: now,
            updated_at: now,
            last_active_date: now,
            account_status: AccountStatus::Active,
        };
        let record = RemoteProfileRecord::from_profile(&profile);
        assert_eq!(record.account_status, "active");
    }

    #[test]
    fn malformed_document_is_an_error() {
        let doc = Document {
            id: "x".to_string(),
            fields: serde_json::json!({"title": 7}),
        };
        assert!(RemoteTaskRecord::from_document(&doc).is_err());
    }
}
