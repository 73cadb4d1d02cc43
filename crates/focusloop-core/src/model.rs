//! Entity types shared by the storage, session, and sync layers.
//!
//! All timestamps are UTC; durations are whole seconds. Identifiers are
//! UUIDv4 except `auth_uid`, which is whatever the identity provider hands
//! us and is only ever compared as an opaque string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default focus session length: 25 minutes.
pub const DEFAULT_SESSION_DURATION_SECS: i64 = 1500;

/// Friction levels are kept within this inclusive range.
pub const FRICTION_LEVEL_RANGE: (i64, i64) = (1, 4);

/// Task priority is kept within this inclusive range.
pub const PRIORITY_RANGE: (i64, i64) = (0, 3);

/// Lifecycle state of the (single) focus session, as observed on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Paused,
    Completed,
    Canceled,
}

impl SessionState {
    /// Terminal states permit a fresh `start`.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Canceled)
    }
}

/// Account standing. Profiles are never hard-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
    Deleted,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "suspended" => AccountStatus::Suspended,
            "deleted" => AccountStatus::Deleted,
            _ => AccountStatus::Active,
        }
    }
}

/// Authentication state as observed on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    NotAuthenticated,
    Loading,
    Authenticated,
    Error,
}

/// The identity provider's view of the signed-in user.
///
/// Only the fields remote seeding needs; everything else lives on
/// [`UserProfile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub display_name: String,
    pub phone_number: String,
    pub email: Option<String>,
}

/// Local user record. Owns settings, tasks, and sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub auth_uid: String,
    pub display_name: String,
    pub phone_number: String,
    pub recovery_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_active_date: DateTime<Utc>,
    pub account_status: AccountStatus,
}

/// Per-user preferences, one-to-one with [`UserProfile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: Uuid,
    pub theme: String,
    pub default_session_duration: i64,
    pub friction_enabled: bool,
    pub friction_level: i64,
    pub haptic_enabled: bool,
    pub notifications_enabled: bool,
    pub show_completed_tasks: bool,
    pub sync_across_devices: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A to-do item, owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub details: Option<String>,
    pub category: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: i64,
    pub is_important: bool,
    pub estimated_duration: i64,
    /// Monotonic per user; assigned as max+1 at creation.
    pub order: i64,
    pub is_completed: bool,
    pub completed_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One timed focus run. At most one per user may be active at any instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub task_id: Option<Uuid>,
    pub title: String,
    pub target_duration: i64,
    pub time_remaining: i64,
    pub paused_time: i64,
    /// Actual elapsed time, computed at completion as
    /// `target_duration - time_remaining`.
    pub duration: i64,
    pub is_active: bool,
    pub is_paused: bool,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub completion_date: Option<DateTime<Utc>>,
}

/// Aggregates kept alongside each session, created in the same transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub session_id: Uuid,
    pub total_focus_time: i64,
    pub total_pause_time: i64,
    pub pause_count: i64,
    pub friction_count: i64,
    pub distraction_count: i64,
    pub completion_rate: f64,
    pub created_at: DateTime<Utc>,
}

/// A friction prompt raised during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrictionEvent {
    pub id: Uuid,
    pub session_id: Uuid,
    pub friction_level: i64,
    pub task_type: String,
    pub is_completed: bool,
    pub user_response: Option<String>,
    pub response_time: f64,
    pub created_at: DateTime<Utc>,
    pub completion_date: Option<DateTime<Utc>>,
}

/// Clamp a value into an inclusive range.
pub(crate) fn clamp(value: i64, (lo, hi): (i64, i64)) -> i64 {
    value.clamp(lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Canceled.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert!(!SessionState::Paused.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
    }

    #[test]
    fn account_status_round_trip() {
        for status in [
            AccountStatus::Active,
            AccountStatus::Suspended,
            AccountStatus::Deleted,
        ] {
            assert_eq!(AccountStatus::parse(status.as_str()), status);
        }
        assert_eq!(AccountStatus::parse("unknown"), AccountStatus::Active);
    }

    #[test]
    fn clamp_friction_level() {
        assert_eq!(clamp(0, FRICTION_LEVEL_RANGE), 1);
        assert_eq!(clamp(2, FRICTION_LEVEL_RANGE), 2);
        assert_eq!(clamp(9, FRICTION_LEVEL_RANGE), 4);
    }
}
