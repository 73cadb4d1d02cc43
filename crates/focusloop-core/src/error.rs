//! Core error types for focusloop-core.
//!
//! One enum per service boundary, aggregated under [`CoreError`] so the CLI
//! and other embedders can hold a single error type.

use thiserror::Error;

/// Core error type for focusloop-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Session lifecycle errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Task management errors
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    /// Profile management errors
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: std::path::PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Session lifecycle errors.
///
/// Transition failures are always surfaced to the caller; nothing here is
/// retried internally.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No resolvable identity / signed-in user
    #[error("User is not authenticated")]
    UserNotAuthenticated,

    /// Operation requires a current session and there is none
    #[error("No active session found")]
    NoActiveSession,

    /// Session vanished from the store mid-operation
    #[error("Session not found")]
    SessionNotFound,

    /// `start` while another session is active for this user
    #[error("A session is already active")]
    SessionAlreadyActive,

    /// Requested transition not legal from the current state
    #[error("Invalid session state transition")]
    InvalidStateTransition,

    /// Friction event lookup failed
    #[error("Friction event not found")]
    FrictionEventNotFound,

    /// Durable store failure during a transition
    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),
}

/// Task management errors.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("User is not authenticated")]
    NotAuthenticated,

    #[error("Task not found")]
    TaskNotFound,

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),
}

/// Profile management errors.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("User is not authenticated")]
    NotAuthenticated,

    #[error("Profile not found")]
    ProfileNotFound,

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed {
        path: std::path::PathBuf,
        message: String,
    },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed {
        path: std::path::PathBuf,
        message: String,
    },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
