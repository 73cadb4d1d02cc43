//! Store-to-store synchronization layer.
//!
//! Reconciles the local SQLite store with the remote document store per
//! entity collection, last-writer-wins by update timestamp, never dropping
//! an item present on only one side.

pub mod engine;
pub mod types;

pub use engine::{
    plan_session_reconcile, plan_task_reconcile, SessionSyncPlan, SyncEngine, SyncHandle,
    TaskSyncPlan, DEFAULT_DEBOUNCE,
};
pub use types::{
    RemoteProfileRecord, RemoteSessionRecord, RemoteSettingsRecord, RemoteTaskRecord, SyncError,
    SyncReport, SyncStatus, LAST_SYNC_KEY,
};
