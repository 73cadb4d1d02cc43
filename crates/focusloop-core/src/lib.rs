//! # Focusloop Core Library
//!
//! Core business logic for Focusloop: a focus-session timer with an
//! offline-first, bidirectionally synchronized store. All operations are
//! available through this library; the CLI binary is a thin layer over it,
//! and any GUI would be too.
//!
//! ## Architecture
//!
//! - **Session state machine**: drives the single active focus session per
//!   user through start/pause/resume/complete/cancel, with a caller-driven
//!   1-second `tick()` and periodic durability checkpoints
//! - **Storage**: SQLite-backed durable store; every logical operation is
//!   its own scoped transaction
//! - **Sync engine**: reconciles the local store with a remote document
//!   store, last-writer-wins by update timestamp, on a serialized
//!   background worker behind a 5-second debounce
//! - **Bus**: watch-channel publishers with last-value replay, carrying
//!   session state, remaining time, tasks, and sync status to observers
//!
//! ## Key Components
//!
//! - [`SessionService`]: the session lifecycle state machine
//! - [`SyncEngine`]: full and per-entity synchronization
//! - [`Database`]: local persistence
//! - [`RemoteStore`]: the remote document store contract
//! - [`Config`]: application configuration management

pub mod auth;
pub mod bus;
pub mod error;
pub mod model;
pub mod profile;
pub mod remote;
pub mod session;
pub mod store;
pub mod sync;
pub mod tasks;

pub use auth::AuthSession;
pub use bus::Publisher;
pub use error::{
    ConfigError, CoreError, DatabaseError, ProfileError, SessionError, TaskError,
};
pub use model::{
    AccountStatus, FocusSession, FrictionEvent, Identity, SessionState, SessionStatistics, Task,
    UserProfile, UserSettings, UserStatus, DEFAULT_SESSION_DURATION_SECS,
};
pub use profile::ProfileService;
pub use remote::{Document, HttpRemoteStore, MemoryRemoteStore, RemoteError, RemoteStore};
pub use session::{SessionService, CHECKPOINT_INTERVAL_SECS};
pub use store::{Config, Database, NewTask, SettingsUpdate, TaskUpdate};
pub use sync::{SyncEngine, SyncError, SyncHandle, SyncReport, SyncStatus};
pub use tasks::TaskService;
