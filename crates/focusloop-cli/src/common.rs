//! Service graph construction shared by every CLI command.
//!
//! One invocation builds the whole stack: database, remote store, sync
//! engine with its background worker, and the three services. The signed-in
//! identity persists in the kv store between invocations, so a session
//! started in one command is recovered (via `refresh`) in the next.

use std::sync::Arc;
use std::time::Duration;

use focusloop_core::auth::AuthSession;
use focusloop_core::model::Identity;
use focusloop_core::profile::ProfileService;
use focusloop_core::remote::{HttpRemoteStore, MemoryRemoteStore, RemoteStore};
use focusloop_core::session::SessionService;
use focusloop_core::store::{Config, Database};
use focusloop_core::sync::SyncEngine;
use focusloop_core::tasks::TaskService;

/// KV key holding the persisted identity between CLI invocations.
pub const IDENTITY_KEY: &str = "cli_identity";

pub type CliError = Box<dyn std::error::Error>;

pub struct App {
    pub db: Arc<Database>,
    pub auth: Arc<AuthSession>,
    pub profiles: Arc<ProfileService>,
    pub tasks: Arc<TaskService>,
    pub sessions: Arc<SessionService>,
    pub engine: Arc<SyncEngine>,
}

pub async fn bootstrap() -> Result<App, CliError> {
    let config = Config::load()?;
    let db = Arc::new(Database::open()?);
    let auth = Arc::new(AuthSession::new());

    let remote: Arc<dyn RemoteStore> = match (&config.remote.base_url, config.remote.enabled) {
        (Some(base_url), true) => Arc::new(HttpRemoteStore::new(
            base_url,
            config.remote.auth_token.clone(),
        )?),
        _ => Arc::new(MemoryRemoteStore::new()),
    };

    let engine = SyncEngine::new(Arc::clone(&db), remote, Arc::clone(&auth));
    let sync = engine.handle(Duration::from_secs(config.sync.debounce_secs));

    let profiles = ProfileService::new(Arc::clone(&db), Arc::clone(&auth), sync.clone());
    let tasks = TaskService::new(Arc::clone(&db), Arc::clone(&profiles), sync.clone());
    let sessions = SessionService::new(Arc::clone(&db), Arc::clone(&profiles), sync.clone());

    // Restore the persisted identity and the in-flight session, if any.
    if let Some(raw) = db.kv_get(IDENTITY_KEY)? {
        if let Ok(identity) = serde_json::from_str::<Identity>(&raw) {
            auth.sign_in(identity);
            profiles.refresh_current_user()?;
            tasks.refresh_tasks()?;
            sessions.refresh()?;
        }
    }

    Ok(App {
        db,
        auth,
        profiles,
        tasks,
        sessions,
        engine,
    })
}

/// Persist the signed-in identity for later invocations.
pub fn persist_identity(app: &App, identity: &Identity) -> Result<(), CliError> {
    app.db
        .kv_set(IDENTITY_KEY, &serde_json::to_string(identity)?)?;
    Ok(())
}

/// Forget the persisted identity.
pub fn clear_identity(app: &App) -> Result<(), CliError> {
    app.db.kv_set(IDENTITY_KEY, "")?;
    Ok(())
}
