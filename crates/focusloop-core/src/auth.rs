//! Identity holder.
//!
//! Stands in for the external identity provider: something else performs
//! the actual authentication and hands the resolved [`Identity`] to
//! `sign_in`. Services read the current identity on demand; nothing here
//! reaches into storage or the network.

use std::sync::RwLock;

use crate::bus::Publisher;
use crate::model::{Identity, UserStatus};

/// Process-wide authentication state, shared by handle.
pub struct AuthSession {
    identity: RwLock<Option<Identity>>,
    status: Publisher<UserStatus>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self {
            identity: RwLock::new(None),
            status: Publisher::new(UserStatus::NotAuthenticated),
        }
    }

    /// Install a resolved identity. Callers should follow up with
    /// `ProfileService::refresh_current_user`.
    pub fn sign_in(&self, identity: Identity) {
        *self.identity.write().unwrap() = Some(identity);
        self.status.publish(UserStatus::Loading);
    }

    pub fn sign_out(&self) {
        *self.identity.write().unwrap() = None;
        self.status.publish(UserStatus::NotAuthenticated);
    }

    /// The currently resolvable identity, if any.
    pub fn current(&self) -> Option<Identity> {
        self.identity.read().unwrap().clone()
    }

    pub fn status(&self) -> &Publisher<UserStatus> {
        &self.status
    }
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}
