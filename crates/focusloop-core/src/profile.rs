//! User profile service: connects the identity provider with local user
//! data and publishes the current user.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::auth::AuthSession;
use crate::bus::Publisher;
use crate::error::ProfileError;
use crate::model::{Identity, UserProfile, UserSettings, UserStatus};
use crate::store::{Database, SettingsUpdate};
use crate::sync::SyncHandle;

/// Manages profile records and settings for the signed-in user.
pub struct ProfileService {
    db: Arc<Database>,
    auth: Arc<AuthSession>,
    sync: SyncHandle,
    current_user: Publisher<Option<UserProfile>>,
}

impl ProfileService {
    pub fn new(db: Arc<Database>, auth: Arc<AuthSession>, sync: SyncHandle) -> Arc<Self> {
        Arc::new(Self {
            db,
            auth,
            sync,
            current_user: Publisher::new(None),
        })
    }

    /// Snapshot of the current user.
    pub fn current_user(&self) -> Option<UserProfile> {
        self.current_user.get()
    }

    /// Observe the current user; replays the current value on subscribe.
    pub fn subscribe_current_user(&self) -> watch::Receiver<Option<UserProfile>> {
        self.current_user.subscribe()
    }

    /// Create a profile from authentication data, or refresh the stored
    /// identity fields of an existing one.
    pub fn create_or_update_profile(
        &self,
        identity: &Identity,
    ) -> Result<UserProfile, ProfileError> {
        let profile = match self.db.fetch_profile_by_auth_uid(&identity.uid)? {
            Some(existing) => {
                self.db.update_profile_identity(
                    existing.id,
                    &identity.display_name,
                    &identity.phone_number,
                    identity.email.as_deref(),
                )?;
                self.db
                    .fetch_profile(existing.id)?
                    .ok_or(ProfileError::ProfileNotFound)?
            }
            None => {
                debug!("creating profile for {}", identity.uid);
                self.db.create_profile(
                    &identity.uid,
                    &identity.display_name,
                    &identity.phone_number,
                    identity.email.as_deref(),
                )?
            }
        };
        self.current_user.publish(Some(profile.clone()));
        self.sync.notify_local_change();
        Ok(profile)
    }

    /// Partial profile edit for the current user.
    pub fn update_profile(&self, display_name: Option<&str>) -> Result<(), ProfileError> {
        let user = self.current_user().ok_or(ProfileError::NotAuthenticated)?;
        if !self.db.update_profile(user.id, display_name)? {
            return Err(ProfileError::ProfileNotFound);
        }
        let profile = self
            .db
            .fetch_profile(user.id)?
            .ok_or(ProfileError::ProfileNotFound)?;
        self.current_user.publish(Some(profile));
        self.sync.notify_local_change();
        Ok(())
    }

    /// Settings for the current user.
    pub fn settings(&self) -> Result<Option<UserSettings>, ProfileError> {
        let user = self.current_user().ok_or(ProfileError::NotAuthenticated)?;
        Ok(self.db.fetch_settings(user.id)?)
    }

    /// Partial settings update for the current user; only supplied fields
    /// change.
    pub fn update_settings(&self, update: &SettingsUpdate) -> Result<UserSettings, ProfileError> {
        let user = self.current_user().ok_or(ProfileError::NotAuthenticated)?;
        let settings = self.db.update_settings(user.id, update)?;
        self.sync.notify_local_change();
        Ok(settings)
    }

    /// Re-resolve the current user from the identity holder and the store.
    ///
    /// Called on startup and after every sign-in/sign-out. Creates the
    /// local profile from identity fields when none exists yet.
    pub fn refresh_current_user(&self) -> Result<Option<UserProfile>, ProfileError> {
        let Some(identity) = self.auth.current() else {
            self.current_user.publish(None);
            self.auth.status().publish(UserStatus::NotAuthenticated);
            return Ok(None);
        };

        let profile = match self.db.fetch_profile_by_auth_uid(&identity.uid) {
            Ok(Some(profile)) => profile,
            Ok(None) => match self.create_or_update_profile(&identity) {
                Ok(profile) => profile,
                Err(e) => {
                    self.auth.status().publish(UserStatus::Error);
                    return Err(e);
                }
            },
            Err(e) => {
                self.auth.status().publish(UserStatus::Error);
                return Err(e.into());
            }
        };

        self.current_user.publish(Some(profile.clone()));
        self.auth.status().publish(UserStatus::Authenticated);
        Ok(Some(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            uid: "auth-1".to_string(),
            display_name: "Ada".to_string(),
            phone_number: "+15550100".to_string(),
            email: Some("ada@example.com".to_string()),
        }
    }

    fn service() -> (Arc<ProfileService>, Arc<AuthSession>) {
        let db = Arc::new(Database::open_memory().unwrap());
        let auth = Arc::new(AuthSession::new());
        let profiles = ProfileService::new(db, Arc::clone(&auth), SyncHandle::disconnected());
        (profiles, auth)
    }

    #[tokio::test]
    async fn refresh_without_identity_publishes_none() {
        let (profiles, auth) = service();
        assert!(profiles.refresh_current_user().unwrap().is_none());
        assert!(profiles.current_user().is_none());
        assert_eq!(auth.status().get(), UserStatus::NotAuthenticated);
    }

    #[tokio::test]
    async fn refresh_creates_profile_from_identity() {
        let (profiles, auth) = service();
        auth.sign_in(identity());

        let profile = profiles.refresh_current_user().unwrap().unwrap();
        assert_eq!(profile.display_name, "Ada");
        assert_eq!(auth.status().get(), UserStatus::Authenticated);

        // Second refresh finds the same profile instead of creating one.
        let again = profiles.refresh_current_user().unwrap().unwrap();
        assert_eq!(again.id, profile.id);
    }

    #[tokio::test]
    async fn update_settings_requires_user() {
        let (profiles, auth) = service();
        let err = profiles
            .update_settings(&SettingsUpdate::default())
            .unwrap_err();
        assert!(matches!(err, ProfileError::NotAuthenticated));

        auth.sign_in(identity());
        profiles.refresh_current_user().unwrap();
        let settings = profiles
            .update_settings(&SettingsUpdate {
                default_session_duration: Some(600),
                friction_level: Some(7),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(settings.default_session_duration, 600);
        assert_eq!(settings.friction_level, 4);
    }

    #[tokio::test]
    async fn update_profile_edits_display_name() {
        let (profiles, auth) = service();
        auth.sign_in(identity());
        profiles.refresh_current_user().unwrap();

        profiles.update_profile(Some("Ada L.")).unwrap();
        assert_eq!(profiles.current_user().unwrap().display_name, "Ada L.");
    }
}
