use clap::Subcommand;
use focusloop_core::model::Identity;
use focusloop_core::store::SettingsUpdate;

use crate::common::{self, CliError};

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Sign in with identity-provider fields and create or update the profile
    Init {
        /// External authentication uid
        #[arg(long)]
        uid: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// Phone number
        #[arg(long)]
        phone: String,
        /// Optional recovery email
        #[arg(long)]
        email: Option<String>,
    },
    /// Print the current profile
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Update settings; only supplied flags change
    Settings {
        #[arg(long)]
        theme: Option<String>,
        /// Default session duration in seconds
        #[arg(long)]
        default_duration: Option<i64>,
        #[arg(long)]
        friction: Option<bool>,
        /// Friction level, clamped to 1-4
        #[arg(long)]
        friction_level: Option<i64>,
        #[arg(long)]
        notifications: Option<bool>,
        #[arg(long)]
        show_completed: Option<bool>,
        #[arg(long)]
        sync_across_devices: Option<bool>,
    },
    /// Sign out and forget the stored identity
    SignOut,
}

pub async fn run(action: ProfileAction) -> Result<(), CliError> {
    let app = common::bootstrap().await?;

    match action {
        ProfileAction::Init {
            uid,
            name,
            phone,
            email,
        } => {
            let identity = Identity {
                uid,
                display_name: name,
                phone_number: phone,
                email,
            };
            app.auth.sign_in(identity.clone());
            let profile = app
                .profiles
                .refresh_current_user()?
                .ok_or("profile creation failed")?;
            common::persist_identity(&app, &identity)?;
            println!("Signed in as {} ({})", profile.display_name, profile.auth_uid);
        }
        ProfileAction::Show { json } => {
            let Some(profile) = app.profiles.current_user() else {
                println!("No profile; run `focusloop profile init` first.");
                return Ok(());
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&profile)?);
            } else {
                println!("{} <{}>", profile.display_name, profile.phone_number);
                if let Some(settings) = app.profiles.settings()? {
                    println!(
                        "theme: {} / default duration: {}s / friction level: {}",
                        settings.theme,
                        settings.default_session_duration,
                        settings.friction_level
                    );
                }
            }
        }
        ProfileAction::Settings {
            theme,
            default_duration,
            friction,
            friction_level,
            notifications,
            show_completed,
            sync_across_devices,
        } => {
            let settings = app.profiles.update_settings(&SettingsUpdate {
                theme,
                default_session_duration: default_duration,
                friction_enabled: friction,
                friction_level,
                haptic_enabled: None,
                notifications_enabled: notifications,
                show_completed_tasks: show_completed,
                sync_across_devices,
            })?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        ProfileAction::SignOut => {
            app.auth.sign_out();
            common::clear_identity(&app)?;
            println!("Signed out.");
        }
    }

    Ok(())
}
