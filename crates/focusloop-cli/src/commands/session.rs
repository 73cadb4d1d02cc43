use std::io::Write;

use clap::Subcommand;
use focusloop_core::model::SessionState;
use uuid::Uuid;

use crate::common::{self, CliError};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a focus session
    Start {
        /// Link the session to a task
        #[arg(long)]
        task: Option<Uuid>,
        #[arg(long)]
        title: Option<String>,
        /// Duration in seconds; defaults to the profile setting
        #[arg(long)]
        duration: Option<i64>,
    },
    /// Pause the running session
    Pause,
    /// Resume a paused session
    Resume,
    /// Complete the active session
    Complete,
    /// Cancel the active session
    Cancel,
    /// Print the current session state
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Drive the countdown in the foreground until the session ends
    Run,
    /// Raise a friction event against the active session
    Friction {
        /// Friction level 1-4
        #[arg(long, default_value = "2")]
        level: i64,
        #[arg(long, default_value = "default")]
        task_type: String,
    },
}

pub async fn run(action: SessionAction) -> Result<(), CliError> {
    let app = common::bootstrap().await?;

    match action {
        SessionAction::Start {
            task,
            title,
            duration,
        } => {
            let session = app.sessions.start(task, title, duration)?;
            println!(
                "Session started: {} ({}s)",
                session.title, session.target_duration
            );
        }
        SessionAction::Pause => {
            app.sessions.pause()?;
            println!("Paused at {}s remaining.", app.sessions.remaining_time());
        }
        SessionAction::Resume => {
            app.sessions.resume()?;
            println!("Resumed at {}s remaining.", app.sessions.remaining_time());
        }
        SessionAction::Complete => {
            app.sessions.complete()?;
            println!("Session completed.");
        }
        SessionAction::Cancel => {
            app.sessions.cancel()?;
            println!("Session canceled.");
        }
        SessionAction::Status { json } => {
            let state = app.sessions.state();
            let remaining = app.sessions.remaining_time();
            if json {
                let status = serde_json::json!({
                    "state": state,
                    "remaining_secs": remaining,
                    "session": app.sessions.current_session(),
                });
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{state:?}: {remaining}s remaining");
            }
        }
        SessionAction::Run => {
            let mut state_rx = app.sessions.subscribe_state();
            let state = *state_rx.borrow_and_update();
            if !matches!(state, SessionState::Running | SessionState::Paused) {
                println!("No active session.");
                return Ok(());
            }
            let mut remaining_rx = app.sessions.subscribe_remaining_time();
            loop {
                tokio::select! {
                    changed = remaining_rx.changed() => {
                        changed?;
                        print!("\r{:>6}s remaining ", *remaining_rx.borrow_and_update());
                        std::io::stdout().flush()?;
                    }
                    changed = state_rx.changed() => {
                        changed?;
                        let state = *state_rx.borrow_and_update();
                        if state.is_terminal() {
                            println!();
                            println!("Session {state:?}.");
                            break;
                        }
                    }
                }
            }
        }
        SessionAction::Friction { level, task_type } => {
            let event = app.sessions.create_friction_event(level, &task_type)?;
            println!("Friction event {} (level {}).", event.id, event.friction_level);
        }
    }

    Ok(())
}
