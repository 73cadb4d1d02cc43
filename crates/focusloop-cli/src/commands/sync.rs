use clap::Subcommand;

use crate::common::{self, CliError};

#[derive(Subcommand)]
pub enum SyncAction {
    /// Run one full sync pass against the configured remote
    Now {
        #[arg(long)]
        json: bool,
    },
    /// Print sync status and the last successful sync time
    Status,
}

pub async fn run(action: SyncAction) -> Result<(), CliError> {
    let app = common::bootstrap().await?;

    match action {
        SyncAction::Now { json } => {
            let report = app.engine.perform_full_sync().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Synced: {} task(s) pushed, {} pulled; {} session(s) pushed, {} pulled.",
                    report.tasks_pushed,
                    report.tasks_pulled,
                    report.sessions_pushed,
                    report.sessions_pulled
                );
            }
        }
        SyncAction::Status => {
            println!("{:?}", app.engine.status().get());
            match app.engine.last_sync_time() {
                Some(at) => println!("Last successful sync: {at}"),
                None => println!("Never synced."),
            }
        }
    }

    Ok(())
}
