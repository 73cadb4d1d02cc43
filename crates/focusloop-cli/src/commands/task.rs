use clap::Subcommand;
use focusloop_core::store::{NewTask, TaskUpdate};
use uuid::Uuid;

use crate::common::{self, CliError};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a task
    Add {
        title: String,
        #[arg(long)]
        details: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Priority 0-3
        #[arg(long, default_value = "0")]
        priority: i64,
        #[arg(long)]
        important: bool,
        /// Estimated duration in seconds
        #[arg(long)]
        estimated: Option<i64>,
    },
    /// List tasks (current user's view; --all includes completed)
    List {
        #[arg(long)]
        json: bool,
        #[arg(long)]
        all: bool,
    },
    /// Mark a task completed
    Done { id: Uuid },
    /// Edit a task; only supplied flags change
    Edit {
        id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        details: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        priority: Option<i64>,
        #[arg(long)]
        important: Option<bool>,
        #[arg(long)]
        estimated: Option<i64>,
    },
    /// Delete a task
    Rm { id: Uuid },
}

pub async fn run(action: TaskAction) -> Result<(), CliError> {
    let app = common::bootstrap().await?;

    match action {
        TaskAction::Add {
            title,
            details,
            category,
            priority,
            important,
            estimated,
        } => {
            let task = app.tasks.create_task(&NewTask {
                title,
                details,
                category,
                due_date: None,
                priority,
                is_important: important,
                estimated_duration: estimated,
            })?;
            println!("Task created: {} ({})", task.title, task.id);
        }
        TaskAction::List { json, all } => {
            let tasks = if all {
                let Some(user) = app.profiles.current_user() else {
                    println!("[]");
                    return Ok(());
                };
                app.db.fetch_tasks(user.id, true)?
            } else {
                app.tasks.refresh_tasks()?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                for task in &tasks {
                    let mark = if task.is_completed { "x" } else { " " };
                    println!("[{mark}] {}  {}", task.id, task.title);
                }
            }
        }
        TaskAction::Done { id } => {
            let task = app.tasks.complete_task(id)?;
            println!("Completed: {}", task.title);
        }
        TaskAction::Edit {
            id,
            title,
            details,
            category,
            priority,
            important,
            estimated,
        } => {
            let task = app.tasks.update_task(
                id,
                &TaskUpdate {
                    title,
                    details,
                    category,
                    due_date: None,
                    priority,
                    is_important: important,
                    estimated_duration: estimated,
                },
            )?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::Rm { id } => {
            app.tasks.delete_task(id)?;
            println!("Deleted {id}");
        }
    }

    Ok(())
}
