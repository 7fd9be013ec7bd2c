use anyhow::Result;
use cadence_core::engine::{InstanceManager, RecurrenceEngine};
use cadence_core::models::NewTaskData;
use cadence_core::store::TaskStore;
use owo_colors::OwoColorize;

use crate::cli::AddCommand;
use crate::config::Config;
use crate::parser::parse_date;

pub async fn add_task<S: TaskStore>(
    engine: &RecurrenceEngine<S>,
    command: AddCommand,
    config: &Config,
) -> Result<()> {
    let due_date = command
        .due
        .as_deref()
        .map(|d| config.local_now().and_then(|now| parse_date(d, now)))
        .transpose()?;

    let task = engine
        .add_task(NewTaskData {
            title: command.title,
            description: command.description,
            due_date,
        })
        .await?;

    println!(
        "{} Added task '{}' ({})",
        "✓".green().bold(),
        task.title.cyan(),
        task.short_id().yellow()
    );
    if let Some(due) = task.due_date {
        println!("  Due: {}", due);
    }
    Ok(())
}
