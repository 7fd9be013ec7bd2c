use anyhow::Result;
use cadence_core::engine::{InstanceManager, RecurrenceEngine};
use cadence_core::store::TaskStore;
use owo_colors::OwoColorize;

use crate::cli::UndoCommand;
use crate::config::Config;
use crate::util::{resolve_task, with_retries};

pub async fn undo_task<S: TaskStore>(
    engine: &RecurrenceEngine<S>,
    command: UndoCommand,
    config: &Config,
) -> Result<()> {
    let task = resolve_task(engine, &command.id).await?;
    if !task.is_completed && !task.is_template {
        println!("Task '{}' is not completed.", task.title);
        return Ok(());
    }

    let reopened = with_retries(config.max_retries, || engine.uncomplete_instance(task.id)).await?;
    println!("{} Reopened task: '{}'", "↺".yellow().bold(), reopened.title);
    Ok(())
}
