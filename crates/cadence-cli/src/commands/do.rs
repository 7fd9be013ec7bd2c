use anyhow::Result;
use cadence_core::engine::{InstanceManager, RecurrenceEngine};
use cadence_core::store::TaskStore;
use owo_colors::OwoColorize;

use crate::cli::DoCommand;
use crate::config::Config;
use crate::util::{resolve_task, with_retries};
use crate::views::table::relative_day;

pub async fn do_task<S: TaskStore>(
    engine: &RecurrenceEngine<S>,
    command: DoCommand,
    config: &Config,
) -> Result<()> {
    let task = resolve_task(engine, &command.id).await?;
    if task.is_completed {
        println!("Task '{}' is already completed.", task.title);
        return Ok(());
    }

    let next = with_retries(config.max_retries, || engine.complete_instance(task.id)).await?;
    println!("{} Completed task: '{}'", "✓".green().bold(), task.title);

    if let Some(next) = next {
        match next.due_date {
            Some(due) => println!(
                "Next occurrence of '{}' is due {} ({})",
                next.title,
                due,
                relative_day(due, engine.today())
            ),
            None => println!("Created next occurrence of '{}'", next.title),
        }
    }
    Ok(())
}
