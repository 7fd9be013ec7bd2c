use anyhow::Result;
use cadence_core::engine::{InstanceManager, RecurrenceEngine};
use cadence_core::models::TaskFilter;
use cadence_core::store::TaskStore;

use crate::cli::ListCommand;
use crate::config::Config;
use crate::util::with_retries;
use crate::views::table::display_tasks;

pub async fn list_tasks<S: TaskStore>(
    engine: &RecurrenceEngine<S>,
    command: ListCommand,
    config: &Config,
) -> Result<()> {
    // Every running series gets its open occurrence before listing.
    for template in engine.recurring_series().await? {
        if template.active {
            with_retries(config.max_retries, || engine.ensure_open_instance(template.id)).await?;
        }
    }

    let tasks = if command.all {
        let mut open = engine
            .store()
            .query(&TaskFilter::incomplete_non_templates())
            .await?;
        open.sort_by_key(|t| (t.due_date.is_none(), t.due_date, t.created_at));
        open
    } else {
        engine.backlog().await?
    };

    display_tasks(&tasks, engine.today());
    Ok(())
}
