use anyhow::{anyhow, Result};
use cadence_core::engine::RecurrenceEngine;
use cadence_core::error::CoreError;
use cadence_core::models::Task;
use cadence_core::store::TaskStore;
use std::future::Future;
use tracing::warn;

pub async fn resolve_task<S: TaskStore>(engine: &RecurrenceEngine<S>, short_id: &str) -> Result<Task> {
    if short_id.len() < 2 {
        return Err(anyhow!(CoreError::InvalidInput(
            "Short ID must be at least 2 characters long.".to_string()
        )));
    }
    let mut tasks = engine.find_tasks_by_id_prefix(short_id).await?;
    match tasks.len() {
        1 => Ok(tasks.remove(0)),
        0 => Err(anyhow!(CoreError::NotFound(format!(
            "No task found with ID prefix '{}'",
            short_id
        )))),
        _ => {
            let task_info: Vec<(String, String)> =
                tasks.into_iter().map(|t| (t.short_id(), t.title)).collect();
            Err(anyhow!(CoreError::AmbiguousId(task_info)))
        }
    }
}

/// Resolves an ID prefix to the template of its series. Both the template
/// itself and any of its occurrences are accepted.
pub async fn resolve_template<S: TaskStore>(
    engine: &RecurrenceEngine<S>,
    short_id: &str,
) -> Result<Task> {
    let task = resolve_task(engine, short_id).await?;
    if task.is_template {
        return Ok(task);
    }
    let group_id = task.recurrence_group_id.ok_or_else(|| {
        anyhow!(CoreError::InvalidInput(format!(
            "'{}' is not part of a recurring series",
            task.title
        )))
    })?;
    engine.series_template(group_id).await?.ok_or_else(|| {
        anyhow!(CoreError::NotFound(format!(
            "The series of '{}' no longer has a template",
            task.title
        )))
    })
}

/// Runs `op` again when another writer changed the same series first.
pub async fn with_retries<T, F, Fut>(max_retries: u32, mut op: F) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(err) if err.is_retryable() && attempt < max_retries => {
                attempt += 1;
                warn!(attempt, error = %err, "series changed concurrently, retrying");
            }
            result => return result,
        }
    }
}
