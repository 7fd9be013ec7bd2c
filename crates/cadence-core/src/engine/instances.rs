use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::{template_rule, InstanceManager, RecurrenceEngine};
use crate::error::CoreError;
use crate::models::{NewTaskData, NewTemplateData, Task, TaskFilter};
use crate::recurrence::RecurrenceEvaluator;
use crate::store::{TaskStore, WriteBatch};

/// The next instance of `template` together with the template advanced to
/// it. Nothing is written.
pub(crate) fn plan_next_instance(template: &Task) -> Result<(Task, Task), CoreError> {
    let rule = template_rule(template)?;
    let base = template.generation_base().ok_or_else(|| {
        CoreError::Configuration(format!("template {} has no anchor date", template.id))
    })?;
    let due = RecurrenceEvaluator::next_occurrence(base, &rule)?;
    let group_id = template.series_key();
    let now = Utc::now();

    let instance = Task {
        id: Uuid::now_v7(),
        title: template.title.clone(),
        description: template.description.clone(),
        recurrence_group_id: Some(group_id),
        rule: Some(rule),
        due_date: Some(due),
        created_at: now,
        updated_at: now,
        ..Default::default()
    };

    let mut advanced = template.clone();
    advanced.recurrence_group_id = Some(group_id);
    advanced.last_generated_date = Some(due);
    advanced.updated_at = now;

    Ok((advanced, instance))
}

fn validate_title(title: &str) -> Result<String, CoreError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CoreError::InvalidInput("Title cannot be empty".to_string()));
    }
    Ok(title.to_string())
}

impl<S: TaskStore> RecurrenceEngine<S> {
    /// Generation step for a template whose series lock is held.
    async fn ensure_open_locked(&self, template: Task) -> Result<Option<Task>, CoreError> {
        if let Some(group_id) = template.recurrence_group_id {
            let open = self.store.query(&TaskFilter::open_instances(group_id)).await?;
            if let Some(existing) = open.into_iter().next() {
                return Ok(Some(existing));
            }
        }

        if !template.active {
            info!(template_id = %template.id, "series is terminated, not generating");
            return Ok(None);
        }

        let (advanced, instance) = plan_next_instance(&template)?;
        let batch = WriteBatch::new()
            .guard_anchor(&template)
            .update(advanced)
            .create(instance.clone());
        self.store.apply(batch).await?;

        info!(
            template_id = %template.id,
            instance_id = %instance.id,
            due = ?instance.due_date,
            "generated instance"
        );
        Ok(Some(instance))
    }
}

#[async_trait]
impl<S: TaskStore> InstanceManager for RecurrenceEngine<S> {
    async fn create_template(&self, data: NewTemplateData) -> Result<Task, CoreError> {
        data.rule.validate()?;
        let title = validate_title(&data.title)?;

        let template = Task {
            title,
            description: data.description,
            recurrence_group_id: Some(Uuid::now_v7()),
            is_template: true,
            rule: Some(data.rule),
            anchor_date: Some(data.anchor_date.unwrap_or_else(|| self.today())),
            ..Default::default()
        };
        let template = self.store.create(template).await?;
        info!(template_id = %template.id, rule = %data.rule, "created template");
        Ok(template)
    }

    async fn add_task(&self, data: NewTaskData) -> Result<Task, CoreError> {
        let task = Task {
            title: validate_title(&data.title)?,
            description: data.description,
            due_date: data.due_date,
            ..Default::default()
        };
        self.store.create(task).await
    }

    /// Returns the open instance of the template's series, generating it
    /// when none exists.
    ///
    /// # Returns
    /// `None` when the series has been terminated.
    ///
    /// # Errors
    /// - `NotFound` if the template does not exist.
    /// - `ConcurrentMutation` if another process advanced the template
    ///   first. Nothing was written; call again.
    async fn ensure_open_instance(&self, template_id: Uuid) -> Result<Option<Task>, CoreError> {
        let template = self.load_template(template_id).await?;
        let _guard = self.locks().lock(template.series_key()).await;

        // Re-read under the lock; the first read only found the key.
        let template = self.load_template(template_id).await?;
        self.ensure_open_locked(template).await
    }

    /// Completes a task. For a series instance the following instance is
    /// generated in the same write batch and returned.
    async fn complete_instance(&self, task_id: Uuid) -> Result<Option<Task>, CoreError> {
        let task = self
            .store
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Task {} not found", task_id)))?;
        if task.is_template {
            return Err(CoreError::InvalidInput(
                "A recurring template cannot be completed".to_string(),
            ));
        }
        if task.is_completed {
            return Ok(None);
        }

        let now = Utc::now();
        let Some(group_id) = task.recurrence_group_id else {
            let done = Task {
                is_completed: true,
                completed_at: Some(now),
                updated_at: now,
                ..task
            };
            self.store.update(done).await?;
            return Ok(None);
        };

        let _guard = self.locks().lock(group_id).await;

        let task = match self.store.find_by_id(task_id).await? {
            Some(task) if !task.is_completed => task,
            Some(_) => return Ok(None),
            None => return Err(CoreError::NotFound(format!("Task {} not found", task_id))),
        };
        let done = Task {
            is_completed: true,
            completed_at: Some(now),
            updated_at: now,
            ..task
        };

        let template = match self.series_template(group_id).await? {
            Some(template) if template.active => template,
            Some(template) => {
                info!(template_id = %template.id, "series is terminated, completing without successor");
                self.store.update(done).await?;
                return Ok(None);
            }
            None => {
                warn!(%group_id, "template of series is gone, treating series as terminated");
                self.store.update(done).await?;
                return Ok(None);
            }
        };

        let other_open = self
            .store
            .query(&TaskFilter::open_instances(group_id))
            .await?
            .into_iter()
            .any(|t| t.id != task_id);
        if other_open {
            self.store.update(done).await?;
            return Ok(None);
        }

        let (advanced, next) = plan_next_instance(&template)?;
        // The completion comes first so the series never holds two open
        // instances, not even inside the batch.
        let batch = WriteBatch::new()
            .guard_anchor(&template)
            .update(done)
            .update(advanced)
            .create(next.clone());
        self.store.apply(batch).await?;

        info!(
            completed = %task_id,
            next = %next.id,
            due = ?next.due_date,
            "completed instance"
        );
        Ok(Some(next))
    }

    /// Undoes a completion. For a series instance the open instance that
    /// the completion generated is withdrawn in the same write batch, and
    /// the template's `last_generated_date` goes back to the reopened due
    /// date, so completing again yields the same successor.
    ///
    /// Only the latest completion of a series can be undone.
    ///
    /// # Errors
    /// - `NotFound` if the task does not exist.
    /// - `InvalidInput` for templates, for an older completion, and when the
    ///   series already had an open instance before this completion.
    /// - `ConcurrentMutation` if another process changed the series meanwhile.
    async fn uncomplete_instance(&self, task_id: Uuid) -> Result<Task, CoreError> {
        let task = self
            .store
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Task {} not found", task_id)))?;
        if task.is_template {
            return Err(CoreError::InvalidInput(
                "A recurring template cannot be reopened".to_string(),
            ));
        }
        if !task.is_completed {
            return Ok(task);
        }

        let now = Utc::now();
        let Some(group_id) = task.recurrence_group_id else {
            let reopened = reopen(task, now);
            self.store.update(reopened.clone()).await?;
            return Ok(reopened);
        };

        let _guard = self.locks().lock(group_id).await;

        let task = match self.store.find_by_id(task_id).await? {
            Some(task) if task.is_completed => task,
            Some(task) => return Ok(task),
            None => return Err(CoreError::NotFound(format!("Task {} not found", task_id))),
        };

        let later_completion = self
            .store
            .query(&TaskFilter::completed_instances(group_id))
            .await?
            .into_iter()
            .any(|t| t.id != task.id && t.completed_at > task.completed_at);
        if later_completion {
            return Err(CoreError::InvalidInput(format!(
                "Only the latest completion of '{}' can be undone",
                task.title
            )));
        }

        let template = self.series_template(group_id).await?;
        let open = self.store.query(&TaskFilter::open_instances(group_id)).await?;
        // Successors are created after the completion timestamp is taken.
        let generated_by_completion =
            |t: &Task| task.completed_at.is_some_and(|done| t.created_at >= done);
        if let Some(blocking) = open.iter().find(|t| !generated_by_completion(t)) {
            return Err(CoreError::InvalidInput(format!(
                "'{}' already has an open occurrence ({})",
                task.title,
                blocking.short_id()
            )));
        }

        // Successors go first so the series never holds two open instances.
        let mut batch = template
            .iter()
            .fold(WriteBatch::new(), |batch, t| batch.guard_anchor(t));
        batch = open.iter().fold(batch, |batch, t| batch.delete_open(t.id));

        if let Some(template) = template {
            let withdrawn = open
                .iter()
                .any(|t| t.due_date.is_some() && t.due_date == template.last_generated_date);
            if withdrawn && task.due_date.is_some() && task.due_date < template.last_generated_date {
                batch = batch.update(Task {
                    last_generated_date: task.due_date,
                    updated_at: now,
                    ..template
                });
            }
        }

        let reopened = reopen(task, now);
        batch = batch.update(reopened.clone());
        self.store.apply(batch).await?;

        info!(
            reopened = %task_id,
            withdrawn = open.len(),
            "undid completion"
        );
        Ok(reopened)
    }
}

fn reopen(task: Task, now: DateTime<Utc>) -> Task {
    Task {
        is_completed: false,
        completed_at: None,
        updated_at: now,
        ..task
    }
}
