use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::{RecurrenceEngine, SeriesMutations};
use crate::error::CoreError;
use crate::models::{DeleteScope, DeletionSummary, RecurrenceRule, Task, TaskFilter};
use crate::recurrence::RecurrenceEvaluator;
use crate::store::{TaskStore, WriteBatch};

#[async_trait]
impl<S: TaskStore> SeriesMutations for RecurrenceEngine<S> {
    /// Deletes one instance or every open instance of a series.
    ///
    /// Completed instances are only ever removed when named explicitly
    /// through `OnlyThisInstance`. With `AllOpenInstances` the template is
    /// deactivated as well when `EngineConfig::deactivate_on_series_delete`
    /// is set, so the series stops generating.
    ///
    /// # Errors
    /// - `NotFound` if `OnlyThisInstance` names a task that does not exist or
    ///   is not an instance of `group_id`.
    /// - `ConcurrentMutation` if another process advanced the series or
    ///   completed one of its open instances meanwhile. Nothing was written.
    async fn delete_series(
        &self,
        group_id: Uuid,
        scope: DeleteScope,
    ) -> Result<DeletionSummary, CoreError> {
        let _guard = self.locks().lock(group_id).await;

        match scope {
            DeleteScope::OnlyThisInstance(instance_id) => {
                let instance = self
                    .store
                    .find_by_id(instance_id)
                    .await?
                    .filter(|t| !t.is_template && t.recurrence_group_id == Some(group_id))
                    .ok_or_else(|| {
                        CoreError::NotFound(format!(
                            "Instance {} not found in series {}",
                            instance_id, group_id
                        ))
                    })?;
                self.store.delete(instance.id).await?;
                info!(%group_id, %instance_id, "deleted instance");
                Ok(DeletionSummary {
                    removed: 1,
                    template_deactivated: false,
                })
            }
            DeleteScope::AllOpenInstances => {
                // Templates are read before the instances. A writer in another
                // process that completes an instance in between moves the
                // anchor, and the guard rejects the whole batch.
                let templates = self.store.query(&TaskFilter::template_of(group_id)).await?;
                let open = self.store.query(&TaskFilter::open_instances(group_id)).await?;
                let mut batch = templates
                    .iter()
                    .fold(WriteBatch::new(), |batch, t| batch.guard_anchor(t));
                batch = open.iter().fold(batch, |batch, t| batch.delete_open(t.id));

                let mut template_deactivated = false;
                if self.config.deactivate_on_series_delete {
                    for template in templates.into_iter().filter(|t| t.active) {
                        batch = batch.update(Task {
                            active: false,
                            updated_at: Utc::now(),
                            ..template
                        });
                        template_deactivated = true;
                    }
                }

                if batch.is_empty() {
                    return Ok(DeletionSummary::default());
                }
                self.store.apply(batch).await?;

                info!(
                    %group_id,
                    removed = open.len(),
                    template_deactivated,
                    "deleted open instances of series"
                );
                Ok(DeletionSummary {
                    removed: open.len(),
                    template_deactivated,
                })
            }
        }
    }

    /// Replaces the template's rule.
    ///
    /// With `propagate` the open instance is moved to the first occurrence
    /// after the template's anchor under the new rule. Otherwise it keeps its
    /// due date and only later generations follow the new rule.
    async fn edit_template(
        &self,
        template_id: Uuid,
        rule: RecurrenceRule,
        propagate: bool,
    ) -> Result<Task, CoreError> {
        rule.validate()?;
        let template = self.load_template(template_id).await?;
        let _guard = self.locks().lock(template.series_key()).await;
        let template = self.load_template(template_id).await?;

        let now = Utc::now();
        let mut updated = template.clone();
        updated.rule = Some(rule);
        updated.updated_at = now;
        let mut batch = WriteBatch::new().guard_anchor(&template);

        let open = match (propagate, template.recurrence_group_id) {
            (true, Some(group_id)) => self
                .store
                .query(&TaskFilter::open_instances(group_id))
                .await?
                .into_iter()
                .next(),
            _ => None,
        };
        if let Some(open) = open {
            let anchor = template.anchor_date.ok_or_else(|| {
                CoreError::Configuration(format!("template {} has no anchor date", template.id))
            })?;
            let due = RecurrenceEvaluator::next_occurrence(anchor, &rule)?;
            // last_generated_date never moves backwards.
            updated.last_generated_date = template.last_generated_date.max(Some(due));
            batch = batch.update(Task {
                rule: Some(rule),
                due_date: Some(due),
                updated_at: now,
                ..open
            });
        }

        batch = batch.update(updated.clone());
        self.store.apply(batch).await?;
        info!(%template_id, rule = %rule, propagate, "edited template");
        Ok(updated)
    }
}
