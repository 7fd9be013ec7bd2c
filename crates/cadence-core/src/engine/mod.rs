//! The recurring task template engine.
//!
//! [`RecurrenceEngine`] ties the evaluator, the visibility rules and a
//! [`TaskStore`] together. Its operations are grouped into domain traits
//! implemented in the sibling modules:
//!
//! - [`InstanceManager`] (`instances`): templates, instance generation and
//!   completion.
//! - [`SeriesMutations`] (`series`): series-wide deletes and template edits.
//! - [`SeriesMaintenance`] (`maintenance`): migrating legacy recurring tasks
//!   and merging duplicate templates.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::CoreError;
use crate::models::{
    DeleteScope, DeletionSummary, EngineConfig, NewTaskData, NewTemplateData, RecurrenceRule,
    Task, TaskFilter,
};
use crate::recurrence::RecurrenceEvaluator;
use crate::store::TaskStore;
use crate::visibility::VisibilityFilter;

pub mod instances;
pub mod locks;
pub mod maintenance;
pub mod series;

pub use locks::{SeriesGuard, SeriesLocks};

/// Domain trait for the template to instance lifecycle
#[async_trait]
pub trait InstanceManager {
    async fn create_template(&self, data: NewTemplateData) -> Result<Task, CoreError>;
    async fn add_task(&self, data: NewTaskData) -> Result<Task, CoreError>;
    async fn ensure_open_instance(&self, template_id: Uuid) -> Result<Option<Task>, CoreError>;
    async fn complete_instance(&self, task_id: Uuid) -> Result<Option<Task>, CoreError>;
    async fn uncomplete_instance(&self, task_id: Uuid) -> Result<Task, CoreError>;
}

/// Domain trait for series-wide mutations
#[async_trait]
pub trait SeriesMutations {
    async fn delete_series(
        &self,
        group_id: Uuid,
        scope: DeleteScope,
    ) -> Result<DeletionSummary, CoreError>;
    async fn edit_template(
        &self,
        template_id: Uuid,
        rule: RecurrenceRule,
        propagate: bool,
    ) -> Result<Task, CoreError>;
}

/// Domain trait for bulk repairs of stored series
#[async_trait]
pub trait SeriesMaintenance {
    async fn migrate_to_template_model(&self) -> Result<usize, CoreError>;
    async fn deduplicate_templates(&self) -> Result<usize, CoreError>;
}

pub struct RecurrenceEngine<S: TaskStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    locks: SeriesLocks,
}

impl<S: TaskStore> RecurrenceEngine<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self::with_shared_store(Arc::new(store), clock, config)
    }

    /// Builds an engine over a store that other components also hold.
    pub fn with_shared_store(store: Arc<S>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            store,
            clock,
            config,
            locks: SeriesLocks::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub(crate) fn locks(&self) -> &SeriesLocks {
        &self.locks
    }

    pub async fn find_task(&self, id: Uuid) -> Result<Option<Task>, CoreError> {
        self.store.find_by_id(id).await
    }

    /// Tasks whose full or short id starts with `prefix`.
    pub async fn find_tasks_by_id_prefix(&self, prefix: &str) -> Result<Vec<Task>, CoreError> {
        let tasks = self.store.query(&TaskFilter::all()).await?;
        Ok(tasks
            .into_iter()
            .filter(|t| t.matches_id_prefix(prefix))
            .collect())
    }

    /// Loads a task that must exist and be a template.
    pub(crate) async fn load_template(&self, template_id: Uuid) -> Result<Task, CoreError> {
        let task = self
            .store
            .find_by_id(template_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Template {} not found", template_id)))?;
        if !task.is_template {
            return Err(CoreError::InvalidInput(format!(
                "Task {} is not a recurring template",
                template_id
            )));
        }
        Ok(task)
    }

    /// The template representing `group_id`, newest first if several exist.
    pub async fn series_template(&self, group_id: Uuid) -> Result<Option<Task>, CoreError> {
        let templates = self.store.query(&TaskFilter::template_of(group_id)).await?;
        Ok(templates.into_iter().max_by_key(|t| t.created_at))
    }

    /// Normal task list for the clock's today.
    pub async fn backlog(&self) -> Result<Vec<Task>, CoreError> {
        let candidates = self
            .store
            .query(&TaskFilter::incomplete_non_templates())
            .await?;
        Ok(VisibilityFilter::backlog(&candidates, self.today()))
    }

    /// The recurring-series view: exactly one template per series.
    pub async fn recurring_series(&self) -> Result<Vec<Task>, CoreError> {
        let templates = self.store.query(&TaskFilter::templates()).await?;
        Ok(VisibilityFilter::series_view(&templates))
    }

    /// Completed instances of a series, most recently completed first.
    pub async fn series_history(&self, group_id: Uuid) -> Result<Vec<Task>, CoreError> {
        let mut done = self
            .store
            .query(&TaskFilter::completed_instances(group_id))
            .await?;
        done.sort_by(|a, b| {
            b.completed_at
                .cmp(&a.completed_at)
                .then(b.due_date.cmp(&a.due_date))
        });
        Ok(done)
    }

    /// Upcoming due dates the template would generate, without writing.
    pub async fn preview(&self, template_id: Uuid, count: usize) -> Result<Vec<NaiveDate>, CoreError> {
        let template = self.load_template(template_id).await?;
        let rule = template_rule(&template)?;
        let base = template.generation_base().unwrap_or_else(|| self.today());
        RecurrenceEvaluator::preview(base, &rule, count)
    }
}

pub(crate) fn template_rule(template: &Task) -> Result<RecurrenceRule, CoreError> {
    template.rule.ok_or_else(|| {
        CoreError::Configuration(format!("template {} has no recurrence rule", template.id))
    })
}
