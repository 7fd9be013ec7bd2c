//! The task store collaborator.
//!
//! The engine only ever talks to storage through [`TaskStore`]. Multi-write
//! steps (advance the template anchor and create an instance, complete one
//! instance and create the next) are submitted as a single [`WriteBatch`]
//! which a store must apply atomically: either every write lands or none.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{Task, TaskFilter};

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryTaskStore;
pub use sqlite::SqliteTaskStore;

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Create(Task),
    Update(Task),
    Delete(Uuid),
    /// Deletes an instance only while it is still open. A completed or
    /// missing instance rejects the batch with `ConcurrentMutation`.
    DeleteOpen(Uuid),
}

/// Optimistic-concurrency check on a template's `last_generated_date`.
///
/// The batch is rejected with [`CoreError::ConcurrentMutation`] when the
/// stored value differs from `expected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorGuard {
    pub template_id: Uuid,
    pub expected: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
    guards: Vec<AnchorGuard>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(mut self, task: Task) -> Self {
        self.writes.push(Write::Create(task));
        self
    }

    pub fn update(mut self, task: Task) -> Self {
        self.writes.push(Write::Update(task));
        self
    }

    pub fn delete(mut self, id: Uuid) -> Self {
        self.writes.push(Write::Delete(id));
        self
    }

    pub fn delete_open(mut self, id: Uuid) -> Self {
        self.writes.push(Write::DeleteOpen(id));
        self
    }

    /// Requires the template's `last_generated_date` to still equal the value
    /// read before the batch was assembled.
    pub fn guard_anchor(mut self, template: &Task) -> Self {
        self.guards.push(AnchorGuard {
            template_id: template.id,
            expected: template.last_generated_date,
        });
        self
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn guards(&self) -> &[AnchorGuard] {
        &self.guards
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }
}

/// Storage backend for tasks.
///
/// Every method commits atomically; `apply` is the explicit multi-write
/// transaction. Reads must never observe half of a batch.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Task>, CoreError>;

    /// Tasks matching `filter`, oldest first.
    async fn query(&self, filter: &TaskFilter) -> Result<Vec<Task>, CoreError>;

    /// Applies all writes of `batch` or none of them.
    ///
    /// # Errors
    /// - `ConcurrentMutation` if an anchor guard does not match or a
    ///   `DeleteOpen` target is no longer open.
    /// - `NotFound` if an update or delete targets a missing task.
    /// - `InvalidInput` if a create reuses an existing id.
    async fn apply(&self, batch: WriteBatch) -> Result<(), CoreError>;

    async fn create(&self, task: Task) -> Result<Task, CoreError> {
        self.apply(WriteBatch::new().create(task.clone())).await?;
        Ok(task)
    }

    async fn update(&self, task: Task) -> Result<Task, CoreError> {
        self.apply(WriteBatch::new().update(task.clone())).await?;
        Ok(task)
    }

    async fn delete(&self, id: Uuid) -> Result<(), CoreError> {
        self.apply(WriteBatch::new().delete(id)).await
    }
}
