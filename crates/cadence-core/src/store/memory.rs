use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{TaskStore, Write, WriteBatch};
use crate::error::CoreError;
use crate::models::{Task, TaskFilter};

/// Process-local store. A batch is validated in full and then applied under
/// one write lock, so readers only ever see complete batches.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store, e.g. with legacy data in tests.
    pub fn with_tasks<I: IntoIterator<Item = Task>>(tasks: I) -> Self {
        Self {
            tasks: RwLock::new(tasks.into_iter().map(|t| (t.id, t)).collect()),
        }
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

fn check_batch(tasks: &HashMap<Uuid, Task>, batch: &WriteBatch) -> Result<(), CoreError> {
    for guard in batch.guards() {
        let template = tasks
            .get(&guard.template_id)
            .ok_or_else(|| CoreError::NotFound(format!("Template {} not found", guard.template_id)))?;
        if template.last_generated_date != guard.expected {
            return Err(CoreError::ConcurrentMutation(guard.template_id));
        }
    }

    // Ids created earlier in the same batch count as existing.
    let mut created: Vec<Uuid> = Vec::new();
    let mut deleted: Vec<Uuid> = Vec::new();
    for write in batch.writes() {
        match write {
            Write::Create(task) => {
                if tasks.contains_key(&task.id) || created.contains(&task.id) {
                    return Err(CoreError::InvalidInput(format!("Task {} already exists", task.id)));
                }
                created.push(task.id);
            }
            Write::Update(task) => {
                let exists = (tasks.contains_key(&task.id) || created.contains(&task.id))
                    && !deleted.contains(&task.id);
                if !exists {
                    return Err(CoreError::NotFound(format!("Task {} not found", task.id)));
                }
            }
            Write::Delete(id) => {
                let exists =
                    (tasks.contains_key(id) || created.contains(id)) && !deleted.contains(id);
                if !exists {
                    return Err(CoreError::NotFound(format!("Task {} not found", id)));
                }
                deleted.push(*id);
            }
            Write::DeleteOpen(id) => {
                let open = tasks.get(id).is_some_and(|t| !t.is_completed) && !deleted.contains(id);
                if !open {
                    return Err(CoreError::ConcurrentMutation(*id));
                }
                deleted.push(*id);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Task>, CoreError> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn query(&self, filter: &TaskFilter) -> Result<Vec<Task>, CoreError> {
        let tasks = self.tasks.read().await;
        let mut matched: Vec<Task> = tasks.values().filter(|t| filter.matches(t)).cloned().collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matched)
    }

    async fn apply(&self, batch: WriteBatch) -> Result<(), CoreError> {
        let mut tasks = self.tasks.write().await;
        check_batch(&tasks, &batch)?;

        for write in batch.writes {
            match write {
                Write::Create(task) | Write::Update(task) => {
                    tasks.insert(task.id, task);
                }
                Write::Delete(id) | Write::DeleteOpen(id) => {
                    tasks.remove(&id);
                }
            }
        }
        Ok(())
    }
}
