use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, Transaction};
use uuid::Uuid;

use super::{AnchorGuard, TaskStore, Write, WriteBatch};
use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{RecurrenceRule, Task, TaskFilter};

/// SQLite-backed store. Every batch runs inside one sqlx transaction.
#[derive(Debug, Clone)]
pub struct SqliteTaskStore {
    pool: DbPool,
}

impl SqliteTaskStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    recurrence_group_id: Option<Uuid>,
    is_template: bool,
    rule: Option<String>,
    anchor_date: Option<NaiveDate>,
    last_generated_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    is_completed: bool,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRow> for Task {
    type Error = CoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let rule = row
            .rule
            .as_deref()
            .map(serde_json::from_str::<RecurrenceRule>)
            .transpose()?;
        Ok(Task {
            id: row.id,
            title: row.title,
            description: row.description,
            recurrence_group_id: row.recurrence_group_id,
            is_template: row.is_template,
            rule,
            anchor_date: row.anchor_date,
            last_generated_date: row.last_generated_date,
            due_date: row.due_date,
            is_completed: row.is_completed,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

fn encode_rule(task: &Task) -> Result<Option<String>, CoreError> {
    Ok(task.rule.as_ref().map(serde_json::to_string).transpose()?)
}

fn map_insert_error(err: sqlx::Error, id: Uuid) -> CoreError {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => {
            CoreError::InvalidInput(format!("Task {} conflicts with an existing task", id))
        }
        _ => CoreError::Database(err),
    }
}

impl SqliteTaskStore {
    async fn check_guard<'a>(
        tx: &mut Transaction<'a, Sqlite>,
        guard: &AnchorGuard,
    ) -> Result<(), CoreError> {
        // A no-op write takes SQLite's write lock, so no other connection can
        // move the anchor between this check and commit.
        let result = sqlx::query(
            "UPDATE tasks SET updated_at = updated_at WHERE id = $1 AND last_generated_date IS $2",
        )
        .bind(guard.template_id)
        .bind(guard.expected)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM tasks WHERE id = $1")
            .bind(guard.template_id)
            .fetch_optional(&mut **tx)
            .await?;
        match exists {
            Some(_) => Err(CoreError::ConcurrentMutation(guard.template_id)),
            None => Err(CoreError::NotFound(format!(
                "Template {} not found",
                guard.template_id
            ))),
        }
    }

    async fn insert_task<'a>(tx: &mut Transaction<'a, Sqlite>, task: &Task) -> Result<(), CoreError> {
        let rule = encode_rule(task)?;
        sqlx::query(
            r#"INSERT INTO tasks (id, title, description, recurrence_group_id, is_template, rule,
                anchor_date, last_generated_date, due_date, is_completed, active,
                created_at, updated_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"#,
        )
        .bind(task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.recurrence_group_id)
        .bind(task.is_template)
        .bind(rule)
        .bind(task.anchor_date)
        .bind(task.last_generated_date)
        .bind(task.due_date)
        .bind(task.is_completed)
        .bind(task.active)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.completed_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_insert_error(e, task.id))?;
        Ok(())
    }

    async fn update_task<'a>(tx: &mut Transaction<'a, Sqlite>, task: &Task) -> Result<(), CoreError> {
        let rule = encode_rule(task)?;
        let result = sqlx::query(
            r#"UPDATE tasks
            SET title = $1, description = $2, recurrence_group_id = $3, is_template = $4,
                rule = $5, anchor_date = $6, last_generated_date = $7, due_date = $8,
                is_completed = $9, active = $10, updated_at = $11, completed_at = $12
            WHERE id = $13"#,
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.recurrence_group_id)
        .bind(task.is_template)
        .bind(rule)
        .bind(task.anchor_date)
        .bind(task.last_generated_date)
        .bind(task.due_date)
        .bind(task.is_completed)
        .bind(task.active)
        .bind(task.updated_at)
        .bind(task.completed_at)
        .bind(task.id)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_insert_error(e, task.id))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Task {} not found", task.id)));
        }
        Ok(())
    }

    async fn delete_task<'a>(tx: &mut Transaction<'a, Sqlite>, id: Uuid) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Task {} not found", id)));
        }
        Ok(())
    }

    async fn delete_open_task<'a>(
        tx: &mut Transaction<'a, Sqlite>,
        id: Uuid,
    ) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND is_completed = 0")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::ConcurrentMutation(id));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Task>, CoreError> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(Task::try_from).transpose()
    }

    async fn query(&self, filter: &TaskFilter) -> Result<Vec<Task>, CoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM tasks WHERE 1 = 1");

        if let Some(group_id) = filter.group_id {
            qb.push(" AND recurrence_group_id = ");
            qb.push_bind(group_id);
        }
        if let Some(is_template) = filter.is_template {
            qb.push(" AND is_template = ");
            qb.push_bind(is_template);
        }
        if let Some(is_completed) = filter.is_completed {
            qb.push(" AND is_completed = ");
            qb.push_bind(is_completed);
        }
        match filter.has_rule {
            Some(true) => {
                qb.push(" AND rule IS NOT NULL");
            }
            Some(false) => {
                qb.push(" AND rule IS NULL");
            }
            None => {}
        }
        qb.push(" ORDER BY created_at, id");

        let rows = qb.build_query_as::<TaskRow>().fetch_all(self.pool()).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn apply(&self, batch: WriteBatch) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        for guard in batch.guards() {
            Self::check_guard(&mut tx, guard).await?;
        }

        for write in batch.writes() {
            match write {
                Write::Create(task) => Self::insert_task(&mut tx, task).await?,
                Write::Update(task) => Self::update_task(&mut tx, task).await?,
                Write::Delete(id) => Self::delete_task(&mut tx, *id).await?,
                Write::DeleteOpen(id) => Self::delete_open_task(&mut tx, *id).await?,
            }
        }

        // Dropping `tx` on any early return above rolls the batch back.
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::establish_connection;
    use crate::models::{RecurrencePattern, WeekdaySet};
    use tempfile::TempDir;

    async fn setup_store() -> (SqliteTaskStore, TempDir) {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let pool = establish_connection(&db_path.to_string_lossy())
            .await
            .expect("Failed to establish test database connection");
        (SqliteTaskStore::new(pool), temp_dir)
    }

    fn template() -> Task {
        Task {
            title: "Gym".to_string(),
            is_template: true,
            recurrence_group_id: Some(Uuid::now_v7()),
            rule: Some(RecurrenceRule::new(RecurrencePattern::SpecificWeekdays(
                WeekdaySet::workdays(),
            ))),
            anchor_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_round_trips_all_fields() {
        let (store, _dir) = setup_store().await;
        let task = store.create(template()).await.unwrap();

        let loaded = store.find_by_id(task.id).await.unwrap().unwrap();
        assert_eq!(loaded.rule, task.rule);
        assert_eq!(loaded.anchor_date, task.anchor_date);
        assert_eq!(loaded.recurrence_group_id, task.recurrence_group_id);
        assert!(loaded.is_template);
        assert!(loaded.active);
    }

    #[tokio::test]
    async fn test_query_filters() {
        let (store, _dir) = setup_store().await;
        let template = store.create(template()).await.unwrap();
        let group = template.recurrence_group_id.unwrap();
        let done = Task {
            recurrence_group_id: Some(group),
            is_completed: true,
            ..Default::default()
        };
        let open = Task {
            recurrence_group_id: Some(group),
            ..Default::default()
        };
        store
            .apply(WriteBatch::new().create(done.clone()).create(open.clone()))
            .await
            .unwrap();

        let open_found = store.query(&TaskFilter::open_instances(group)).await.unwrap();
        assert_eq!(open_found.len(), 1);
        assert_eq!(open_found[0].id, open.id);

        let completed = store.query(&TaskFilter::completed_instances(group)).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, done.id);

        let with_rule = store
            .query(&TaskFilter { has_rule: Some(true), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(with_rule.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_guard_rolls_back() {
        let (store, _dir) = setup_store().await;
        let mut template = store.create(template()).await.unwrap();
        template.last_generated_date = NaiveDate::from_ymd_opt(2024, 1, 2);
        store.update(template.clone()).await.unwrap();

        let mut stale = template.clone();
        stale.last_generated_date = None;
        let instance = Task {
            recurrence_group_id: template.recurrence_group_id,
            ..Default::default()
        };
        let result = store
            .apply(WriteBatch::new().guard_anchor(&stale).create(instance.clone()))
            .await;

        assert!(matches!(result, Err(CoreError::ConcurrentMutation(_))));
        assert!(store.find_by_id(instance.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_open_instance_is_rejected_by_schema() {
        let (store, _dir) = setup_store().await;
        let group = Some(Uuid::now_v7());
        let first = Task {
            recurrence_group_id: group,
            ..Default::default()
        };
        let second = Task {
            recurrence_group_id: group,
            ..Default::default()
        };
        store.create(first).await.unwrap();

        let result = store.create(second.clone()).await;
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
        assert!(store.find_by_id(second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_open_keeps_completed_history() {
        let (store, _dir) = setup_store().await;
        let group = Some(Uuid::now_v7());
        let done = Task {
            recurrence_group_id: group,
            is_completed: true,
            ..Default::default()
        };
        let open = Task {
            recurrence_group_id: group,
            ..Default::default()
        };
        store
            .apply(WriteBatch::new().create(done.clone()).create(open.clone()))
            .await
            .unwrap();

        let result = store
            .apply(WriteBatch::new().delete_open(open.id).delete_open(done.id))
            .await;
        assert!(matches!(result, Err(CoreError::ConcurrentMutation(id)) if id == done.id));
        assert!(store.find_by_id(open.id).await.unwrap().is_some());
        assert!(store.find_by_id(done.id).await.unwrap().is_some());

        store.apply(WriteBatch::new().delete_open(open.id)).await.unwrap();
        assert!(store.find_by_id(open.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_task_is_not_found() {
        let (store, _dir) = setup_store().await;
        let result = store.update(Task::default()).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}
