use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::info;
use uuid::Uuid;

use super::{RecurrenceEngine, SeriesMaintenance};
use crate::error::CoreError;
use crate::models::{Task, TaskFilter};
use crate::store::{TaskStore, WriteBatch};

/// Writes computed from a snapshot of the store, plus the series they touch.
#[derive(Debug, Default)]
struct MaintenancePlan {
    batch: WriteBatch,
    /// Templates created or deleted.
    affected: usize,
    groups: BTreeSet<Uuid>,
}

fn is_legacy_recurring(task: &Task) -> bool {
    !task.is_template && task.rule.map_or(false, |r| r.is_recurring())
}

/// Earliest due date first, undated last.
fn by_due_date(a: &Task, b: &Task) -> Ordering {
    match (a.due_date, b.due_date) {
        (Some(x), Some(y)) => x.cmp(&y).then(a.created_at.cmp(&b.created_at)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.created_at.cmp(&b.created_at),
    }
}

/// One template for every legacy series that has none. Tasks without a
/// group id each become their own series.
fn plan_migration(tasks: &[Task], today: NaiveDate) -> MaintenancePlan {
    let templated: HashSet<Uuid> = tasks
        .iter()
        .filter(|t| t.is_template)
        .filter_map(|t| t.recurrence_group_id)
        .collect();

    let mut plan = MaintenancePlan::default();
    let mut series: BTreeMap<Uuid, Vec<Task>> = BTreeMap::new();

    for task in tasks.iter().filter(|t| is_legacy_recurring(t)) {
        match task.recurrence_group_id {
            Some(group_id) if templated.contains(&group_id) => {}
            Some(group_id) => {
                plan.groups.insert(group_id);
                series.entry(group_id).or_default().push(task.clone());
            }
            None => {
                let group_id = Uuid::now_v7();
                let grouped = Task {
                    recurrence_group_id: Some(group_id),
                    updated_at: Utc::now(),
                    ..task.clone()
                };
                plan.batch = std::mem::take(&mut plan.batch).update(grouped.clone());
                series.entry(group_id).or_default().push(grouped);
            }
        }
    }

    for (group_id, members) in series {
        let Some(newest) = members.iter().max_by_key(|t| t.created_at) else {
            continue;
        };
        let latest_due = members.iter().filter_map(|t| t.due_date).max();
        let template = Task {
            title: newest.title.clone(),
            description: newest.description.clone(),
            recurrence_group_id: Some(group_id),
            is_template: true,
            rule: newest.rule,
            anchor_date: Some(latest_due.unwrap_or(today)),
            last_generated_date: latest_due,
            ..Default::default()
        };
        plan.batch = std::mem::take(&mut plan.batch).create(template);
        plan.affected += 1;
    }

    plan
}

/// Merges templates sharing a title into the newest one. Children of the
/// duplicates move to the survivor's series; surplus open instances are
/// dropped so only the earliest-due one stays open.
fn plan_deduplication(tasks: &[Task]) -> MaintenancePlan {
    let mut by_title: BTreeMap<&str, Vec<&Task>> = BTreeMap::new();
    for template in tasks.iter().filter(|t| t.is_template) {
        by_title.entry(template.title.as_str()).or_default().push(template);
    }

    let mut plan = MaintenancePlan::default();
    let mut deletes: Vec<Uuid> = Vec::new();
    let mut updates: Vec<Task> = Vec::new();

    for (_, mut templates) in by_title.into_iter().filter(|(_, t)| t.len() > 1) {
        templates.sort_by_key(|t| (t.created_at, t.id));
        let Some(survivor) = templates.pop() else {
            continue;
        };
        let survivor_group = survivor.series_key();
        plan.groups.insert(survivor_group);

        let mut moved: Vec<Task> = Vec::new();
        let mut merged_groups: HashSet<Uuid> = HashSet::new();
        for duplicate in &templates {
            deletes.push(duplicate.id);
            plan.affected += 1;

            let Some(group_id) = duplicate.recurrence_group_id else {
                continue;
            };
            plan.groups.insert(group_id);
            if group_id == survivor_group || !merged_groups.insert(group_id) {
                continue;
            }
            let now = Utc::now();
            moved.extend(
                tasks
                    .iter()
                    .filter(|t| !t.is_template && t.recurrence_group_id == Some(group_id))
                    .map(|t| Task {
                        recurrence_group_id: Some(survivor_group),
                        updated_at: now,
                        ..t.clone()
                    }),
            );
        }

        let mut open: Vec<Task> = tasks
            .iter()
            .filter(|t| t.is_open_instance() && t.recurrence_group_id == Some(survivor_group))
            .cloned()
            .chain(moved.iter().filter(|t| t.is_open_instance()).cloned())
            .collect();
        open.sort_by(by_due_date);
        let kept = open.first().cloned();
        let surplus: HashSet<Uuid> = open.iter().skip(1).map(|t| t.id).collect();

        deletes.extend(surplus.iter().copied());
        updates.extend(moved.into_iter().filter(|t| !surplus.contains(&t.id)));

        let mut merged = survivor.clone();
        merged.recurrence_group_id = Some(survivor_group);
        merged.last_generated_date = merged
            .last_generated_date
            .max(kept.and_then(|t| t.due_date));
        if merged != *survivor {
            merged.updated_at = Utc::now();
            plan.batch = std::mem::take(&mut plan.batch).guard_anchor(survivor);
            updates.push(merged);
        }
    }

    // Deletes go first so a moved open instance never meets another open
    // instance in the survivor's series.
    for id in deletes {
        plan.batch = std::mem::take(&mut plan.batch).delete(id);
    }
    for task in updates {
        plan.batch = std::mem::take(&mut plan.batch).update(task);
    }
    plan
}

#[async_trait]
impl<S: TaskStore> SeriesMaintenance for RecurrenceEngine<S> {
    /// Creates a template for every legacy recurring series without one.
    /// The new template has no due date; its anchor is the latest due date
    /// in the series. Running it again creates nothing.
    async fn migrate_to_template_model(&self) -> Result<usize, CoreError> {
        let snapshot = self.store.query(&TaskFilter::all()).await?;
        let groups = plan_migration(&snapshot, self.today()).groups;
        let _guards = self.locks().lock_many(groups).await;

        let tasks = self.store.query(&TaskFilter::all()).await?;
        let plan = plan_migration(&tasks, self.today());
        if plan.batch.is_empty() {
            return Ok(0);
        }
        self.store.apply(plan.batch).await?;
        info!(created = plan.affected, "migrated legacy recurring tasks to templates");
        Ok(plan.affected)
    }

    /// Merges templates with the same title, keeping the newest.
    ///
    /// # Returns
    /// The number of deleted duplicate templates.
    async fn deduplicate_templates(&self) -> Result<usize, CoreError> {
        let snapshot = self.store.query(&TaskFilter::all()).await?;
        let groups = plan_deduplication(&snapshot).groups;
        if groups.is_empty() {
            return Ok(0);
        }
        let _guards = self.locks().lock_many(groups).await;

        let tasks = self.store.query(&TaskFilter::all()).await?;
        let plan = plan_deduplication(&tasks);
        if plan.batch.is_empty() {
            return Ok(0);
        }
        self.store.apply(plan.batch).await?;
        info!(deleted = plan.affected, "deduplicated templates");
        Ok(plan.affected)
    }
}
