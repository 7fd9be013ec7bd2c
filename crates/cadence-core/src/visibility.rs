//! Which tasks a listing view may show.
//!
//! Normal lists (backlog, matrix, focus assignment) go through
//! [`VisibilityFilter::is_visible_in_backlog`]; the recurring-series view is
//! the only consumer of [`VisibilityFilter::is_template_view`].

use chrono::NaiveDate;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::Task;

#[derive(Debug, Default, Clone, Copy)]
pub struct VisibilityFilter;

impl VisibilityFilter {
    /// Templates, completed tasks and tasks due after `today` are hidden.
    #[inline]
    pub fn is_visible_in_backlog(task: &Task, today: NaiveDate) -> bool {
        !task.is_template && !task.is_completed && task.due_date.map_or(true, |due| due <= today)
    }

    #[inline]
    pub fn is_template_view(task: &Task) -> bool {
        task.is_template
    }

    /// Backlog entries out of an arbitrary task list, due date ascending
    /// with undated tasks last.
    pub fn backlog<'a, I>(tasks: I, today: NaiveDate) -> Vec<Task>
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let mut visible: Vec<Task> = tasks
            .into_iter()
            .filter(|t| Self::is_visible_in_backlog(t, today))
            .cloned()
            .collect();
        visible.sort_by(|a, b| match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y).then(a.created_at.cmp(&b.created_at)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.created_at.cmp(&b.created_at),
        });
        visible
    }

    /// One template per series, keyed by [`Task::series_key`]. When a series
    /// holds several templates the newest one represents it.
    pub fn series_view<'a, I>(tasks: I) -> Vec<Task>
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let mut by_group: HashMap<Uuid, &Task> = HashMap::new();
        for task in tasks.into_iter().filter(|t| Self::is_template_view(t)) {
            by_group
                .entry(task.series_key())
                .and_modify(|current| {
                    if task.created_at > current.created_at {
                        *current = task;
                    }
                })
                .or_insert(task);
        }
        let mut templates: Vec<Task> = by_group.into_values().cloned().collect();
        templates.sort_by(|a, b| a.title.cmp(&b.title).then(a.created_at.cmp(&b.created_at)));
        templates
    }
}
