use cadence_core::models::Task;
use cadence_core::recurrence::normalize_to_local_date;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_humanize::HumanTime;
use chrono_tz::Tz;
use comfy_table::{Attribute, Cell, Color, Row, Table};

/// "today", "in 3 days", "2 weeks ago".
pub fn relative_day(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        return "today".to_string();
    }
    HumanTime::from(date.signed_duration_since(today)).to_string()
}

/// Relative day of a completion timestamp, taken in the user's timezone.
pub fn completed_day(at: DateTime<Utc>, tz: Tz, today: NaiveDate) -> String {
    relative_day(normalize_to_local_date(at, tz), today)
}

fn due_cell(due: Option<NaiveDate>, today: NaiveDate) -> Cell {
    match due {
        Some(due) => {
            let text = format!("{} ({})", due, relative_day(due, today));
            if due < today {
                Cell::new(text).fg(Color::Red) // Overdue
            } else if due == today {
                Cell::new(text).fg(Color::Yellow)
            } else {
                Cell::new(text)
            }
        }
        None => Cell::new("None"),
    }
}

pub fn display_tasks(tasks: &[Task], today: NaiveDate) {
    if tasks.is_empty() {
        println!("No tasks found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Title", "Due Date"]);

    for task in tasks {
        let mut row = Row::new();
        row.add_cell(Cell::new(task.short_id()));

        let mut title = String::new();
        if task.recurrence_group_id.is_some() {
            title.push('↻'); // Recurring symbol
            title.push(' ');
        }
        title.push_str(&task.title);
        row.add_cell(Cell::new(title));

        row.add_cell(due_cell(task.due_date, today));
        table.add_row(row);
    }

    println!("{table}");
}

/// One row per series.
pub fn display_series(templates: &[Task], today: NaiveDate) {
    if templates.is_empty() {
        println!("No recurring series found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Title", "Repeats", "Last Generated", "Status"]);

    for template in templates {
        let mut row = Row::new();
        row.add_cell(Cell::new(template.short_id()));

        let mut title_cell = Cell::new(&template.title);
        if !template.active {
            title_cell = title_cell.add_attribute(Attribute::CrossedOut).fg(Color::DarkGrey);
        }
        row.add_cell(title_cell);

        row.add_cell(Cell::new(
            template
                .rule
                .map_or_else(|| "none".to_string(), |r| r.to_string()),
        ));
        row.add_cell(due_cell(template.last_generated_date, today));
        row.add_cell(if template.active {
            Cell::new("Active").fg(Color::Green)
        } else {
            Cell::new("Ended").fg(Color::DarkGrey)
        });
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_history(done: &[Task], today: NaiveDate, tz: Tz) {
    if done.is_empty() {
        println!("No completed occurrences yet.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Title", "Was Due", "Completed"]);

    for task in done {
        let mut row = Row::new();
        row.add_cell(Cell::new(task.short_id()));
        row.add_cell(Cell::new(&task.title).fg(Color::DarkGrey));
        row.add_cell(Cell::new(
            task.due_date.map_or_else(|| "None".to_string(), |d| d.to_string()),
        ));
        row.add_cell(Cell::new(
            task.completed_at
                .map(|at| completed_day(at, tz, today))
                .unwrap_or_else(|| "Unknown".to_string()),
        ));
        table.add_row(row);
    }

    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_relative_day() {
        let today = date(2024, 1, 10);
        assert_eq!(relative_day(today, today), "today");
        assert_eq!(relative_day(date(2024, 1, 13), today), "in 3 days");
        assert_eq!(relative_day(date(2024, 1, 7), today), "3 days ago");
    }

    #[test]
    fn test_completed_day_uses_local_date() {
        // 23:30 UTC on the 10th is already the 11th in Tokyo.
        let at = Utc.with_ymd_and_hms(2024, 1, 10, 23, 30, 0).unwrap();
        let today = date(2024, 1, 11);
        assert_eq!(completed_day(at, chrono_tz::Asia::Tokyo, today), "today");
        assert_eq!(completed_day(at, Tz::UTC, today), "a day ago");
    }
}
