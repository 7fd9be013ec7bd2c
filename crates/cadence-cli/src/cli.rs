use clap::{Parser, Subcommand};

/// Cadence: recurring tasks that show up exactly once, when they are due
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Add a one-off task
    Add(AddCommand),
    /// List the backlog: tasks that are open and due
    List(ListCommand),
    /// Mark a task as completed
    Do(DoCommand),
    /// Reopen a completed task, withdrawing the occurrence its completion created
    Undo(UndoCommand),
    /// Manage recurring task series
    Recur(RecurCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    /// The title of the task
    pub title: String,
    /// The description of the task
    #[clap(short, long)]
    pub description: Option<String>,
    /// The due date of the task (YYYY-MM-DD or e.g. 'next friday')
    #[clap(long)]
    pub due: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ListCommand {
    /// Also list tasks that are not due yet
    #[clap(short, long)]
    pub all: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct DoCommand {
    /// The ID (or ID prefix) of the task to complete
    pub id: String,
}

#[derive(Parser, Debug, Clone)]
pub struct UndoCommand {
    /// The ID (or ID prefix) of the completed task to reopen
    pub id: String,
}

/// Recurring series commands
#[derive(Parser, Debug, Clone)]
pub struct RecurCommand {
    #[command(subcommand)]
    pub command: RecurSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RecurSubcommand {
    /// Create a recurring series and its first occurrence
    New(RecurNewCommand),
    /// Show every series once
    List,
    /// Show upcoming due dates of a series
    Preview(RecurPreviewCommand),
    /// Change the recurrence pattern of a series
    Edit(RecurEditCommand),
    /// Delete one occurrence or all open occurrences of a series
    Delete(RecurDeleteCommand),
    /// Show completed occurrences of a series
    History(RecurHistoryCommand),
    /// Create templates for recurring tasks stored without one
    Migrate,
    /// Merge series templates that share a title
    Dedup,
}

#[derive(Parser, Debug, Clone)]
pub struct RecurNewCommand {
    /// The title of the series
    pub title: String,
    /// Recurrence pattern
    #[clap(
        long,
        help = "daily, weekly, biweekly, workdays, weekends, weekdays:mon,wed,fri, monthly:15, monthly:last, quarterly, semiannually or yearly"
    )]
    pub every: String,
    /// Date the first occurrence is computed from (defaults to today)
    #[clap(long)]
    pub anchor: Option<String>,
    /// The description copied onto every occurrence
    #[clap(short, long)]
    pub description: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct RecurPreviewCommand {
    /// ID of the series template or one of its occurrences
    pub id: String,
    /// Number of occurrences to show
    #[clap(short, long, default_value_t = 5)]
    pub count: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct RecurEditCommand {
    /// ID of the series template or one of its occurrences
    pub id: String,
    /// New recurrence pattern
    #[clap(long)]
    pub every: String,
    /// Move the open occurrence to the new pattern as well
    #[clap(long)]
    pub propagate: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct RecurDeleteCommand {
    /// ID of the series template or one of its occurrences
    pub id: String,
    /// Delete only this occurrence instead of all open ones
    #[clap(long)]
    pub instance: Option<String>,
    /// Don't ask for confirmation
    #[clap(short, long)]
    pub force: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct RecurHistoryCommand {
    /// ID of the series template or one of its occurrences
    pub id: String,
}
