use anyhow::{anyhow, Result};
use cadence_core::engine::{
    InstanceManager, RecurrenceEngine, SeriesMaintenance, SeriesMutations,
};
use cadence_core::error::CoreError;
use cadence_core::models::{DeleteScope, NewTemplateData};
use cadence_core::store::TaskStore;
use dialoguer::Confirm;
use owo_colors::OwoColorize;

use crate::cli::{
    RecurCommand, RecurDeleteCommand, RecurEditCommand, RecurHistoryCommand, RecurNewCommand,
    RecurPreviewCommand, RecurSubcommand,
};
use crate::config::Config;
use crate::parser::{parse_date, parse_rule};
use crate::util::{resolve_task, resolve_template, with_retries};
use crate::views::table::{display_history, display_series, relative_day};

pub async fn recur_command<S: TaskStore>(
    engine: &RecurrenceEngine<S>,
    command: RecurCommand,
    config: &Config,
) -> Result<()> {
    match command.command {
        RecurSubcommand::New(cmd) => new_command(engine, cmd, config).await,
        RecurSubcommand::List => {
            display_series(&engine.recurring_series().await?, engine.today());
            Ok(())
        }
        RecurSubcommand::Preview(cmd) => preview_command(engine, cmd).await,
        RecurSubcommand::Edit(cmd) => edit_command(engine, cmd, config).await,
        RecurSubcommand::Delete(cmd) => delete_command(engine, cmd).await,
        RecurSubcommand::History(cmd) => history_command(engine, cmd, config).await,
        RecurSubcommand::Migrate => {
            let created = engine.migrate_to_template_model().await?;
            println!("Created {} template(s) for existing recurring tasks.", created);
            Ok(())
        }
        RecurSubcommand::Dedup => {
            let deleted = engine.deduplicate_templates().await?;
            println!("Removed {} duplicate template(s).", deleted);
            Ok(())
        }
    }
}

async fn new_command<S: TaskStore>(
    engine: &RecurrenceEngine<S>,
    command: RecurNewCommand,
    config: &Config,
) -> Result<()> {
    let rule = parse_rule(&command.every)?;
    let anchor_date = command
        .anchor
        .as_deref()
        .map(|d| config.local_now().and_then(|now| parse_date(d, now)))
        .transpose()?;

    let template = engine
        .create_template(NewTemplateData {
            title: command.title,
            description: command.description,
            rule,
            anchor_date,
        })
        .await?;
    let first = with_retries(config.max_retries, || engine.ensure_open_instance(template.id)).await?;

    println!(
        "{} Created recurring task '{}' ({}) repeating {}",
        "✓".green().bold(),
        template.title.cyan(),
        template.short_id().yellow(),
        rule.to_string().blue()
    );
    if let Some(due) = first.and_then(|t| t.due_date) {
        println!("  First due: {} ({})", due, relative_day(due, engine.today()));
    }
    Ok(())
}

async fn preview_command<S: TaskStore>(
    engine: &RecurrenceEngine<S>,
    command: RecurPreviewCommand,
) -> Result<()> {
    let template = resolve_template(engine, &command.id).await?;
    let dates = engine.preview(template.id, command.count).await?;

    println!(
        "{} (next {} occurrences)",
        "Series Preview".blue().bold(),
        dates.len()
    );
    println!("Task: {}", template.title.cyan());
    if !template.active {
        println!("{}", "This series has ended and will not generate these.".dimmed());
    }
    println!();
    for (i, date) in dates.iter().enumerate() {
        println!(
            "  {}. {} {}",
            i + 1,
            date.format("%a %Y-%m-%d"),
            format!("({})", relative_day(*date, engine.today())).dimmed()
        );
    }
    Ok(())
}

async fn edit_command<S: TaskStore>(
    engine: &RecurrenceEngine<S>,
    command: RecurEditCommand,
    config: &Config,
) -> Result<()> {
    let template = resolve_template(engine, &command.id).await?;
    let rule = parse_rule(&command.every)?;

    let updated = with_retries(config.max_retries, || {
        engine.edit_template(template.id, rule, command.propagate)
    })
    .await?;

    println!(
        "{} '{}' now repeats {}",
        "Success:".green().bold(),
        updated.title.cyan(),
        rule.to_string().blue()
    );
    if command.propagate {
        if let Some(due) = updated.last_generated_date {
            println!("  Open occurrence rescheduled; series continues after {}", due);
        }
    } else {
        println!("  The open occurrence keeps its due date.");
    }
    Ok(())
}

async fn delete_command<S: TaskStore>(
    engine: &RecurrenceEngine<S>,
    command: RecurDeleteCommand,
) -> Result<()> {
    let template = resolve_template(engine, &command.id).await?;
    let group_id = template.recurrence_group_id.ok_or_else(|| {
        anyhow!(CoreError::InvalidInput(format!(
            "'{}' has no series to delete from",
            template.title
        )))
    })?;

    let (scope, prompt) = match &command.instance {
        Some(instance) => {
            let instance = resolve_task(engine, instance).await?;
            (
                DeleteScope::OnlyThisInstance(instance.id),
                format!(
                    "Delete the occurrence of '{}' due {}?",
                    instance.title,
                    instance
                        .due_date
                        .map_or_else(|| "someday".to_string(), |d| d.to_string())
                ),
            )
        }
        None => (
            DeleteScope::AllOpenInstances,
            format!(
                "Delete all open occurrences of '{}'? Completed ones are kept.",
                template.title
            ),
        ),
    };

    if !command.force {
        let confirmation = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirmation {
            println!("Deletion cancelled.");
            return Ok(());
        }
    }

    let summary = engine.delete_series(group_id, scope).await?;
    println!(
        "{} Deleted {} occurrence(s) of '{}'",
        "Success:".green().bold(),
        summary.removed,
        template.title
    );
    if summary.template_deactivated {
        println!("  The series has ended and will not generate new occurrences.");
    }
    Ok(())
}

async fn history_command<S: TaskStore>(
    engine: &RecurrenceEngine<S>,
    command: RecurHistoryCommand,
    config: &Config,
) -> Result<()> {
    let template = resolve_template(engine, &command.id).await?;
    let Some(group_id) = template.recurrence_group_id else {
        println!("No completed occurrences yet.");
        return Ok(());
    };
    println!("History of {}", template.title.cyan());
    let tz = config.tz().map_err(anyhow::Error::msg)?;
    display_history(&engine.series_history(group_id).await?, engine.today(), tz);
    Ok(())
}
