use cadence_core::clock::SystemClock;
use cadence_core::db;
use cadence_core::engine::RecurrenceEngine;
use cadence_core::error::CoreError;
use cadence_core::store::SqliteTaskStore;
use clap::Parser;
use owo_colors::{OwoColorize, Style};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod parser;
mod util;
mod views;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = cli::Cli::parse();

    let config = match config::Config::new() {
        Ok(config) => config,
        Err(e) => {
            handle_error(anyhow::anyhow!("Invalid configuration: {}", e));
            std::process::exit(1);
        }
    };
    let clock = match SystemClock::from_name(&config.timezone) {
        Ok(clock) => clock,
        Err(e) => {
            handle_error(e.into());
            std::process::exit(1);
        }
    };
    let db_pool = match db::establish_connection(&config.database_path).await {
        Ok(pool) => pool,
        Err(e) => {
            handle_error(e.into());
            std::process::exit(1);
        }
    };
    let engine = RecurrenceEngine::new(
        SqliteTaskStore::new(db_pool),
        Arc::new(clock),
        config.engine_config(),
    );

    let result = match cli.command {
        cli::Commands::Add(command) => commands::add::add_task(&engine, command, &config).await,
        cli::Commands::List(command) => {
            commands::list::list_tasks(&engine, command, &config).await
        }
        cli::Commands::Do(command) => commands::r#do::do_task(&engine, command, &config).await,
        cli::Commands::Undo(command) => {
            commands::undo::undo_task(&engine, command, &config).await
        }
        cli::Commands::Recur(command) => {
            commands::recur::recur_command(&engine, command, &config).await
        }
    };

    if let Err(e) = result {
        handle_error(e);
        std::process::exit(1);
    }
}

fn handle_error(err: anyhow::Error) {
    let error_style = Style::new().red().bold();

    if let Some(core_error) = err.downcast_ref::<CoreError>() {
        match core_error {
            CoreError::NotFound(s) => {
                eprintln!("{} {}", "Error:".style(error_style), s);
            }
            CoreError::AmbiguousId(tasks) => {
                eprintln!("{}", "Error: Ambiguous ID.".style(error_style));
                eprintln!("Did you mean one of these?");
                for (id, title) in tasks {
                    eprintln!("  {} ({})", id.yellow(), title);
                }
            }
            CoreError::InvalidInput(s) => {
                eprintln!("{} Invalid input: {}", "Error:".style(error_style), s);
            }
            CoreError::Configuration(s) => {
                eprintln!(
                    "{} Invalid recurrence pattern: {}",
                    "Error:".style(error_style),
                    s.yellow()
                );
            }
            CoreError::ConcurrentMutation(_) => {
                eprintln!(
                    "{} The series was changed by another writer. Please try again.",
                    "Error:".style(error_style)
                );
            }
            _ => eprintln!("{} {:#}", "Error:".style(error_style), err),
        }
    } else {
        eprintln!("{} {:#}", "Error:".style(error_style), err);
    }
}
