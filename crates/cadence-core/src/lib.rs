//! # Cadence Core Library
//!
//! A recurring task template engine: one recurrence definition (a template)
//! turns into a stream of concrete, correctly dated task instances, with at
//! most one open instance per series at any time.
//!
//! ## Features
//!
//! - **Calendar-exact recurrence**: daily, weekly, biweekly, weekday sets,
//!   monthly by day (with month-length clamping), quarterly, semiannual and
//!   yearly patterns evaluated on plain dates
//! - **Single open instance**: generation and completion are serialized per
//!   series and committed as one atomic write batch
//! - **Safe series mutations**: delete one occurrence or the whole open
//!   series without touching completed history
//! - **Pluggable storage**: an in-memory store and a SQLite store via sqlx
//!
//! ## Core Modules
//!
//! - [`models`]: Tasks, recurrence rules and query predicates
//! - [`recurrence`]: The pure next-occurrence evaluator
//! - [`engine`]: Template lifecycle, series mutations and maintenance
//! - [`visibility`]: Which tasks a listing may show
//! - [`store`]: The task store trait and its implementations
//! - [`clock`]: Injectable source of "today"
//! - [`db`]: SQLite connection and migration management
//! - [`error`]: Error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cadence_core::{
//!     clock::SystemClock,
//!     db,
//!     engine::{InstanceManager, RecurrenceEngine},
//!     models::{EngineConfig, NewTemplateData},
//!     store::SqliteTaskStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = db::establish_connection("tasks.db").await?;
//!     let engine = RecurrenceEngine::new(
//!         SqliteTaskStore::new(pool),
//!         Arc::new(SystemClock::from_name("Europe/Berlin")?),
//!         EngineConfig::default(),
//!     );
//!
//!     let template = engine
//!         .create_template(NewTemplateData {
//!             title: "Water plants".to_string(),
//!             description: None,
//!             rule: "weekdays:mon,thu".parse()?,
//!             anchor_date: None,
//!         })
//!         .await?;
//!
//!     if let Some(instance) = engine.ensure_open_instance(template.id).await? {
//!         println!("Next due: {:?}", instance.due_date);
//!     }
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod recurrence;
pub mod store;
pub mod visibility;
