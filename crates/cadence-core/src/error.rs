use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Could not (de)serialize recurrence rule")]
    Serialization(#[from] serde_json::Error),

    /// An invalid recurrence rule. Raised where the rule is built or evaluated.
    #[error("Invalid recurrence rule: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Another writer changed the series first: it advanced the template's
    /// `last_generated_date` or completed an instance expected to be open.
    /// The whole operation was rolled back and may be retried.
    #[error("Series of task {0} was modified concurrently, retry the operation")]
    ConcurrentMutation(Uuid),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Ambiguous ID: multiple tasks match")]
    AmbiguousId(Vec<(String, String)>),
}

impl CoreError {
    /// Whether retrying the same call from scratch can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::ConcurrentMutation(_))
    }
}
