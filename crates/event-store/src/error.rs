use thiserror::Error;

use crate::EventId;

/// Errors that can occur when interacting with the event store or the outbox.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// An event failed validation before it was written.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// The outbox row does not exist.
    #[error("Outbox entry not found: {0}")]
    OutboxEntryNotFound(EventId),

    /// A stored status string could not be parsed.
    #[error("Unknown outbox status: {0}")]
    UnknownStatus(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
