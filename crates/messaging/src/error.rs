//! Messaging error types.

use std::time::Duration;

use domain::BoxError;
use thiserror::Error;

/// Errors raised by a bus transport.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus could not be reached.
    #[error("Bus unavailable: {0}")]
    Unavailable(String),

    /// The operation did not complete in time. The message may or may not
    /// have been written.
    #[error("Bus operation timed out after {0:?}")]
    Timeout(Duration),

    /// The bus refused the message.
    #[error("Message rejected: {0}")]
    Rejected(String),

    /// The message could not be encoded.
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// A transport setting could not be parsed.
    #[error("Invalid bus setting {setting}: {value}")]
    InvalidSetting { setting: &'static str, value: String },
}

impl BusError {
    /// Returns true when a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BusError::Unavailable(_) | BusError::Timeout(_))
    }
}

/// Errors that stop a relay tick.
///
/// Publish failures are not errors here; they are recorded on the outbox row.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Outbox error: {0}")]
    Outbox(#[from] event_store::EventStoreError),
}

/// Errors raised by the subscriber runtime.
#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("Subscription to {topic} failed: {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: BusError,
    },

    #[error("Handler {handler} failed: {source}")]
    Handler {
        handler: &'static str,
        #[source]
        source: BoxError,
    },
}
