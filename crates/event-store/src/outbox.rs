//! Outbox rows and their delivery state machine.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AggregateId, EventId, EventStoreError};

/// Delivery status of an outbox row.
///
/// State transitions:
/// ```text
/// Pending ──► Published
///    │  ▲
///    ▼  │
///   Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    /// Waiting for the relay.
    #[default]
    Pending,

    /// Accepted by the bus (terminal).
    Published,

    /// Last publish attempt failed.
    Failed,
}

impl OutboxStatus {
    /// Returns the status as stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Published => "published",
            OutboxStatus::Failed => "failed",
        }
    }

    /// Returns true if the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: OutboxStatus) -> bool {
        matches!(
            (self, next),
            (OutboxStatus::Pending, OutboxStatus::Published)
                | (OutboxStatus::Pending, OutboxStatus::Failed)
                | (OutboxStatus::Failed, OutboxStatus::Pending)
        )
    }

    /// Returns true if the pipeline never touches the row again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutboxStatus::Published)
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = EventStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OutboxStatus::Pending),
            "published" => Ok(OutboxStatus::Published),
            "failed" => Ok(OutboxStatus::Failed),
            other => Err(EventStoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// A row of the outbox table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Same id as the matching event store row.
    pub id: EventId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub event_type: String,
    pub event_version: i32,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl OutboxEntry {
    /// Returns true once the row has used up `max_retries` publish attempts.
    pub fn retries_exhausted(&self, max_retries: u32) -> bool {
        self.retry_count >= 0 && self.retry_count as u32 >= max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_transitions() {
        assert!(OutboxStatus::Pending.can_transition_to(OutboxStatus::Published));
        assert!(OutboxStatus::Pending.can_transition_to(OutboxStatus::Failed));
        assert!(OutboxStatus::Failed.can_transition_to(OutboxStatus::Pending));
    }

    #[test]
    fn published_is_terminal() {
        assert!(OutboxStatus::Published.is_terminal());
        assert!(!OutboxStatus::Published.can_transition_to(OutboxStatus::Pending));
        assert!(!OutboxStatus::Published.can_transition_to(OutboxStatus::Failed));
        assert!(!OutboxStatus::Failed.can_transition_to(OutboxStatus::Published));
    }

    #[test]
    fn status_parses_column_values() {
        for status in [
            OutboxStatus::Pending,
            OutboxStatus::Published,
            OutboxStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<OutboxStatus>().unwrap(), status);
        }
        assert!("in_flight".parse::<OutboxStatus>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&OutboxStatus::Published).unwrap();
        assert_eq!(json, "\"published\"");
    }
}
