//! Chat domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Events that can occur on a message aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MessageEvent {
    /// A message was sent.
    MessageCreated(MessageCreatedData),

    /// The receiver read the message.
    MessageRead(MessageReadData),
}

impl DomainEvent for MessageEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MessageEvent::MessageCreated(_) => "MessageCreated",
            MessageEvent::MessageRead(_) => "MessageRead",
        }
    }

    fn aggregate_type(&self) -> &'static str {
        "Message"
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            MessageEvent::MessageCreated(data) => data.message_id,
            MessageEvent::MessageRead(data) => data.message_id,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MessageEvent::MessageCreated(data) => data.created_at,
            MessageEvent::MessageRead(data) => data.read_at,
        }
    }
}

/// Data for MessageCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageCreatedData {
    pub message_id: AggregateId,
    pub sender_id: AggregateId,
    pub receiver_id: AggregateId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Data for MessageRead event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReadData {
    pub message_id: AggregateId,
    pub reader_id: AggregateId,
    pub read_at: DateTime<Utc>,
}
