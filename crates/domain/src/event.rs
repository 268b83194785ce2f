//! Umbrella event over every aggregate's event type.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::StoredEvent;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::chat::MessageEvent;
use crate::order::OrderEvent;
use crate::product::ProductEvent;
use crate::user::UserEvent;

/// Any committed domain event.
///
/// Serializes exactly like the wrapped event, so stored payloads decode into
/// the right variant by their type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Event {
    User(UserEvent),
    Message(MessageEvent),
    Product(ProductEvent),
    Order(OrderEvent),
}

impl Event {
    /// Decodes an event store row.
    pub fn from_stored(stored: &StoredEvent) -> Result<Self, serde_json::Error> {
        Self::from_payload(&stored.event_type, stored.payload.clone())
    }
}

impl DomainEvent for Event {
    fn event_type(&self) -> &'static str {
        match self {
            Event::User(e) => e.event_type(),
            Event::Message(e) => e.event_type(),
            Event::Product(e) => e.event_type(),
            Event::Order(e) => e.event_type(),
        }
    }

    fn event_version(&self) -> i32 {
        match self {
            Event::User(e) => e.event_version(),
            Event::Message(e) => e.event_version(),
            Event::Product(e) => e.event_version(),
            Event::Order(e) => e.event_version(),
        }
    }

    fn aggregate_type(&self) -> &'static str {
        match self {
            Event::User(e) => e.aggregate_type(),
            Event::Message(e) => e.aggregate_type(),
            Event::Product(e) => e.aggregate_type(),
            Event::Order(e) => e.aggregate_type(),
        }
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            Event::User(e) => e.aggregate_id(),
            Event::Message(e) => e.aggregate_id(),
            Event::Product(e) => e.aggregate_id(),
            Event::Order(e) => e.aggregate_id(),
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Event::User(e) => e.occurred_at(),
            Event::Message(e) => e.occurred_at(),
            Event::Product(e) => e.occurred_at(),
            Event::Order(e) => e.occurred_at(),
        }
    }
}

impl From<UserEvent> for Event {
    fn from(event: UserEvent) -> Self {
        Event::User(event)
    }
}

impl From<MessageEvent> for Event {
    fn from(event: MessageEvent) -> Self {
        Event::Message(event)
    }
}

impl From<ProductEvent> for Event {
    fn from(event: ProductEvent) -> Self {
        Event::Product(event)
    }
}

impl From<OrderEvent> for Event {
    fn from(event: OrderEvent) -> Self {
        Event::Order(event)
    }
}
