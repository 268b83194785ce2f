use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AggregateId, EventStoreError, Result};

/// Unique identifier for an event.
///
/// The same id is used for the event's row in the event store and in the
/// outbox, and travels to the bus as the message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EventId> for Uuid {
    fn from(id: EventId) -> Self {
        id.0
    }
}

/// An event staged for persistence, before the database assigns `occurred_at`.
///
/// Build one through [`NewEvent::builder`]; the builder rejects events that
/// would violate the log's invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Identifier shared by the event store row and the outbox row.
    pub event_id: EventId,

    /// The aggregate this event belongs to.
    pub aggregate_id: AggregateId,

    /// The type of aggregate (e.g., "User", "Order").
    pub aggregate_type: String,

    /// The type of the event (e.g., "UserCreated").
    pub event_type: String,

    /// Payload schema version, starting at 1.
    pub event_version: i32,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// Optional metadata recorded alongside the event in the event store.
    pub metadata: Option<serde_json::Value>,
}

impl NewEvent {
    /// Creates a new event builder.
    pub fn builder() -> NewEventBuilder {
        NewEventBuilder::default()
    }

    /// Returns a copy of this event carrying the given metadata, unless it
    /// already has its own.
    pub fn with_default_metadata(mut self, metadata: Option<&serde_json::Value>) -> Self {
        if self.metadata.is_none() {
            self.metadata = metadata.cloned();
        }
        self
    }
}

/// Builder for [`NewEvent`].
#[derive(Debug, Default)]
pub struct NewEventBuilder {
    event_id: Option<EventId>,
    aggregate_id: Option<AggregateId>,
    aggregate_type: Option<String>,
    event_type: Option<String>,
    event_version: Option<i32>,
    payload: Option<serde_json::Value>,
    metadata: Option<serde_json::Value>,
}

impl NewEventBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Sets the aggregate ID.
    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    /// Sets the aggregate type.
    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the payload schema version. Defaults to 1.
    pub fn event_version(mut self, version: i32) -> Self {
        self.event_version = Some(version);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the metadata blob.
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Builds the event, validating the required fields.
    pub fn try_build(self) -> Result<NewEvent> {
        let aggregate_id = self
            .aggregate_id
            .ok_or_else(|| EventStoreError::InvalidEvent("aggregate_id is required".into()))?;

        let aggregate_type = self.aggregate_type.unwrap_or_default();
        if aggregate_type.trim().is_empty() {
            return Err(EventStoreError::InvalidEvent(
                "aggregate_type must not be empty".into(),
            ));
        }

        let event_type = self.event_type.unwrap_or_default();
        if event_type.trim().is_empty() {
            return Err(EventStoreError::InvalidEvent(
                "event_type must not be empty".into(),
            ));
        }

        let event_version = self.event_version.unwrap_or(1);
        if event_version < 1 {
            return Err(EventStoreError::InvalidEvent(format!(
                "event_version must be at least 1, got {event_version}"
            )));
        }

        let payload = self
            .payload
            .ok_or_else(|| EventStoreError::InvalidEvent("payload is required".into()))?;

        Ok(NewEvent {
            event_id: self.event_id.unwrap_or_default(),
            aggregate_id,
            aggregate_type,
            event_type,
            event_version,
            payload,
            metadata: self.metadata,
        })
    }
}

/// A row of the event store.
///
/// Rows are created on append and never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: EventId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub event_type: String,
    pub event_version: i32,
    pub payload: serde_json::Value,
    pub metadata: Option<serde_json::Value>,

    /// Server time of the append.
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> NewEventBuilder {
        NewEvent::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type("User")
            .event_type("UserCreated")
            .payload_raw(serde_json::json!({"name": "Ann"}))
    }

    #[test]
    fn event_id_new_creates_unique_ids() {
        let id1 = EventId::new();
        let id2 = EventId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn builder_defaults_version_and_id() {
        let event = builder().try_build().unwrap();

        assert_eq!(event.event_version, 1);
        assert_eq!(event.event_type, "UserCreated");
        assert_eq!(event.aggregate_type, "User");
        assert!(event.metadata.is_none());
    }

    #[test]
    fn builder_rejects_empty_event_type() {
        let result = builder().event_type("  ").try_build();
        assert!(matches!(result, Err(EventStoreError::InvalidEvent(_))));
    }

    #[test]
    fn builder_rejects_zero_version() {
        let result = builder().event_version(0).try_build();
        assert!(matches!(result, Err(EventStoreError::InvalidEvent(_))));
    }

    #[test]
    fn builder_requires_aggregate_and_payload() {
        assert!(NewEvent::builder().event_type("X").try_build().is_err());
        assert!(
            NewEvent::builder()
                .aggregate_id(AggregateId::new())
                .aggregate_type("User")
                .event_type("X")
                .try_build()
                .is_err()
        );
    }

    #[test]
    fn default_metadata_does_not_override_own() {
        let own = serde_json::json!({"source": "event"});
        let ctx = serde_json::json!({"source": "context"});

        let event = builder().metadata(own.clone()).try_build().unwrap();
        assert_eq!(event.with_default_metadata(Some(&ctx)).metadata, Some(own));

        let event = builder().try_build().unwrap();
        assert_eq!(event.with_default_metadata(Some(&ctx)).metadata, Some(ctx));
    }
}
