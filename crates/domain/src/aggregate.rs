//! Core aggregate and domain event traits.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::NewEvent;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
///
/// Event enums are tagged `#[serde(tag = "type", content = "data")]`; the
/// `data` part is the payload that lands in the event store, the outbox and
/// on the bus.
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Returns the event type name.
    ///
    /// This is the dispatcher key and the event store `event_type` column.
    fn event_type(&self) -> &'static str;

    /// Payload schema version.
    fn event_version(&self) -> i32 {
        1
    }

    /// Returns the type of the aggregate that emitted the event.
    fn aggregate_type(&self) -> &'static str;

    /// Returns the id of the aggregate that emitted the event.
    fn aggregate_id(&self) -> AggregateId;

    /// When the change happened.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Returns the wire payload: the variant's data record.
    fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged
            .get_mut("data")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }

    /// Rebuilds an event from its stored type tag and payload.
    fn from_payload(event_type: &str, payload: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::json!({
            "type": event_type,
            "data": payload,
        }))
    }

    /// Converts the event into its persistence form.
    fn to_new_event(&self) -> event_store::Result<NewEvent> {
        NewEvent::builder()
            .aggregate_id(self.aggregate_id())
            .aggregate_type(self.aggregate_type())
            .event_type(self.event_type())
            .event_version(self.event_version())
            .payload_raw(self.payload()?)
            .try_build()
    }
}

/// Ordered list of events staged by an aggregate during one command.
///
/// Only aggregate methods can stage events. The unit of work reads the list
/// and the command clears it after a successful commit.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBuffer<E> {
    staged: Vec<E>,
}

impl<E> EventBuffer<E> {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self { staged: Vec::new() }
    }

    pub(crate) fn record(&mut self, event: E) {
        self.staged.push(event);
    }

    /// Returns the staged events in staging order.
    pub fn events(&self) -> &[E] {
        &self.staged
    }

    /// Drops every staged event.
    pub fn clear(&mut self) {
        self.staged.clear();
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }
}

impl<E> Default for EventBuffer<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for aggregates that take part in the delivery pipeline.
///
/// Mutating methods validate their input, apply the resulting event to the
/// local state and only then stage it. A rejected mutation stages nothing.
/// The same `apply` is used to rebuild an aggregate from the event store.
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate can produce.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    fn id(&self) -> AggregateId;

    /// Returns the persisted version, 0 for an aggregate never saved.
    fn version(&self) -> i64;

    /// Sets the persisted version.
    ///
    /// Called by repositories after a successful save.
    fn set_version(&mut self, version: i64);

    /// Checks the aggregate's invariants.
    fn validate(&self) -> Result<(), Self::Error>;

    /// Applies an event to the aggregate, updating its state.
    ///
    /// This method must be pure and deterministic and must not fail:
    /// events represent facts that have happened.
    fn apply(&mut self, event: &Self::Event);

    /// Returns the events staged since the last commit.
    fn events(&self) -> &[Self::Event];

    /// Clears the staged events once they are committed.
    fn clear_events(&mut self);

    /// Rebuilds an aggregate by applying events to an empty instance.
    fn replay<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a Self::Event>,
    {
        let mut aggregate = Self::default();
        for event in events {
            aggregate.apply(event);
        }
        aggregate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct CountedData {
        counter_id: AggregateId,
        by: u32,
        at: DateTime<Utc>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "data")]
    enum TestEvent {
        Counted(CountedData),
    }

    impl DomainEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            "Counted"
        }

        fn aggregate_type(&self) -> &'static str {
            "Counter"
        }

        fn aggregate_id(&self) -> AggregateId {
            match self {
                TestEvent::Counted(data) => data.counter_id,
            }
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            match self {
                TestEvent::Counted(data) => data.at,
            }
        }
    }

    #[derive(Debug, Default)]
    struct Counter {
        id: AggregateId,
        total: u32,
        version: i64,
        events: EventBuffer<TestEvent>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("count must be positive")]
    struct ZeroCount;

    impl Counter {
        fn count(&mut self, by: u32) -> Result<(), ZeroCount> {
            if by == 0 {
                return Err(ZeroCount);
            }
            let event = TestEvent::Counted(CountedData {
                counter_id: self.id,
                by,
                at: Utc::now(),
            });
            self.apply(&event);
            self.events.record(event);
            Ok(())
        }
    }

    impl Aggregate for Counter {
        type Event = TestEvent;
        type Error = ZeroCount;

        fn aggregate_type() -> &'static str {
            "Counter"
        }

        fn id(&self) -> AggregateId {
            self.id
        }

        fn version(&self) -> i64 {
            self.version
        }

        fn set_version(&mut self, version: i64) {
            self.version = version;
        }

        fn validate(&self) -> Result<(), ZeroCount> {
            Ok(())
        }

        fn apply(&mut self, event: &TestEvent) {
            match event {
                TestEvent::Counted(data) => {
                    self.id = data.counter_id;
                    self.total += data.by;
                }
            }
        }

        fn events(&self) -> &[TestEvent] {
            self.events.events()
        }

        fn clear_events(&mut self) {
            self.events.clear();
        }
    }

    #[test]
    fn payload_is_the_data_record() {
        let id = AggregateId::new();
        let event = TestEvent::Counted(CountedData {
            counter_id: id,
            by: 3,
            at: Utc::now(),
        });

        let payload = event.payload().unwrap();
        assert_eq!(payload["by"], 3);
        assert_eq!(payload["counter_id"], id.to_string());
        assert!(payload.get("type").is_none());

        let decoded = TestEvent::from_payload("Counted", payload).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn from_payload_rejects_unknown_type() {
        let result = TestEvent::from_payload("Unknown", serde_json::json!({}));
        assert!(result.is_err());
    }

    #[test]
    fn to_new_event_carries_identity() {
        let id = AggregateId::new();
        let event = TestEvent::Counted(CountedData {
            counter_id: id,
            by: 1,
            at: Utc::now(),
        });

        let new_event = event.to_new_event().unwrap();
        assert_eq!(new_event.aggregate_id, id);
        assert_eq!(new_event.aggregate_type, "Counter");
        assert_eq!(new_event.event_type, "Counted");
        assert_eq!(new_event.event_version, 1);
    }

    #[test]
    fn rejected_mutation_stages_nothing() {
        let mut counter = Counter::default();
        assert!(counter.count(0).is_err());
        assert!(counter.events().is_empty());
        assert_eq!(counter.total, 0);
    }

    #[test]
    fn mutations_stage_in_order_and_replay_matches() {
        let mut counter = Counter::default();
        counter.count(2).unwrap();
        counter.count(5).unwrap();
        assert_eq!(counter.events().len(), 2);

        let replayed = Counter::replay(counter.events());
        assert_eq!(replayed.total, counter.total);
        assert_eq!(replayed.id, counter.id);

        counter.clear_events();
        assert!(counter.events().is_empty());
        assert_eq!(counter.total, 7);
    }
}
