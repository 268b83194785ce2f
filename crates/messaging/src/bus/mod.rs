//! Message bus abstraction.
//!
//! A bus message is addressed to a topic and carries a partition key; the
//! transport keeps messages with the same key in publish order. Consumers
//! read a topic as part of a consumer group and acknowledge each delivery.
//! An unacknowledged delivery is redelivered.

mod config;
mod memory;
mod nats;

pub use config::{BusConfig, Compression, RequiredAcks};
pub use memory::InMemoryBus;
pub use nats::NatsBus;

use std::collections::BTreeMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use async_trait::async_trait;
use bytes::Bytes;
use event_store::OutboxEntry;
use futures_core::stream::BoxStream;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::BusError;

/// Header names set on every message published by this crate.
pub mod headers {
    /// Id shared by the event store row and the outbox row.
    pub const EVENT_ID: &str = "event-id";
    pub const EVENT_TYPE: &str = "event-type";
    pub const EVENT_VERSION: &str = "event-version";
    pub const AGGREGATE_TYPE: &str = "aggregate-type";
    /// Partition key, for transports without native keys.
    pub const PARTITION_KEY: &str = "partition-key";

    /// Every header name a transport must carry through.
    pub const ALL: [&str; 5] = [EVENT_ID, EVENT_TYPE, EVENT_VERSION, AGGREGATE_TYPE, PARTITION_KEY];
}

/// A message on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,

    /// Partition key: always the aggregate id for domain events.
    pub key: String,
    pub payload: Bytes,
    pub headers: BTreeMap<String, String>,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, key: impl Into<String>, payload: Bytes) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            payload,
            headers: BTreeMap::new(),
        }
    }

    /// Builds a message with a JSON payload.
    pub fn json<T: Serialize>(
        topic: impl Into<String>,
        key: impl Into<String>,
        payload: &T,
    ) -> Result<Self, BusError> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(Self::new(topic, key, Bytes::from(bytes)))
    }

    /// Builds the message for an outbox row, keyed by its aggregate id.
    pub fn from_outbox(topic: impl Into<String>, entry: &OutboxEntry) -> Result<Self, BusError> {
        Ok(Self::json(topic, entry.aggregate_id.to_string(), &entry.payload)?
            .with_header(headers::EVENT_ID, entry.id.to_string())
            .with_header(headers::EVENT_TYPE, entry.event_type.clone())
            .with_header(headers::EVENT_VERSION, entry.event_version.to_string())
            .with_header(headers::AGGREGATE_TYPE, entry.aggregate_type.clone()))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn event_id(&self) -> Option<&str> {
        self.header(headers::EVENT_ID)
    }

    pub fn event_type(&self) -> Option<&str> {
        self.header(headers::EVENT_TYPE)
    }

    /// Decodes the JSON payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// Key a consumer can deduplicate on.
    ///
    /// Messages relayed from the outbox carry the event id; messages
    /// published in process fall back to the partition key, event type,
    /// version and a digest of the payload.
    pub fn idempotency_key(&self) -> String {
        if let Some(id) = self.event_id() {
            return id.to_string();
        }

        let mut hasher = DefaultHasher::new();
        self.payload.hash(&mut hasher);
        format!(
            "{}:{}:{}:{:016x}",
            self.key,
            self.event_type().unwrap_or(&self.topic),
            self.header(headers::EVENT_VERSION).unwrap_or("1"),
            hasher.finish()
        )
    }
}

/// Publishes messages.
///
/// Implementations are shared by many tasks and must be safe to call
/// concurrently.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Writes one message. `Ok` means the bus accepted it.
    async fn publish(&self, message: BusMessage) -> Result<(), BusError>;
}

/// Settles one delivery with the transport.
#[async_trait]
pub trait Acknowledger: Send {
    async fn ack(self: Box<Self>) -> Result<(), BusError>;

    /// Asks for redelivery.
    async fn nack(self: Box<Self>) -> Result<(), BusError>;
}

/// A consumed message awaiting acknowledgement.
///
/// Dropping a delivery without acknowledging it leaves it to be
/// redelivered.
pub struct Delivery {
    message: BusMessage,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(message: BusMessage, acker: Box<dyn Acknowledger>) -> Self {
        Self { message, acker }
    }

    pub fn message(&self) -> &BusMessage {
        &self.message
    }

    pub async fn ack(self) -> Result<(), BusError> {
        self.acker.ack().await
    }

    pub async fn nack(self) -> Result<(), BusError> {
        self.acker.nack().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Stream of deliveries for one subscription.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, BusError>>;

/// Consumes topics as a member of a consumer group.
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Subscribes to a topic. Members of the same group share the topic's
    /// progress; each group sees every message.
    async fn subscribe(&self, topic: &str, group: &str) -> Result<DeliveryStream, BusError>;
}
