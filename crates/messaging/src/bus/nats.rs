//! NATS JetStream transport.
//!
//! Every topic is a subject of one stream. The partition key travels as a
//! header; JetStream keeps per-subject publish order, which preserves
//! per-key order for a single publisher. Consumer groups map to durable
//! pull consumers named after the group and topic.

use std::time::Duration;

use async_nats::HeaderMap;
use async_nats::jetstream::{self, AckKind, consumer::AckPolicy, consumer::pull};
use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use super::{
    Acknowledger, BusConfig, BusMessage, Delivery, DeliveryStream, MessageBus, MessageConsumer,
    RequiredAcks, headers,
};
use crate::error::BusError;
use crate::topics::TopicRegistry;

/// Header JetStream deduplicates publishes on.
const MSG_ID_HEADER: &str = "Nats-Msg-Id";

pub struct NatsBus {
    context: jetstream::Context,
    config: BusConfig,
}

impl NatsBus {
    /// Connects and makes sure the stream covers every registered topic.
    pub async fn connect(config: BusConfig, topics: &TopicRegistry) -> Result<Self, BusError> {
        let client = async_nats::ConnectOptions::new()
            .connection_timeout(config.write_timeout)
            .request_timeout(Some(config.write_timeout))
            .connect(config.brokers.join(","))
            .await
            .map_err(|e| BusError::Unavailable(format!("connect: {e}")))?;

        let context = jetstream::new(client);
        let stream_config = jetstream::stream::Config {
            name: config.stream.clone(),
            subjects: topics.topics().into_iter().map(str::to_string).collect(),
            compression: config
                .compression
                .is_enabled()
                .then_some(jetstream::stream::Compression::S2),
            ..Default::default()
        };
        context
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| BusError::Unavailable(format!("stream {}: {e}", config.stream)))?;

        info!(
            brokers = ?config.brokers,
            stream = %config.stream,
            "Connected to NATS JetStream"
        );
        Ok(Self { context, config })
    }

    async fn publish_once(&self, message: &BusMessage) -> Result<(), BusError> {
        let mut nats_headers = HeaderMap::new();
        for (name, value) in &message.headers {
            nats_headers.insert(name.as_str(), value.as_str());
        }
        nats_headers.insert(headers::PARTITION_KEY, message.key.as_str());
        if let Some(id) = message.event_id() {
            nats_headers.insert(MSG_ID_HEADER, id);
        }

        let ack = self
            .context
            .publish_with_headers(message.topic.clone(), nats_headers, message.payload.clone())
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))?;

        if self.config.required_acks != RequiredAcks::None {
            ack.await.map_err(|e| BusError::Unavailable(e.to_string()))?;
        }
        Ok(())
    }

    fn consumer_name(topic: &str, group: &str) -> String {
        format!("{}-{}", group, topic.replace('.', "-"))
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, message: BusMessage) -> Result<(), BusError> {
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = BusError::Unavailable("no publish attempt".into());

        for attempt in 1..=attempts {
            let result =
                tokio::time::timeout(self.config.write_timeout, self.publish_once(&message)).await;
            match result {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => last_error = e,
                Err(_) => last_error = BusError::Timeout(self.config.write_timeout),
            }
            debug!(
                topic = %message.topic,
                attempt,
                error = %last_error,
                "Publish attempt failed"
            );
        }

        warn!(topic = %message.topic, attempts, "Publish failed");
        Err(last_error)
    }
}

struct NatsAcker {
    message: jetstream::Message,
}

#[async_trait]
impl Acknowledger for NatsAcker {
    async fn ack(self: Box<Self>) -> Result<(), BusError> {
        self.message
            .ack()
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))
    }

    async fn nack(self: Box<Self>) -> Result<(), BusError> {
        self.message
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))
    }
}

fn to_bus_message(message: &jetstream::Message) -> BusMessage {
    let mut bus_message = BusMessage::new(
        message.subject.to_string(),
        String::new(),
        message.payload.clone(),
    );
    if let Some(nats_headers) = &message.headers {
        for name in headers::ALL {
            if let Some(value) = nats_headers.get(name) {
                bus_message = bus_message.with_header(name, value.as_str());
            }
        }
    }
    if let Some(key) = bus_message.header(headers::PARTITION_KEY) {
        bus_message.key = key.to_string();
    }
    bus_message
}

#[async_trait]
impl MessageConsumer for NatsBus {
    async fn subscribe(&self, topic: &str, group: &str) -> Result<DeliveryStream, BusError> {
        let name = Self::consumer_name(topic, group);
        let stream = self
            .context
            .get_stream(&self.config.stream)
            .await
            .map_err(|e| BusError::Unavailable(format!("stream {}: {e}", self.config.stream)))?;

        let consumer = stream
            .get_or_create_consumer(
                &name,
                pull::Config {
                    durable_name: Some(name.clone()),
                    filter_subject: topic.to_string(),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::Unavailable(format!("consumer {name}: {e}")))?;

        let messages = consumer
            .stream()
            .max_messages_per_batch(self.config.batch_size)
            .max_bytes_per_batch(self.config.batch_bytes)
            .expires(self.config.read_timeout.max(Duration::from_secs(1)))
            .messages()
            .await
            .map_err(|e| BusError::Unavailable(format!("consumer {name}: {e}")))?;

        debug!(topic, group, consumer = %name, "Subscribed");

        let deliveries = messages.map(|result| match result {
            Ok(message) => {
                let bus_message = to_bus_message(&message);
                Ok(Delivery::new(bus_message, Box::new(NatsAcker { message })))
            }
            Err(e) => Err(BusError::Unavailable(e.to_string())),
        });
        Ok(deliveries.boxed())
    }
}
