//! Subscriber runtime: one consumer loop per topic.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use domain::uow::BoxError;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::{BusMessage, Delivery, MessageConsumer};
use crate::error::SubscriberError;

/// Processes messages from one topic.
///
/// Delivery is at-least-once: the same event can arrive more than once,
/// through redelivery or through both the relay and the in-process
/// publisher. Handlers must be idempotent, typically by remembering
/// [`BusMessage::idempotency_key`].
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// An error leaves the message unacknowledged for redelivery.
    async fn handle(&self, message: &BusMessage) -> Result<(), BoxError>;
}

/// Consumes one topic as a member of a consumer group.
pub struct Subscriber {
    consumer: Arc<dyn MessageConsumer>,
    topic: String,
    group: String,
    handler: Arc<dyn MessageHandler>,
    retry_delay: Duration,
}

impl Subscriber {
    pub fn new(
        consumer: Arc<dyn MessageConsumer>,
        topic: impl Into<String>,
        group: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            consumer,
            topic: topic.into(),
            group: group.into(),
            handler,
            retry_delay: Duration::from_millis(100),
        }
    }

    /// Delay before the next poll after a handler failure.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Consumes until `shutdown` turns true or the stream ends.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), SubscriberError> {
        let mut deliveries = self
            .consumer
            .subscribe(&self.topic, &self.group)
            .await
            .map_err(|source| SubscriberError::Subscribe {
                topic: self.topic.clone(),
                source,
            })?;

        tracing::info!(
            topic = %self.topic,
            group = %self.group,
            handler = self.handler.name(),
            "Subscriber started"
        );

        while !*shutdown.borrow() {
            let next = tokio::select! {
                _ = shutdown.changed() => break,
                next = deliveries.next() => next,
            };

            let backoff = match next {
                Some(Ok(delivery)) => !self.process(delivery).await,
                Some(Err(e)) => {
                    tracing::warn!(topic = %self.topic, error = %e, "Consume failed");
                    true
                }
                None => break,
            };

            if backoff {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(self.retry_delay) => {}
                }
            }
        }

        tracing::info!(topic = %self.topic, group = %self.group, "Subscriber stopped");
        Ok(())
    }

    /// Hands one delivery to the handler. Returns false when it failed.
    async fn process(&self, delivery: Delivery) -> bool {
        let handler = self.handler.name();
        match self.handler.handle(delivery.message()).await {
            Ok(()) => {
                metrics::counter!(
                    "subscriber_messages_total",
                    "topic" => self.topic.clone(),
                    "outcome" => "ok"
                )
                .increment(1);
                if let Err(e) = delivery.ack().await {
                    tracing::warn!(topic = %self.topic, error = %e, "Ack failed");
                }
                true
            }
            Err(source) => {
                let error = SubscriberError::Handler { handler, source };
                tracing::warn!(
                    topic = %self.topic,
                    key = %delivery.message().key,
                    error = %error,
                    "Handler failed, message will be redelivered"
                );
                metrics::counter!(
                    "subscriber_messages_total",
                    "topic" => self.topic.clone(),
                    "outcome" => "error"
                )
                .increment(1);
                if let Err(e) = delivery.nack().await {
                    tracing::warn!(topic = %self.topic, error = %e, "Nack failed");
                }
                false
            }
        }
    }

    /// Runs the subscriber on a background task.
    pub fn spawn(self) -> SubscriberHandle {
        let (shutdown, receiver) = watch::channel(false);
        let topic = self.topic.clone();
        let join = tokio::spawn(async move {
            if let Err(e) = self.run(receiver).await {
                tracing::error!(error = %e, "Subscriber failed");
            }
        });
        SubscriberHandle {
            topic,
            shutdown,
            join,
        }
    }
}

/// Handle to a spawned subscriber.
pub struct SubscriberHandle {
    topic: String,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SubscriberHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            tracing::error!(topic = %self.topic, error = %e, "Subscriber task failed");
        }
    }
}

/// Logs every distinct event it receives.
#[derive(Default)]
pub struct AuditLogHandler {
    seen: Mutex<HashSet<String>>,
}

impl AuditLogHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct events logged so far.
    pub fn seen_count(&self) -> usize {
        self.seen.lock().map_or(0, |seen| seen.len())
    }
}

#[async_trait]
impl MessageHandler for AuditLogHandler {
    fn name(&self) -> &'static str {
        "audit-log"
    }

    async fn handle(&self, message: &BusMessage) -> Result<(), BoxError> {
        let key = message.idempotency_key();
        let first = self
            .seen
            .lock()
            .map_err(|_| "audit log state poisoned")?
            .insert(key.clone());

        if first {
            tracing::info!(
                topic = %message.topic,
                key = %message.key,
                event_type = message.event_type().unwrap_or("unknown"),
                idempotency_key = %key,
                "Audit"
            );
        } else {
            tracing::debug!(idempotency_key = %key, "Duplicate delivery ignored");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::bus::headers;

    #[tokio::test]
    async fn audit_handler_dedupes_on_idempotency_key() {
        let handler = AuditLogHandler::new();
        let message = BusMessage::new("user.created", "u1", Bytes::from_static(b"{}"))
            .with_header(headers::EVENT_ID, "e1");

        handler.handle(&message).await.unwrap();
        handler.handle(&message).await.unwrap();
        assert_eq!(handler.seen_count(), 1);

        let other = message.clone().with_header(headers::EVENT_ID, "e2");
        handler.handle(&other).await.unwrap();
        assert_eq!(handler.seen_count(), 2);
    }
}
