//! In-process event publishing.
//!
//! This path sends events straight to the bus from dispatcher handlers,
//! after the command committed. It is best effort: the outbox relay is the
//! delivery guarantee, and consumers may see the same event from both paths.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::bus::{BusMessage, MessageBus, headers};
use crate::error::BusError;
use crate::payloads::*;
use crate::topics::TopicRegistry;

/// Publishes one typed payload per topic.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_user_created(&self, payload: &UserCreatedPayload) -> Result<(), BusError>;
    async fn publish_user_profile_updated(
        &self,
        payload: &UserProfileUpdatedPayload,
    ) -> Result<(), BusError>;
    async fn publish_user_password_changed(
        &self,
        payload: &UserPasswordChangedPayload,
    ) -> Result<(), BusError>;
    async fn publish_message_created(&self, payload: &MessageCreatedPayload)
    -> Result<(), BusError>;
    async fn publish_message_read(&self, payload: &MessageReadPayload) -> Result<(), BusError>;
    async fn publish_product_created(&self, payload: &ProductCreatedPayload)
    -> Result<(), BusError>;
    async fn publish_product_stock_updated(
        &self,
        payload: &ProductStockUpdatedPayload,
    ) -> Result<(), BusError>;
    async fn publish_order_created(&self, payload: &OrderCreatedPayload) -> Result<(), BusError>;
    async fn publish_order_item_added(&self, payload: &OrderItemAddedPayload)
    -> Result<(), BusError>;
    async fn publish_order_confirmed(&self, payload: &OrderConfirmedPayload)
    -> Result<(), BusError>;
    async fn publish_order_cancelled(&self, payload: &OrderCancelledPayload)
    -> Result<(), BusError>;
}

/// [`EventPublisher`] writing to a [`MessageBus`].
pub struct BusEventPublisher {
    bus: Arc<dyn MessageBus>,
    topics: TopicRegistry,
}

impl BusEventPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, topics: TopicRegistry) -> Self {
        Self { bus, topics }
    }

    async fn send<T: Serialize + Sync>(
        &self,
        event_type: &str,
        aggregate_type: &str,
        key: String,
        payload: &T,
    ) -> Result<(), BusError> {
        let topic = self
            .topics
            .topic_for(event_type)
            .ok_or_else(|| BusError::Rejected(format!("no topic for {event_type}")))?;

        let message = BusMessage::json(topic, key, payload)?
            .with_header(headers::EVENT_TYPE, event_type)
            .with_header(headers::EVENT_VERSION, "1")
            .with_header(headers::AGGREGATE_TYPE, aggregate_type);
        self.bus.publish(message).await
    }
}

#[async_trait]
impl EventPublisher for BusEventPublisher {
    async fn publish_user_created(&self, payload: &UserCreatedPayload) -> Result<(), BusError> {
        self.send("UserCreated", "User", payload.user_id.to_string(), payload)
            .await
    }

    async fn publish_user_profile_updated(
        &self,
        payload: &UserProfileUpdatedPayload,
    ) -> Result<(), BusError> {
        self.send("UserProfileUpdated", "User", payload.user_id.to_string(), payload)
            .await
    }

    async fn publish_user_password_changed(
        &self,
        payload: &UserPasswordChangedPayload,
    ) -> Result<(), BusError> {
        self.send("UserPasswordChanged", "User", payload.user_id.to_string(), payload)
            .await
    }

    async fn publish_message_created(
        &self,
        payload: &MessageCreatedPayload,
    ) -> Result<(), BusError> {
        self.send("MessageCreated", "Message", payload.message_id.to_string(), payload)
            .await
    }

    async fn publish_message_read(&self, payload: &MessageReadPayload) -> Result<(), BusError> {
        self.send("MessageRead", "Message", payload.message_id.to_string(), payload)
            .await
    }

    async fn publish_product_created(
        &self,
        payload: &ProductCreatedPayload,
    ) -> Result<(), BusError> {
        self.send("ProductCreated", "Product", payload.product_id.to_string(), payload)
            .await
    }

    async fn publish_product_stock_updated(
        &self,
        payload: &ProductStockUpdatedPayload,
    ) -> Result<(), BusError> {
        self.send("ProductStockUpdated", "Product", payload.product_id.to_string(), payload)
            .await
    }

    async fn publish_order_created(&self, payload: &OrderCreatedPayload) -> Result<(), BusError> {
        self.send("OrderCreated", "Order", payload.order_id.to_string(), payload)
            .await
    }

    async fn publish_order_item_added(
        &self,
        payload: &OrderItemAddedPayload,
    ) -> Result<(), BusError> {
        self.send("OrderItemAdded", "Order", payload.order_id.to_string(), payload)
            .await
    }

    async fn publish_order_confirmed(
        &self,
        payload: &OrderConfirmedPayload,
    ) -> Result<(), BusError> {
        self.send("OrderConfirmed", "Order", payload.order_id.to_string(), payload)
            .await
    }

    async fn publish_order_cancelled(
        &self,
        payload: &OrderCancelledPayload,
    ) -> Result<(), BusError> {
        self.send("OrderCancelled", "Order", payload.order_id.to_string(), payload)
            .await
    }
}
