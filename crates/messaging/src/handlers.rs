//! Dispatcher handlers that publish committed events in process.

use std::sync::Arc;

use async_trait::async_trait;
use domain::uow::BoxError;
use domain::{
    CommandContext, DomainEvent, Event, EventDispatcher, EventHandler, MessageEvent, OrderEvent,
    ProductEvent, UserEvent,
};
use tracing::debug;

use crate::payloads::*;
use crate::publisher::EventPublisher;

/// Publishes user events.
pub struct UserEventHandler {
    publisher: Arc<dyn EventPublisher>,
}

impl UserEventHandler {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl EventHandler for UserEventHandler {
    fn name(&self) -> &'static str {
        "user-event-publisher"
    }

    async fn handle(&self, _ctx: &CommandContext, event: &Event) -> Result<(), BoxError> {
        match event {
            Event::User(UserEvent::UserCreated(data)) => {
                self.publisher
                    .publish_user_created(&UserCreatedPayload::from(data))
                    .await?
            }
            Event::User(UserEvent::UserProfileUpdated(data)) => {
                self.publisher
                    .publish_user_profile_updated(&UserProfileUpdatedPayload::from(data))
                    .await?
            }
            Event::User(UserEvent::UserPasswordChanged(data)) => {
                self.publisher
                    .publish_user_password_changed(&UserPasswordChangedPayload::from(data))
                    .await?
            }
            other => debug!(event_type = other.event_type(), "Ignoring event"),
        }
        Ok(())
    }
}

/// Publishes chat message events.
pub struct ChatEventHandler {
    publisher: Arc<dyn EventPublisher>,
}

impl ChatEventHandler {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl EventHandler for ChatEventHandler {
    fn name(&self) -> &'static str {
        "chat-event-publisher"
    }

    async fn handle(&self, _ctx: &CommandContext, event: &Event) -> Result<(), BoxError> {
        match event {
            Event::Message(MessageEvent::MessageCreated(data)) => {
                self.publisher
                    .publish_message_created(&MessageCreatedPayload::from(data))
                    .await?
            }
            Event::Message(MessageEvent::MessageRead(data)) => {
                self.publisher
                    .publish_message_read(&MessageReadPayload::from(data))
                    .await?
            }
            other => debug!(event_type = other.event_type(), "Ignoring event"),
        }
        Ok(())
    }
}

/// Publishes product events.
pub struct ProductEventHandler {
    publisher: Arc<dyn EventPublisher>,
}

impl ProductEventHandler {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl EventHandler for ProductEventHandler {
    fn name(&self) -> &'static str {
        "product-event-publisher"
    }

    async fn handle(&self, _ctx: &CommandContext, event: &Event) -> Result<(), BoxError> {
        match event {
            Event::Product(ProductEvent::ProductCreated(data)) => {
                self.publisher
                    .publish_product_created(&ProductCreatedPayload::from(data))
                    .await?
            }
            Event::Product(ProductEvent::ProductStockUpdated(data)) => {
                self.publisher
                    .publish_product_stock_updated(&ProductStockUpdatedPayload::from(data))
                    .await?
            }
            other => debug!(event_type = other.event_type(), "Ignoring event"),
        }
        Ok(())
    }
}

/// Publishes order events.
pub struct OrderEventHandler {
    publisher: Arc<dyn EventPublisher>,
}

impl OrderEventHandler {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl EventHandler for OrderEventHandler {
    fn name(&self) -> &'static str {
        "order-event-publisher"
    }

    async fn handle(&self, _ctx: &CommandContext, event: &Event) -> Result<(), BoxError> {
        match event {
            Event::Order(OrderEvent::OrderCreated(data)) => {
                self.publisher
                    .publish_order_created(&OrderCreatedPayload::from(data))
                    .await?
            }
            Event::Order(OrderEvent::OrderItemAdded(data)) => {
                self.publisher
                    .publish_order_item_added(&OrderItemAddedPayload::from(data))
                    .await?
            }
            Event::Order(OrderEvent::OrderConfirmed(data)) => {
                self.publisher
                    .publish_order_confirmed(&OrderConfirmedPayload::from(data))
                    .await?
            }
            Event::Order(OrderEvent::OrderCancelled(data)) => {
                self.publisher
                    .publish_order_cancelled(&OrderCancelledPayload::from(data))
                    .await?
            }
            other => debug!(event_type = other.event_type(), "Ignoring event"),
        }
        Ok(())
    }
}

/// Registers the four publishing handlers for every event type they cover.
pub fn register_bus_handlers(dispatcher: &mut EventDispatcher, publisher: Arc<dyn EventPublisher>) {
    let users: Arc<dyn EventHandler> = Arc::new(UserEventHandler::new(publisher.clone()));
    for event_type in ["UserCreated", "UserProfileUpdated", "UserPasswordChanged"] {
        dispatcher.register_handler(event_type, users.clone());
    }

    let chat: Arc<dyn EventHandler> = Arc::new(ChatEventHandler::new(publisher.clone()));
    for event_type in ["MessageCreated", "MessageRead"] {
        dispatcher.register_handler(event_type, chat.clone());
    }

    let products: Arc<dyn EventHandler> = Arc::new(ProductEventHandler::new(publisher.clone()));
    for event_type in ["ProductCreated", "ProductStockUpdated"] {
        dispatcher.register_handler(event_type, products.clone());
    }

    let orders: Arc<dyn EventHandler> = Arc::new(OrderEventHandler::new(publisher));
    for event_type in ["OrderCreated", "OrderItemAdded", "OrderConfirmed", "OrderCancelled"] {
        dispatcher.register_handler(event_type, orders.clone());
    }
}
