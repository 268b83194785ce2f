//! Delivery of committed domain events to the message bus.
//!
//! - [`TopicRegistry`] maps event types to bus topics
//! - [`MessageBus`] / [`MessageConsumer`] abstract the transport, with an
//!   in-memory implementation and a NATS JetStream one
//! - [`OutboxRelay`] drains pending outbox rows to the bus
//! - [`BusEventPublisher`] and the handlers in [`handlers`] publish directly
//!   from the in-process dispatcher
//! - [`Subscriber`] consumes a topic and feeds a [`MessageHandler`]
//!
//! Delivery is at-least-once everywhere; consumers must be idempotent.

pub mod bus;
pub mod error;
pub mod handlers;
pub mod payloads;
pub mod publisher;
pub mod relay;
pub mod subscriber;
pub mod topics;

pub use bus::{
    BusConfig, BusMessage, Compression, Delivery, InMemoryBus, MessageBus, MessageConsumer,
    NatsBus, RequiredAcks,
};
pub use error::{BusError, RelayError, SubscriberError};
pub use handlers::{
    ChatEventHandler, OrderEventHandler, ProductEventHandler, UserEventHandler,
    register_bus_handlers,
};
pub use publisher::{BusEventPublisher, EventPublisher};
pub use relay::{OutboxRelay, RelayConfig, RelayHandle, RelayStats};
pub use subscriber::{AuditLogHandler, MessageHandler, Subscriber, SubscriberHandle};
pub use topics::TopicRegistry;
