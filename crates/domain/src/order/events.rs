//! Order domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::Money;

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was created.
    OrderCreated(OrderCreatedData),

    /// Item was added to the order.
    OrderItemAdded(OrderItemAddedData),

    /// Order was confirmed and stock taken.
    OrderConfirmed(OrderConfirmedData),

    /// Order was cancelled.
    OrderCancelled(OrderCancelledData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "OrderCreated",
            OrderEvent::OrderItemAdded(_) => "OrderItemAdded",
            OrderEvent::OrderConfirmed(_) => "OrderConfirmed",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
        }
    }

    fn aggregate_type(&self) -> &'static str {
        "Order"
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            OrderEvent::OrderCreated(data) => data.order_id,
            OrderEvent::OrderItemAdded(data) => data.order_id,
            OrderEvent::OrderConfirmed(data) => data.order_id,
            OrderEvent::OrderCancelled(data) => data.order_id,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(data) => data.created_at,
            OrderEvent::OrderItemAdded(data) => data.updated_at,
            OrderEvent::OrderConfirmed(data) => data.confirmed_at,
            OrderEvent::OrderCancelled(data) => data.cancelled_at,
        }
    }
}

/// Data for OrderCreated event.
///
/// `total_amount` and `item_count` describe the initial items, each of which
/// follows as its own `OrderItemAdded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub order_id: AggregateId,
    pub user_id: AggregateId,
    pub total_amount: Money,
    pub item_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Data for OrderItemAdded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemAddedData {
    pub order_id: AggregateId,
    pub product_id: AggregateId,
    pub quantity: u32,

    /// Unit price at the time of adding.
    pub unit_price: Money,
    pub sub_total: Money,
    pub updated_at: DateTime<Utc>,
}

/// Data for OrderConfirmed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderConfirmedData {
    pub order_id: AggregateId,
    pub user_id: AggregateId,
    pub total_amount: Money,
    pub item_count: usize,
    pub confirmed_at: DateTime<Utc>,
}

/// Data for OrderCancelled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub order_id: AggregateId,
    pub user_id: AggregateId,
    pub cancelled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_added_payload_uses_cents() {
        let event = OrderEvent::OrderItemAdded(OrderItemAddedData {
            order_id: AggregateId::new(),
            product_id: AggregateId::new(),
            quantity: 2,
            unit_price: Money::from_cents(150),
            sub_total: Money::from_cents(300),
            updated_at: Utc::now(),
        });

        let payload = event.payload().unwrap();
        assert_eq!(payload["unit_price"], 150);
        assert_eq!(payload["sub_total"], 300);
        assert_eq!(event.event_type(), "OrderItemAdded");
    }

    #[test]
    fn test_event_roundtrip_through_payload() {
        let event = OrderEvent::OrderCancelled(OrderCancelledData {
            order_id: AggregateId::new(),
            user_id: AggregateId::new(),
            cancelled_at: Utc::now(),
        });

        let decoded =
            OrderEvent::from_payload(event.event_type(), event.payload().unwrap()).unwrap();
        assert_eq!(decoded, event);
    }
}
