//! Order aggregate implementation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::AggregateId;

use crate::aggregate::{Aggregate, EventBuffer};

use super::{
    Money, OrderError, OrderEvent, OrderItem, OrderStatus,
    events::{OrderCancelledData, OrderConfirmedData, OrderCreatedData, OrderItemAddedData},
};

/// Order aggregate root.
///
/// Owns its list of [`OrderItem`] lines. Items can only be added while the
/// order is a draft; confirmation and cancellation follow [`OrderStatus`].
#[derive(Debug, Clone, Default)]
pub struct Order {
    id: AggregateId,
    version: i64,
    user_id: AggregateId,
    status: OrderStatus,
    items: Vec<OrderItem>,
    total_amount: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: EventBuffer<OrderEvent>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
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

    fn validate(&self) -> Result<(), OrderError> {
        if self.status == OrderStatus::Confirmed && self.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        Ok(())
    }

    fn apply(&mut self, event: &OrderEvent) {
        match event {
            OrderEvent::OrderCreated(data) => {
                // Totals are rebuilt from the OrderItemAdded events that follow.
                self.id = data.order_id;
                self.user_id = data.user_id;
                self.status = OrderStatus::Draft;
                self.created_at = data.created_at;
                self.updated_at = data.created_at;
            }
            OrderEvent::OrderItemAdded(data) => {
                self.items.push(item_from_event(data));
                self.total_amount += data.sub_total;
                self.updated_at = data.updated_at;
            }
            OrderEvent::OrderConfirmed(data) => {
                self.status = OrderStatus::Confirmed;
                self.updated_at = data.confirmed_at;
            }
            OrderEvent::OrderCancelled(data) => {
                self.status = OrderStatus::Cancelled;
                self.updated_at = data.cancelled_at;
            }
        }
    }

    fn events(&self) -> &[OrderEvent] {
        self.events.events()
    }

    fn clear_events(&mut self) {
        self.events.clear();
    }
}

fn item_from_event(data: &OrderItemAddedData) -> OrderItem {
    OrderItem::from_parts(data.product_id, data.quantity, data.unit_price)
}

// Query methods
impl Order {
    pub fn user_id(&self) -> AggregateId {
        self.user_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns the items in the order they were added.
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Returns the number of order lines.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Units needed per product, summed over all lines.
    pub fn required_stock(&self) -> BTreeMap<AggregateId, u32> {
        let mut required = BTreeMap::new();
        for item in &self.items {
            *required.entry(item.product_id()).or_insert(0) += item.quantity();
        }
        required
    }
}

// Command methods (stage events)
impl Order {
    /// Creates a draft order, staging `OrderCreated` and then one
    /// `OrderItemAdded` per initial item.
    pub fn create(
        id: AggregateId,
        user_id: AggregateId,
        items: Vec<OrderItem>,
    ) -> Result<Self, OrderError> {
        let mut order = Order::default();
        let event = OrderEvent::OrderCreated(OrderCreatedData {
            order_id: id,
            user_id,
            total_amount: items.iter().map(OrderItem::sub_total).sum(),
            item_count: items.len(),
            created_at: Utc::now(),
        });
        order.apply(&event);
        order.events.record(event);

        for item in items {
            order.add_item(item)?;
        }
        Ok(order)
    }

    /// Adds an item to a draft order.
    pub fn add_item(&mut self, item: OrderItem) -> Result<(), OrderError> {
        if !self.status.can_modify_items() {
            return Err(OrderError::InvalidStateTransition {
                current: self.status,
                action: "add item",
            });
        }

        let event = OrderEvent::OrderItemAdded(OrderItemAddedData {
            order_id: self.id,
            product_id: item.product_id(),
            quantity: item.quantity(),
            unit_price: item.unit_price(),
            sub_total: item.sub_total(),
            updated_at: Utc::now(),
        });
        self.apply(&event);
        self.events.record(event);
        Ok(())
    }

    /// Confirms a non-empty draft order.
    ///
    /// Stock is taken by the caller on the products themselves.
    pub fn confirm(&mut self) -> Result<(), OrderError> {
        if !self.status.can_confirm() {
            return Err(OrderError::InvalidStateTransition {
                current: self.status,
                action: "confirm",
            });
        }
        if self.items.is_empty() {
            return Err(OrderError::NoItems);
        }

        let event = OrderEvent::OrderConfirmed(OrderConfirmedData {
            order_id: self.id,
            user_id: self.user_id,
            total_amount: self.total_amount,
            item_count: self.items.len(),
            confirmed_at: Utc::now(),
        });
        self.apply(&event);
        self.events.record(event);
        Ok(())
    }

    /// Cancels a draft or confirmed order.
    ///
    /// Returns the status the order had before, so the caller knows whether
    /// stock has to be returned.
    pub fn cancel(&mut self) -> Result<OrderStatus, OrderError> {
        if !self.status.can_cancel() {
            return Err(OrderError::InvalidStateTransition {
                current: self.status,
                action: "cancel",
            });
        }

        let previous = self.status;
        let event = OrderEvent::OrderCancelled(OrderCancelledData {
            order_id: self.id,
            user_id: self.user_id,
            cancelled_at: Utc::now(),
        });
        self.apply(&event);
        self.events.record(event);
        Ok(previous)
    }

    /// Rebuilds an order from its persisted rows.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: AggregateId,
        version: i64,
        user_id: AggregateId,
        status: OrderStatus,
        items: Vec<OrderItem>,
        total_amount: Money,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            version,
            user_id,
            status,
            items,
            total_amount,
            created_at,
            updated_at,
            events: EventBuffer::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DomainEvent;

    fn item(product_id: AggregateId, quantity: u32) -> OrderItem {
        OrderItem::new(product_id, quantity, Money::from_cents(1000)).unwrap()
    }

    #[test]
    fn test_create_stages_created_then_items() {
        let p1 = AggregateId::new();
        let p2 = AggregateId::new();
        let order = Order::create(
            AggregateId::new(),
            AggregateId::new(),
            vec![item(p1, 2), item(p2, 1)],
        )
        .unwrap();

        let types: Vec<_> = order.events().iter().map(|e| e.event_type()).collect();
        assert_eq!(types, ["OrderCreated", "OrderItemAdded", "OrderItemAdded"]);
        assert_eq!(order.total_amount().cents(), 3000);
        assert_eq!(order.item_count(), 2);
        assert_eq!(order.status(), OrderStatus::Draft);

        match &order.events()[0] {
            OrderEvent::OrderCreated(data) => {
                assert_eq!(data.total_amount.cents(), 3000);
                assert_eq!(data.item_count, 2);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_required_stock_sums_lines_per_product() {
        let p1 = AggregateId::new();
        let p2 = AggregateId::new();
        let order = Order::create(
            AggregateId::new(),
            AggregateId::new(),
            vec![item(p1, 2), item(p2, 1), item(p1, 3)],
        )
        .unwrap();

        let required = order.required_stock();
        assert_eq!(required[&p1], 5);
        assert_eq!(required[&p2], 1);
    }

    #[test]
    fn test_confirm_requires_items() {
        let mut order = Order::create(AggregateId::new(), AggregateId::new(), vec![]).unwrap();
        order.clear_events();

        assert!(matches!(order.confirm(), Err(OrderError::NoItems)));
        assert!(order.events().is_empty());
    }

    #[test]
    fn test_cannot_add_items_after_confirm() {
        let mut order = Order::create(
            AggregateId::new(),
            AggregateId::new(),
            vec![item(AggregateId::new(), 1)],
        )
        .unwrap();
        order.confirm().unwrap();
        order.clear_events();

        let err = order.add_item(item(AggregateId::new(), 1)).unwrap_err();
        assert_eq!(err.code(), "invalid_state_transition");
        assert!(order.events().is_empty());
        assert_eq!(order.item_count(), 1);
    }

    #[test]
    fn test_cancel_reports_previous_status() {
        let mut order = Order::create(
            AggregateId::new(),
            AggregateId::new(),
            vec![item(AggregateId::new(), 1)],
        )
        .unwrap();
        order.confirm().unwrap();

        assert_eq!(order.cancel().unwrap(), OrderStatus::Confirmed);
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert!(order.cancel().is_err());
    }

    #[test]
    fn test_replay_matches_state() {
        let mut order = Order::create(
            AggregateId::new(),
            AggregateId::new(),
            vec![item(AggregateId::new(), 4)],
        )
        .unwrap();
        order.add_item(item(AggregateId::new(), 1)).unwrap();
        order.confirm().unwrap();

        let replayed = Order::replay(order.events());
        assert_eq!(replayed.id(), order.id());
        assert_eq!(replayed.user_id(), order.user_id());
        assert_eq!(replayed.status(), OrderStatus::Confirmed);
        assert_eq!(replayed.items(), order.items());
        assert_eq!(replayed.total_amount(), order.total_amount());
    }
}
