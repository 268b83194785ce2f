//! Integration tests for the order workflow.
//!
//! These tests drive the order and product services through the in-memory
//! unit of work and check that aggregate rows, event store rows and outbox
//! rows always change together.

use std::sync::Arc;

use common::AggregateId;
use domain::{
    AddItem, Aggregate, CancelOrder, CommandContext, CommandExecutor, ConfirmOrder, CreateOrder,
    CreateProduct, DomainError, EventHistory, InMemoryDatabase, Money, OrderError, OrderService,
    OrderStatus, Product, ProductError, ProductService, RestockProduct,
};
use event_store::{EventStore, OutboxStatus};

struct Harness {
    db: InMemoryDatabase,
    orders: OrderService<InMemoryDatabase>,
    products: ProductService<InMemoryDatabase>,
    ctx: CommandContext,
}

impl Harness {
    fn new() -> Self {
        let db = InMemoryDatabase::new();
        let executor = Arc::new(CommandExecutor::new(db.clone()));
        Self {
            db,
            orders: OrderService::new(executor.clone()),
            products: ProductService::new(executor),
            ctx: CommandContext::new(),
        }
    }

    async fn product(&self, price_cents: i64, stock: u32) -> Product {
        self.products
            .create_product(
                &self.ctx,
                CreateProduct::new("Widget", "A widget", Money::from_cents(price_cents), stock),
            )
            .await
            .unwrap()
    }

    async fn draft_order(&self, product: &Product, quantity: u32) -> AggregateId {
        let cmd = CreateOrder::new(AggregateId::new()).with_line(product.id(), quantity);
        self.orders.create_order(&self.ctx, cmd).await.unwrap().id()
    }

    async fn row_counts(&self) -> (u64, usize) {
        let events = self.db.event_store();
        (events.count_events().await.unwrap(), events.outbox_count().await)
    }

    async fn last_event_types(&self, n: usize) -> Vec<String> {
        let entries = self.db.event_store().outbox_entries().await;
        entries[entries.len() - n..]
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }
}

mod order_lifecycle {
    use super::*;

    #[tokio::test]
    async fn create_order_with_lines_stages_created_then_items() {
        let h = Harness::new();
        let product = h.product(1500, 10).await;

        let cmd = CreateOrder::new(AggregateId::new())
            .with_line(product.id(), 2)
            .with_line(product.id(), 1);
        let order = h.orders.create_order(&h.ctx, cmd).await.unwrap();

        assert_eq!(order.status(), OrderStatus::Draft);
        assert_eq!(order.item_count(), 2);
        assert_eq!(order.total_amount(), Money::from_cents(4500));
        assert!(order.events().is_empty(), "buffer is cleared after commit");

        assert_eq!(
            h.last_event_types(3).await,
            ["OrderCreated", "OrderItemAdded", "OrderItemAdded"]
        );
        let created = &h.db.event_store().outbox_entries().await[1];
        assert_eq!(created.payload["total_amount"], 4500);
        assert_eq!(created.payload["item_count"], 2);
    }

    #[tokio::test]
    async fn add_item_uses_current_product_price() {
        let h = Harness::new();
        let product = h.product(700, 10).await;
        let order_id = h
            .orders
            .create_order(&h.ctx, CreateOrder::new(AggregateId::new()))
            .await
            .unwrap()
            .id();

        let order = h
            .orders
            .add_item(&h.ctx, AddItem::new(order_id, product.id(), 3))
            .await
            .unwrap();

        assert_eq!(order.items()[0].unit_price(), Money::from_cents(700));
        assert_eq!(order.total_amount(), Money::from_cents(2100));

        let stored = h.db.order(order_id).await.unwrap();
        assert_eq!(stored.total_amount(), Money::from_cents(2100));
        assert_eq!(stored.version(), 2);
    }

    #[tokio::test]
    async fn add_item_for_unknown_product_is_not_found() {
        let h = Harness::new();
        let order_id = h
            .orders
            .create_order(&h.ctx, CreateOrder::new(AggregateId::new()))
            .await
            .unwrap()
            .id();
        let before = h.row_counts().await;

        let result = h
            .orders
            .add_item(&h.ctx, AddItem::new(order_id, AggregateId::new(), 1))
            .await;

        assert!(matches!(result, Err(DomainError::NotFound { aggregate_type: "Product", .. })));
        assert_eq!(h.row_counts().await, before);
    }

    #[tokio::test]
    async fn confirm_empty_order_fails() {
        let h = Harness::new();
        let order_id = h
            .orders
            .create_order(&h.ctx, CreateOrder::new(AggregateId::new()))
            .await
            .unwrap()
            .id();

        let result = h.orders.confirm_order(&h.ctx, ConfirmOrder::new(order_id)).await;
        assert!(matches!(result, Err(DomainError::Order(OrderError::NoItems))));
    }

    #[tokio::test]
    async fn confirm_with_insufficient_stock_changes_nothing() {
        let h = Harness::new();
        let product = h.product(1000, 3).await;
        let order_id = h.draft_order(&product, 5).await;
        let before = h.row_counts().await;

        let err = h
            .orders
            .confirm_order(&h.ctx, ConfirmOrder::new(order_id))
            .await
            .unwrap_err();

        assert!(err.is_invariant_violation());
        assert_eq!(err.code(), "insufficient_stock");
        assert!(matches!(
            err,
            DomainError::Product(ProductError::InsufficientStock {
                requested: 5,
                available: 3,
                ..
            })
        ));

        assert_eq!(h.db.order(order_id).await.unwrap().status(), OrderStatus::Draft);
        assert_eq!(h.db.product(product.id()).await.unwrap().stock(), 3);
        assert_eq!(h.row_counts().await, before);
    }

    #[tokio::test]
    async fn confirm_takes_stock_and_records_both_events() {
        let h = Harness::new();
        let product = h.product(1000, 10).await;
        let order_id = h.draft_order(&product, 5).await;
        let (events_before, outbox_before) = h.row_counts().await;

        let order = h
            .orders
            .confirm_order(&h.ctx, ConfirmOrder::new(order_id))
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert_eq!(h.db.product(product.id()).await.unwrap().stock(), 5);
        assert_eq!(h.row_counts().await, (events_before + 2, outbox_before + 2));
        assert_eq!(
            h.last_event_types(2).await,
            ["OrderConfirmed", "ProductStockUpdated"]
        );

        let entries = h.db.event_store().outbox_entries().await;
        let confirmed = &entries[entries.len() - 2];
        assert_eq!(confirmed.payload["order_id"], order_id.to_string());
        assert_eq!(confirmed.payload["total_amount"], 5000);
        assert_eq!(confirmed.payload["item_count"], 1);
        assert_eq!(confirmed.status, OutboxStatus::Pending);

        let stock = &entries[entries.len() - 1];
        assert_eq!(stock.aggregate_id, product.id());
        assert_eq!(stock.payload["old_stock"], 10);
        assert_eq!(stock.payload["new_stock"], 5);
    }

    #[tokio::test]
    async fn confirm_checks_every_product_before_taking_stock() {
        let h = Harness::new();
        let plenty = h.product(100, 50).await;
        let scarce = h.product(100, 1).await;
        let cmd = CreateOrder::new(AggregateId::new())
            .with_line(plenty.id(), 5)
            .with_line(scarce.id(), 2);
        let order_id = h.orders.create_order(&h.ctx, cmd).await.unwrap().id();

        let result = h.orders.confirm_order(&h.ctx, ConfirmOrder::new(order_id)).await;

        assert!(result.is_err());
        assert_eq!(h.db.product(plenty.id()).await.unwrap().stock(), 50);
        assert_eq!(h.db.product(scarce.id()).await.unwrap().stock(), 1);
    }

    #[tokio::test]
    async fn cancel_confirmed_order_returns_stock() {
        let h = Harness::new();
        let product = h.product(1000, 10).await;
        let order_id = h.draft_order(&product, 5).await;
        h.orders
            .confirm_order(&h.ctx, ConfirmOrder::new(order_id))
            .await
            .unwrap();

        let order = h
            .orders
            .cancel_order(&h.ctx, CancelOrder::new(order_id))
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(h.db.product(product.id()).await.unwrap().stock(), 10);
        assert_eq!(
            h.last_event_types(2).await,
            ["OrderCancelled", "ProductStockUpdated"]
        );
        let entries = h.db.event_store().outbox_entries().await;
        let restock = &entries[entries.len() - 1];
        assert_eq!(restock.payload["old_stock"], 5);
        assert_eq!(restock.payload["new_stock"], 10);
    }

    #[tokio::test]
    async fn cancel_draft_order_leaves_stock_alone() {
        let h = Harness::new();
        let product = h.product(1000, 10).await;
        let order_id = h.draft_order(&product, 5).await;
        let (_, outbox_before) = h.row_counts().await;

        h.orders
            .cancel_order(&h.ctx, CancelOrder::new(order_id))
            .await
            .unwrap();

        assert_eq!(h.db.product(product.id()).await.unwrap().stock(), 10);
        assert_eq!(h.row_counts().await.1, outbox_before + 1);
        assert_eq!(h.last_event_types(1).await, ["OrderCancelled"]);
    }

    #[tokio::test]
    async fn cancelled_order_rejects_further_commands() {
        let h = Harness::new();
        let product = h.product(1000, 10).await;
        let order_id = h.draft_order(&product, 1).await;
        h.orders
            .cancel_order(&h.ctx, CancelOrder::new(order_id))
            .await
            .unwrap();
        let before = h.row_counts().await;

        let cancel = h.orders.cancel_order(&h.ctx, CancelOrder::new(order_id)).await;
        assert!(matches!(
            cancel,
            Err(DomainError::Order(OrderError::InvalidStateTransition { .. }))
        ));

        let add = h
            .orders
            .add_item(&h.ctx, AddItem::new(order_id, product.id(), 1))
            .await;
        assert!(matches!(
            add,
            Err(DomainError::Order(OrderError::InvalidStateTransition { .. }))
        ));
        assert_eq!(h.row_counts().await, before);
    }
}

mod products {
    use super::*;

    #[tokio::test]
    async fn restock_records_stock_update() {
        let h = Harness::new();
        let product = h.product(250, 4).await;

        let product = h
            .products
            .restock_product(&h.ctx, RestockProduct::new(product.id(), 6))
            .await
            .unwrap();

        assert_eq!(product.stock(), 10);
        assert_eq!(h.last_event_types(1).await, ["ProductStockUpdated"]);
    }

    #[tokio::test]
    async fn restock_by_zero_is_rejected() {
        let h = Harness::new();
        let product = h.product(250, 4).await;

        let result = h
            .products
            .restock_product(&h.ctx, RestockProduct::new(product.id(), 0))
            .await;
        assert!(matches!(result, Err(DomainError::Product(ProductError::InvalidQuantity))));
    }
}

mod replay {
    use super::*;

    #[tokio::test]
    async fn replayed_order_matches_persisted_state() {
        let h = Harness::new();
        let product = h.product(1000, 10).await;
        let order_id = h.draft_order(&product, 5).await;
        h.orders
            .add_item(&h.ctx, AddItem::new(order_id, product.id(), 2))
            .await
            .unwrap();
        h.orders
            .confirm_order(&h.ctx, ConfirmOrder::new(order_id))
            .await
            .unwrap();

        let history = EventHistory::new(h.db.event_store().clone());
        let persisted = h.db.order(order_id).await.unwrap();
        let replayed = history.replay_order(order_id).await.unwrap().unwrap();

        assert_eq!(replayed.id(), persisted.id());
        assert_eq!(replayed.user_id(), persisted.user_id());
        assert_eq!(replayed.status(), persisted.status());
        assert_eq!(replayed.items(), persisted.items());
        assert_eq!(replayed.total_amount(), persisted.total_amount());

        let replayed_product = history.replay_product(product.id()).await.unwrap().unwrap();
        assert_eq!(replayed_product.stock(), 3);
        assert_eq!(replayed_product.price(), Money::from_cents(1000));
    }

    #[tokio::test]
    async fn unknown_aggregate_replays_to_none() {
        let h = Harness::new();
        let history = EventHistory::new(h.db.event_store().clone());
        assert!(history.replay_order(AggregateId::new()).await.unwrap().is_none());
    }
}
