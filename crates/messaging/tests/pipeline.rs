//! End-to-end tests: commands commit through the in-memory unit of work, the
//! relay drains the outbox to the in-memory bus, subscribers consume it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::AggregateId;
use domain::{
    Aggregate, BoxError, CancelOrder, ChatService, CommandContext, CommandExecutor, ConfirmOrder,
    CreateMessage, CreateOrder, CreateProduct, DispatchPolicy, DomainError, EventDispatcher,
    InMemoryDatabase, Money, OrderService, PasswordHasher, ProductService, RegisterUser,
    UpdateProfile, User, UserService,
};
use event_store::{EventStore, EventStoreExt, OutboxStatus, OutboxStore};
use messaging::bus::headers;
use messaging::payloads::{OrderConfirmedPayload, ProductStockUpdatedPayload};
use messaging::{
    AuditLogHandler, BusEventPublisher, BusMessage, InMemoryBus, MessageHandler, OutboxRelay,
    RelayConfig, Subscriber, TopicRegistry, register_bus_handlers,
};

struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, password: &str) -> Result<String, BoxError> {
        Ok(format!("plain:{password}"))
    }
}

struct Pipeline {
    db: InMemoryDatabase,
    bus: InMemoryBus,
    relay: OutboxRelay,
    users: UserService<InMemoryDatabase>,
    chat: ChatService<InMemoryDatabase>,
    products: ProductService<InMemoryDatabase>,
    orders: OrderService<InMemoryDatabase>,
    ctx: CommandContext,
}

impl Pipeline {
    fn new() -> Self {
        Self::build(RelayConfig::default(), None)
    }

    fn with_relay_config(config: RelayConfig) -> Self {
        Self::build(config, None)
    }

    /// Also publishes from the in-process dispatcher.
    fn with_dispatch(policy: DispatchPolicy) -> Self {
        Self::build(RelayConfig::default(), Some(policy))
    }

    fn build(config: RelayConfig, dispatch: Option<DispatchPolicy>) -> Self {
        let db = InMemoryDatabase::new();
        let bus = InMemoryBus::new();
        let topics = TopicRegistry::new();

        let mut executor = CommandExecutor::new(db.clone());
        if let Some(policy) = dispatch {
            let publisher = Arc::new(BusEventPublisher::new(Arc::new(bus.clone()), topics.clone()));
            let mut dispatcher = EventDispatcher::new();
            register_bus_handlers(&mut dispatcher, publisher);
            executor = executor.with_dispatcher(Arc::new(dispatcher), policy);
        }
        let executor = Arc::new(executor);

        let relay = OutboxRelay::new(
            Arc::new(db.event_store().clone()),
            Arc::new(bus.clone()),
            topics,
            config,
        );

        Self {
            users: UserService::new(executor.clone(), Arc::new(PlainHasher)),
            chat: ChatService::new(executor.clone()),
            products: ProductService::new(executor.clone()),
            orders: OrderService::new(executor),
            db,
            bus,
            relay,
            ctx: CommandContext::new(),
        }
    }

    async fn register(&self) -> User {
        self.users
            .register_user(&self.ctx, RegisterUser::new("a@b.c", "pw_1234", "Ann"))
            .await
            .unwrap()
    }

    async fn outbox_statuses(&self) -> Vec<OutboxStatus> {
        self.db
            .event_store()
            .outbox_entries()
            .await
            .iter()
            .map(|e| e.status)
            .collect()
    }

    /// Every published outbox row has a bus message with its payload and key.
    async fn assert_published_rows_on_bus(&self) {
        let topics = TopicRegistry::new();
        for entry in self.db.event_store().outbox_entries().await {
            if entry.status != OutboxStatus::Published {
                continue;
            }
            let topic = topics.topic_for(&entry.event_type).unwrap();
            let found = self.bus.messages(topic).await.into_iter().any(|m| {
                m.key == entry.aggregate_id.to_string()
                    && m.decode::<serde_json::Value>().unwrap() == entry.payload
            });
            assert!(found, "no bus message for {} {}", entry.event_type, entry.id);
        }
    }
}

fn event_types(messages: &[BusMessage]) -> Vec<&str> {
    messages.iter().map(|m| m.event_type().unwrap()).collect()
}

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn s1_register_user_reaches_the_bus() {
        let p = Pipeline::new();
        let user = p.register().await;
        assert_eq!(p.outbox_statuses().await, [OutboxStatus::Pending]);
        assert!(p.bus.messages("user.created").await.is_empty());

        let stats = p.relay.tick().await.unwrap();
        assert_eq!(stats.published, 1);

        let messages = p.bus.messages("user.created").await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key, user.id().to_string());

        let stored = p.db.event_store().get_by_aggregate(user.id(), "User").await.unwrap();
        let payload: serde_json::Value = messages[0].decode().unwrap();
        assert_eq!(payload, stored[0].payload);
        assert_eq!(payload["email"], "a@b.c");
        assert_eq!(payload["name"], "Ann");
        assert_eq!(messages[0].event_id(), Some(stored[0].id.to_string().as_str()));

        assert_eq!(p.outbox_statuses().await, [OutboxStatus::Published]);
        let entry = &p.db.event_store().outbox_entries().await[0];
        assert!(entry.published_at.is_some());
    }

    #[tokio::test]
    async fn s2_chat_message_is_keyed_by_message_id() {
        let p = Pipeline::new();
        let sender = p.register().await;
        let message = p
            .chat
            .create_message(&p.ctx, CreateMessage::new(sender.id(), AggregateId::new(), "hi"))
            .await
            .unwrap();

        p.relay.tick().await.unwrap();

        let messages = p.bus.messages("chat.message.created").await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key, message.id().to_string());
        assert_eq!(messages[0].decode::<serde_json::Value>().unwrap()["content"], "hi");
    }

    #[tokio::test]
    async fn s3_insufficient_stock_publishes_nothing_new() {
        let p = Pipeline::new();
        let product = p
            .products
            .create_product(
                &p.ctx,
                CreateProduct::new("Lamp", "Desk lamp", Money::from_cents(2500), 3),
            )
            .await
            .unwrap();
        let order = p
            .orders
            .create_order(&p.ctx, CreateOrder::new(AggregateId::new()).with_line(product.id(), 5))
            .await
            .unwrap();
        p.relay.tick().await.unwrap();
        let before = p.db.event_store().outbox_count().await;

        let err = p
            .orders
            .confirm_order(&p.ctx, ConfirmOrder::new(order.id()))
            .await
            .unwrap_err();
        assert!(err.is_invariant_violation());

        assert_eq!(p.db.event_store().outbox_count().await, before);
        let stats = p.relay.tick().await.unwrap();
        assert_eq!(stats.published, 0);
        assert!(p.bus.messages("order.confirmed").await.is_empty());
        assert!(p.bus.messages("product.stock.updated").await.is_empty());
    }

    #[tokio::test]
    async fn s4_s5_confirm_then_cancel() {
        let p = Pipeline::new();
        let user_id = AggregateId::new();
        let product = p
            .products
            .create_product(
                &p.ctx,
                CreateProduct::new("Lamp", "Desk lamp", Money::from_cents(2500), 10),
            )
            .await
            .unwrap();
        let order = p
            .orders
            .create_order(&p.ctx, CreateOrder::new(user_id).with_line(product.id(), 5))
            .await
            .unwrap();

        p.orders
            .confirm_order(&p.ctx, ConfirmOrder::new(order.id()))
            .await
            .unwrap();
        p.relay.tick().await.unwrap();

        let confirmed = p.bus.messages("order.confirmed").await;
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].key, order.id().to_string());
        let payload: OrderConfirmedPayload = confirmed[0].decode().unwrap();
        assert_eq!(payload.order_id, order.id());
        assert_eq!(payload.user_id, user_id);
        assert_eq!(payload.item_count, 1);
        assert_eq!(payload.total_amount, 12_500);

        let stock = p.bus.messages("product.stock.updated").await;
        assert_eq!(stock.len(), 1);
        assert_eq!(stock[0].key, product.id().to_string());
        let payload: ProductStockUpdatedPayload = stock[0].decode().unwrap();
        assert_eq!((payload.old_stock, payload.new_stock), (10, 5));

        p.orders
            .cancel_order(&p.ctx, CancelOrder::new(order.id()))
            .await
            .unwrap();
        p.relay.tick().await.unwrap();

        assert_eq!(p.bus.count("order.cancelled").await, 1);
        let stock = p.bus.messages_for_key(&product.id().to_string()).await;
        assert_eq!(
            event_types(&stock),
            ["ProductCreated", "ProductStockUpdated", "ProductStockUpdated"]
        );
        let restock: ProductStockUpdatedPayload = stock[2].decode().unwrap();
        assert_eq!((restock.old_stock, restock.new_stock), (5, 10));

        assert!(p.outbox_statuses().await.iter().all(|s| *s == OutboxStatus::Published));
        p.assert_published_rows_on_bus().await;
    }

    #[tokio::test]
    async fn s6_bus_outage_then_recovery() {
        let p = Pipeline::new();
        p.bus.set_available(false);
        let user = p.register().await;

        for attempt in 1..=3 {
            let stats = p.relay.tick().await.unwrap();
            assert_eq!(stats.failed, 1);
            let entry = &p.db.event_store().outbox_entries().await[0];
            assert_eq!(entry.status, OutboxStatus::Failed);
            assert_eq!(entry.retry_count, attempt);
            assert!(entry.error_message.is_some());
        }
        assert!(p.db.user(user.id()).await.is_some());

        p.bus.set_available(true);
        let stats = p.relay.tick().await.unwrap();
        assert_eq!(stats.rearmed, 1);
        assert_eq!(stats.published, 1);

        assert_eq!(p.bus.count("user.created").await, 1);
        let entry = &p.db.event_store().outbox_entries().await[0];
        assert_eq!(entry.status, OutboxStatus::Published);
        assert!(entry.error_message.is_none());
    }
}

mod delivery {
    use super::*;

    #[tokio::test]
    async fn failure_holds_later_events_of_the_same_aggregate() {
        let p = Pipeline::new();
        let product = p
            .products
            .create_product(&p.ctx, CreateProduct::new("Pen", "Blue", Money::from_cents(100), 50))
            .await
            .unwrap();
        let cmd = CreateOrder::new(AggregateId::new())
            .with_line(product.id(), 1)
            .with_line(product.id(), 2);
        let order = p.orders.create_order(&p.ctx, cmd).await.unwrap();
        p.orders
            .confirm_order(&p.ctx, ConfirmOrder::new(order.id()))
            .await
            .unwrap();

        p.bus.fail_topic("order.item.added").await;
        let stats = p.relay.tick().await.unwrap();
        assert_eq!(stats.failed, 1);
        // second item and confirmation wait behind the failed row
        assert_eq!(stats.held, 2);
        assert_eq!(
            event_types(&p.bus.messages_for_key(&order.id().to_string()).await),
            ["OrderCreated"]
        );

        p.bus.heal_topic("order.item.added").await;
        p.relay.tick().await.unwrap();

        let order_messages = p.bus.messages_for_key(&order.id().to_string()).await;
        assert_eq!(
            event_types(&order_messages),
            ["OrderCreated", "OrderItemAdded", "OrderItemAdded", "OrderConfirmed"]
        );
        let partition = p.bus.partition_for(&order.id().to_string());
        let on_partition: Vec<_> = p
            .bus
            .partition_messages("order.item.added", partition)
            .await
            .into_iter()
            .filter(|m| m.key == order.id().to_string())
            .collect();
        assert_eq!(on_partition.len(), 2);
        p.assert_published_rows_on_bus().await;
    }

    #[tokio::test]
    async fn other_aggregates_keep_flowing_during_a_failure() {
        let p = Pipeline::new();
        let user = p.register().await;
        p.chat
            .create_message(&p.ctx, CreateMessage::new(user.id(), AggregateId::new(), "hi"))
            .await
            .unwrap();

        p.bus.fail_topic("user.created").await;
        let stats = p.relay.tick().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.published, 1);
        assert_eq!(p.bus.count("chat.message.created").await, 1);
    }

    #[tokio::test]
    async fn exhausted_row_blocks_its_aggregate_until_reset() {
        let p = Pipeline::with_relay_config(RelayConfig {
            max_retries: 2,
            ..Default::default()
        });
        let user = p.register().await;
        p.users
            .update_profile(&p.ctx, UpdateProfile::new(user.id(), "Bo"))
            .await
            .unwrap();

        p.bus.fail_topic("user.created").await;
        p.relay.tick().await.unwrap();
        p.relay.tick().await.unwrap();

        let stats = p.relay.tick().await.unwrap();
        assert_eq!(stats.rearmed, 0);
        assert_eq!(stats.blocked, 1);
        assert!(stats.is_clean());

        p.bus.heal_topic("user.created").await;
        let stats = p.relay.tick().await.unwrap();
        assert_eq!(stats.published, 0);
        assert_eq!(stats.blocked, 1);
        assert!(p.bus.messages("user.profile.updated").await.is_empty());

        let failed = p.db.event_store().get_failed(10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].retry_count, 2);
        assert!(p.relay.reset_failed(failed[0].id).await.unwrap());
        assert!(!p.relay.reset_failed(failed[0].id).await.unwrap());

        let stats = p.relay.tick().await.unwrap();
        assert_eq!(stats.published, 2);
        assert_eq!(
            event_types(&p.bus.messages_for_key(&user.id().to_string()).await),
            ["UserCreated", "UserProfileUpdated"]
        );
    }

    #[tokio::test]
    async fn blocked_backlog_does_not_starve_other_aggregates() {
        let p = Pipeline::with_relay_config(RelayConfig {
            max_retries: 1,
            batch_size: 2,
            ..Default::default()
        });
        let user = p.register().await;
        for name in ["Bo", "Cy"] {
            p.users
                .update_profile(&p.ctx, UpdateProfile::new(user.id(), name))
                .await
                .unwrap();
        }

        p.bus.fail_topic("user.created").await;
        let stats = p.relay.tick().await.unwrap();
        assert_eq!(stats.failed, 1);
        p.bus.heal_topic("user.created").await;

        let message = p
            .chat
            .create_message(&p.ctx, CreateMessage::new(user.id(), AggregateId::new(), "hi"))
            .await
            .unwrap();

        let stats = p.relay.tick().await.unwrap();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.blocked, 1);
        assert_eq!(stats.held, 0);
        let chat = p.bus.messages("chat.message.created").await;
        assert_eq!(chat.len(), 1);
        assert_eq!(chat[0].key, message.id().to_string());
        assert!(p.bus.messages("user.profile.updated").await.is_empty());
    }

    #[tokio::test]
    async fn every_exhausted_aggregate_stays_blocked_beyond_one_batch() {
        let p = Pipeline::with_relay_config(RelayConfig {
            max_retries: 1,
            batch_size: 1,
            ..Default::default()
        });
        let a = p
            .users
            .register_user(&p.ctx, RegisterUser::new("a@b.c", "pw_1234", "Ann"))
            .await
            .unwrap();
        let b = p
            .users
            .register_user(&p.ctx, RegisterUser::new("b@b.c", "pw_1234", "Ben"))
            .await
            .unwrap();

        p.bus.fail_topic("user.created").await;
        p.relay.tick().await.unwrap();
        p.relay.tick().await.unwrap();
        let failed = p.db.event_store().get_failed(10).await.unwrap();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|e| e.retry_count == 1));

        p.users
            .update_profile(&p.ctx, UpdateProfile::new(b.id(), "Bea"))
            .await
            .unwrap();
        p.bus.heal_topic("user.created").await;
        for _ in 0..3 {
            let stats = p.relay.tick().await.unwrap();
            assert_eq!(stats.blocked, 2);
            assert_eq!(stats.published, 0);
        }
        assert!(p.bus.messages_for_key(&b.id().to_string()).await.is_empty());

        let b_created = failed.iter().find(|e| e.aggregate_id == b.id()).unwrap();
        assert!(p.relay.reset_failed(b_created.id).await.unwrap());
        p.relay.tick().await.unwrap();
        p.relay.tick().await.unwrap();
        assert_eq!(
            event_types(&p.bus.messages_for_key(&b.id().to_string()).await),
            ["UserCreated", "UserProfileUpdated"]
        );
        assert!(p.bus.messages_for_key(&a.id().to_string()).await.is_empty());
    }

    #[tokio::test]
    async fn exhausted_rows_do_not_hide_retryable_ones() {
        let p = Pipeline::with_relay_config(RelayConfig {
            max_retries: 2,
            batch_size: 1,
            ..Default::default()
        });
        p.bus.fail_topic("user.created").await;
        p.register().await;
        p.relay.tick().await.unwrap();
        p.relay.tick().await.unwrap();

        let late = p
            .users
            .register_user(&p.ctx, RegisterUser::new("b@b.c", "pw_1234", "Ben"))
            .await
            .unwrap();
        let stats = p.relay.tick().await.unwrap();
        assert_eq!(stats.failed, 1);

        p.bus.heal_topic("user.created").await;
        let stats = p.relay.tick().await.unwrap();
        assert_eq!(stats.rearmed, 1);
        assert_eq!(stats.published, 1);
        let messages = p.bus.messages("user.created").await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key, late.id().to_string());
    }

    #[tokio::test]
    async fn unknown_event_type_is_marked_failed() {
        let p = Pipeline::new();
        let store = p.db.event_store();
        let aggregate_id = AggregateId::new();
        let orphan = event_store::NewEvent::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("User")
            .event_type("UserArchived")
            .payload_raw(serde_json::json!({"user_id": aggregate_id}))
            .try_build()
            .unwrap();
        store.commit(&[orphan]).await.unwrap();

        let stats = p.relay.tick().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.published, 0);
        let entry = &store.outbox_entries().await[0];
        assert_eq!(entry.status, OutboxStatus::Failed);
        assert!(entry.error_message.as_deref().unwrap().contains("UserArchived"));
    }

    #[tokio::test]
    async fn lost_ack_duplicates_share_an_idempotency_key() {
        let p = Pipeline::new();
        p.bus.lose_next_acks(1);
        p.register().await;

        let stats = p.relay.tick().await.unwrap();
        assert_eq!(stats.failed, 1);
        let stats = p.relay.tick().await.unwrap();
        assert_eq!(stats.published, 1);

        let messages = p.bus.messages("user.created").await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].idempotency_key(), messages[1].idempotency_key());
        assert_eq!(p.outbox_statuses().await, [OutboxStatus::Published]);
    }

    #[tokio::test]
    async fn published_rows_are_not_sent_again() {
        let p = Pipeline::new();
        p.register().await;
        p.relay.tick().await.unwrap();
        let stats = p.relay.tick().await.unwrap();

        assert_eq!(stats.published, 0);
        assert_eq!(p.bus.count("user.created").await, 1);
        assert_eq!(p.db.event_store().count_events().await.unwrap(), 1);
    }
}

mod dispatch {
    use super::*;

    #[tokio::test]
    async fn dispatcher_publishes_before_the_relay_runs() {
        let p = Pipeline::with_dispatch(DispatchPolicy::BestEffort);
        let user = p.register().await;

        let messages = p.bus.messages("user.created").await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key, user.id().to_string());
        assert_eq!(messages[0].header(headers::EVENT_TYPE), Some("UserCreated"));

        // the relay still delivers its own copy
        p.relay.tick().await.unwrap();
        let messages = p.bus.messages("user.created").await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].payload, messages[1].payload);
    }

    #[tokio::test]
    async fn best_effort_dispatch_survives_an_outage() {
        let p = Pipeline::with_dispatch(DispatchPolicy::BestEffort);
        p.bus.set_available(false);

        p.register().await;
        assert_eq!(p.outbox_statuses().await, [OutboxStatus::Pending]);

        p.bus.set_available(true);
        p.relay.tick().await.unwrap();
        assert_eq!(p.bus.count("user.created").await, 1);
    }

    #[tokio::test]
    async fn required_dispatch_reports_the_failure_but_keeps_the_commit() {
        let p = Pipeline::with_dispatch(DispatchPolicy::Required);
        p.bus.set_available(false);

        let err = p
            .users
            .register_user(&p.ctx, RegisterUser::new("a@b.c", "pw_1234", "Ann"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Dispatch(_)));
        assert_eq!(p.db.event_store().outbox_count().await, 1);

        p.bus.set_available(true);
        p.relay.tick().await.unwrap();
        assert_eq!(p.bus.count("user.created").await, 1);
    }
}

mod subscribers {
    use super::*;

    /// Fails the first `failures` deliveries.
    struct Flaky {
        failures: usize,
        attempts: AtomicUsize,
        handled: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn handle(&self, _message: &BusMessage) -> Result<(), BoxError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err("not yet".into());
            }
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn wait_for_lag(bus: &InMemoryBus, topic: &str, group: &str) {
        for _ in 0..500 {
            if bus.lag(topic, group).await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("group {group} did not catch up on {topic}");
    }

    #[tokio::test]
    async fn failed_message_is_redelivered() {
        let p = Pipeline::new();
        let handler = Arc::new(Flaky {
            failures: 2,
            attempts: AtomicUsize::new(0),
            handled: AtomicUsize::new(0),
        });
        let subscriber = Subscriber::new(
            Arc::new(p.bus.clone()),
            "user.created",
            "audit",
            handler.clone(),
        )
        .with_retry_delay(Duration::from_millis(5))
        .spawn();

        p.register().await;
        p.relay.tick().await.unwrap();
        wait_for_lag(&p.bus, "user.created", "audit").await;
        subscriber.shutdown().await;

        assert_eq!(handler.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_interrupts_retry_delay() {
        let p = Pipeline::new();
        let handler = Arc::new(Flaky {
            failures: usize::MAX,
            attempts: AtomicUsize::new(0),
            handled: AtomicUsize::new(0),
        });
        let subscriber = Subscriber::new(
            Arc::new(p.bus.clone()),
            "user.created",
            "audit",
            handler.clone(),
        )
        .with_retry_delay(Duration::from_secs(60))
        .spawn();

        p.register().await;
        p.relay.tick().await.unwrap();
        for _ in 0..500 {
            if handler.attempts.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handler.attempts.load(Ordering::SeqCst), 1);

        tokio::time::timeout(Duration::from_secs(5), subscriber.shutdown())
            .await
            .expect("subscriber kept sleeping after shutdown");
        assert_eq!(handler.handled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn audit_subscriber_sees_each_event_once() {
        let p = Pipeline::new();
        let audit = Arc::new(AuditLogHandler::new());
        let subscriber = Subscriber::new(
            Arc::new(p.bus.clone()),
            "user.created",
            "audit",
            audit.clone(),
        )
        .spawn();

        p.bus.lose_next_acks(1);
        p.register().await;
        p.relay.tick().await.unwrap();
        p.relay.tick().await.unwrap();
        assert_eq!(p.bus.count("user.created").await, 2);

        wait_for_lag(&p.bus, "user.created", "audit").await;
        subscriber.shutdown().await;
        assert_eq!(audit.seen_count(), 1);
    }

    #[tokio::test]
    async fn groups_consume_independently() {
        let p = Pipeline::new();
        let audit = Arc::new(AuditLogHandler::new());
        let search = Arc::new(AuditLogHandler::new());
        let a = Subscriber::new(Arc::new(p.bus.clone()), "user.created", "audit", audit.clone())
            .spawn();
        let s = Subscriber::new(Arc::new(p.bus.clone()), "user.created", "search", search.clone())
            .spawn();

        p.register().await;
        p.relay.tick().await.unwrap();
        wait_for_lag(&p.bus, "user.created", "audit").await;
        wait_for_lag(&p.bus, "user.created", "search").await;
        a.shutdown().await;
        s.shutdown().await;

        assert_eq!(audit.seen_count(), 1);
        assert_eq!(search.seen_count(), 1);
    }
}
