//! Process wiring: logging, database pool, bus and background workers.

use std::sync::Arc;

use event_store::OutboxStore;
use messaging::{
    AuditLogHandler, BusError, InMemoryBus, MessageBus, MessageConsumer, MessageHandler, NatsBus,
    OutboxRelay, RelayHandle, Subscriber, SubscriberHandle, TopicRegistry,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{BusTransport, Config, DatabaseConfig, LogFormat};

/// Installs the global tracing subscriber. `RUST_LOG` overrides the
/// default `info` filter.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Opens the connection pool.
pub async fn connect_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .max_lifetime(config.max_lifetime)
        .connect(&config.url)
        .await
}

/// Topic registry with the configured overrides applied.
pub fn topic_registry(config: &Config) -> TopicRegistry {
    TopicRegistry::new().with_overrides(config.topic_overrides.iter().cloned())
}

/// Both halves of the configured transport.
#[derive(Clone)]
pub struct Bus {
    pub publisher: Arc<dyn MessageBus>,
    pub consumer: Arc<dyn MessageConsumer>,
}

impl Bus {
    pub fn in_memory(bus: InMemoryBus) -> Self {
        Self {
            publisher: Arc::new(bus.clone()),
            consumer: Arc::new(bus),
        }
    }

    /// Builds the transport selected by `BUS_TRANSPORT`.
    pub async fn connect(config: &Config, topics: &TopicRegistry) -> Result<Self, BusError> {
        match config.bus_transport {
            BusTransport::Memory => {
                tracing::warn!("Using the in-memory bus; events do not leave this process");
                Ok(Self::in_memory(InMemoryBus::new()))
            }
            BusTransport::Nats => {
                let nats = Arc::new(NatsBus::connect(config.bus.clone(), topics).await?);
                Ok(Self {
                    publisher: nats.clone(),
                    consumer: nats,
                })
            }
        }
    }
}

/// The relay and the subscribers of one process.
pub struct Workers {
    relay: RelayHandle,
    subscribers: Vec<SubscriberHandle>,
}

impl Workers {
    /// Spawns the relay and one audit subscriber per configured topic, all
    /// in the service's consumer group.
    pub fn start(
        config: &Config,
        outbox: Arc<dyn OutboxStore>,
        bus: &Bus,
        topics: TopicRegistry,
    ) -> Self {
        let relay = OutboxRelay::new(outbox, bus.publisher.clone(), topics, config.relay.clone())
            .spawn();

        let audit: Arc<dyn MessageHandler> = Arc::new(AuditLogHandler::new());
        let subscribers = config
            .subscribe_topics
            .iter()
            .map(|topic| {
                Subscriber::new(
                    bus.consumer.clone(),
                    topic.clone(),
                    config.service_name.clone(),
                    audit.clone(),
                )
                .spawn()
            })
            .collect::<Vec<_>>();

        tracing::info!(
            subscribers = subscribers.len(),
            group = %config.service_name,
            "Background workers started"
        );
        Self { relay, subscribers }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Stops the subscribers, then the relay.
    pub async fn shutdown(self) {
        for subscriber in self.subscribers {
            subscriber.shutdown().await;
        }
        self.relay.shutdown().await;
        tracing::info!("Background workers stopped");
    }
}
