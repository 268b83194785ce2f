//! Outbox relay: moves committed outbox rows onto the bus.
//!
//! Rows are read without claiming them, so two relays over the same outbox
//! may both publish a row. Delivery is at-least-once and subscribers dedupe
//! on the event id. Per-aggregate order holds for a single relay: rows are
//! published oldest first, and an aggregate with a `failed` row is left out
//! of the pending read until that row is re-armed or reset. Exhausted rows
//! stay `failed` until an operator resets them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::AggregateId;
use event_store::{EventId, OutboxStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::{BusMessage, MessageBus};
use crate::error::RelayError;
use crate::topics::TopicRegistry;

/// Relay tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    /// Rows read per tick.
    pub batch_size: usize,
    /// Publish attempts per row before it stays `failed`.
    pub max_retries: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 100,
            max_retries: 10,
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Failed rows moved back to `pending`.
    pub rearmed: usize,
    pub published: usize,
    pub failed: usize,
    /// Pending rows left for a later tick because their aggregate failed
    /// earlier in the same tick.
    pub held: usize,
    /// Aggregates whose pending rows were not read because one of their rows
    /// is `failed`.
    pub blocked: usize,
    /// Rows another relay settled first.
    pub skipped: usize,
}

impl RelayStats {
    /// True when nothing failed or was held back during the tick.
    ///
    /// Aggregates blocked by rows from earlier ticks do not count.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.held == 0
    }
}

/// Exponential backoff between failing ticks.
#[derive(Debug, Clone)]
struct Backoff {
    min: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            current: None,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.min,
            Some(current) => (current * 2).min(self.max),
        };
        self.current = Some(next);
        next
    }

    fn reset(&mut self) {
        self.current = None;
    }
}

/// Drains the outbox to the bus.
pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    bus: Arc<dyn MessageBus>,
    topics: TopicRegistry,
    config: RelayConfig,
}

impl OutboxRelay {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        bus: Arc<dyn MessageBus>,
        topics: TopicRegistry,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            bus,
            topics,
            config,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Processes one batch.
    #[tracing::instrument(skip(self))]
    pub async fn tick(&self) -> Result<RelayStats, RelayError> {
        let started = Instant::now();
        let mut stats = RelayStats::default();

        let exhausted: HashSet<AggregateId> = self
            .store
            .failed_aggregates(self.config.max_retries)
            .await?
            .into_iter()
            .collect();
        for entry in self
            .store
            .get_retryable(self.config.max_retries, self.config.batch_size)
            .await?
        {
            if exhausted.contains(&entry.aggregate_id) {
                continue;
            }
            if self.store.reset_to_pending(entry.id).await? {
                stats.rearmed += 1;
            }
        }

        // Any row still failed holds back the later rows of its aggregate.
        let excluded = self.store.failed_aggregates(0).await?;
        stats.blocked = excluded.len();
        let mut blocked: HashSet<AggregateId> = excluded.iter().copied().collect();

        for entry in self
            .store
            .get_pending_excluding(&excluded, self.config.batch_size)
            .await?
        {
            if blocked.contains(&entry.aggregate_id) {
                stats.held += 1;
                continue;
            }

            let Some(topic) = self.topics.topic_for(&entry.event_type) else {
                tracing::error!(
                    outbox_id = %entry.id,
                    event_type = %entry.event_type,
                    "No topic registered for event type"
                );
                let message = format!("no topic registered for {}", entry.event_type);
                self.store.mark_failed(entry.id, &message).await?;
                stats.failed += 1;
                blocked.insert(entry.aggregate_id);
                continue;
            };

            let result = match BusMessage::from_outbox(topic, &entry) {
                Ok(message) => self.bus.publish(message).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    if self.store.mark_published(entry.id).await? {
                        stats.published += 1;
                        metrics::counter!("outbox_events_published_total", "topic" => topic.to_string())
                            .increment(1);
                    } else {
                        stats.skipped += 1;
                    }
                }
                Err(e) => {
                    let retry_count = entry.retry_count + 1;
                    tracing::warn!(
                        outbox_id = %entry.id,
                        aggregate_id = %entry.aggregate_id,
                        event_type = %entry.event_type,
                        retry_count,
                        error = %e,
                        "Publish failed"
                    );
                    metrics::counter!("outbox_publish_failures_total", "topic" => topic.to_string())
                        .increment(1);
                    self.store.mark_failed(entry.id, &e.to_string()).await?;
                    stats.failed += 1;
                    blocked.insert(entry.aggregate_id);
                }
            }
        }

        metrics::histogram!("outbox_relay_tick_seconds").record(started.elapsed().as_secs_f64());
        if stats.published > 0 || stats.failed > 0 {
            tracing::debug!(?stats, "Relay tick complete");
        }
        Ok(stats)
    }

    /// Returns an exhausted `failed` row to `pending` for one more attempt.
    pub async fn reset_failed(&self, id: EventId) -> Result<bool, RelayError> {
        let reset = self.store.reset_to_pending(id).await?;
        if reset {
            tracing::info!(outbox_id = %id, "Outbox entry re-armed");
        }
        Ok(reset)
    }

    /// Ticks until `shutdown` turns true.
    ///
    /// A clean tick waits one poll interval, or not at all if the batch was
    /// full. Failing ticks back off exponentially.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = Backoff::new(self.config.min_backoff, self.config.max_backoff);
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Outbox relay started"
        );

        while !*shutdown.borrow() {
            let delay = match self.tick().await {
                Ok(stats) if stats.is_clean() => {
                    backoff.reset();
                    if stats.published + stats.skipped >= self.config.batch_size {
                        Duration::ZERO
                    } else {
                        self.config.poll_interval
                    }
                }
                Ok(_) => backoff.next_delay(),
                Err(e) => {
                    tracing::error!(error = %e, "Relay tick failed");
                    backoff.next_delay()
                }
            };

            tokio::select! {
                _ = shutdown.changed() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Outbox relay stopped");
    }

    /// Runs the relay on a background task.
    pub fn spawn(self) -> RelayHandle {
        let (shutdown, receiver) = watch::channel(false);
        let join = tokio::spawn(async move { self.run(receiver).await });
        RelayHandle { shutdown, join }
    }
}

/// Handle to a spawned relay.
pub struct RelayHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl RelayHandle {
    /// Stops the loop after the current tick and waits for it.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "Outbox relay task failed");
        }
    }
}
