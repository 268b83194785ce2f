use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{AggregateId, EventId, EventQuery, OutboxEntry, OutboxStatus, Result, StoredEvent};

/// Read side of the append-only event log.
///
/// Appends only ever happen inside a unit of work; this trait covers the
/// queries used for audit and replay. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Retrieves events matching a query.
    async fn query_events(&self, query: EventQuery) -> Result<Vec<StoredEvent>>;

    /// Returns the total number of events in the log.
    async fn count_events(&self) -> Result<u64>;
}

/// Extension trait providing the standard event log queries.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Retrieves all events of one aggregate, oldest first.
    ///
    /// This is the order replay must apply them in.
    async fn get_by_aggregate(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
    ) -> Result<Vec<StoredEvent>> {
        self.query_events(EventQuery::for_aggregate(aggregate_id, aggregate_type))
            .await
    }

    /// Retrieves the most recent events of a type, newest first.
    async fn get_by_type(&self, event_type: &str, limit: usize) -> Result<Vec<StoredEvent>> {
        self.query_events(
            EventQuery::for_event_type(event_type)
                .newest_first()
                .limit(limit),
        )
        .await
    }

    /// Retrieves events in `[start, end)`, oldest first.
    async fn get_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<StoredEvent>> {
        self.query_events(
            EventQuery::new()
                .from_timestamp(start)
                .to_timestamp(end)
                .limit(limit),
        )
        .await
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Relay-facing access to the outbox.
///
/// Rows are created inside a unit of work; everything here runs outside of
/// one. Transitions follow [`OutboxStatus::can_transition_to`]: they return
/// `Ok(true)` when the row moved, `Ok(false)` when it was no longer in the
/// source state (another relay got there first), and
/// `OutboxEntryNotFound` when the id is unknown.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Returns `pending` rows, oldest first.
    async fn get_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>>;

    /// Returns `pending` rows of aggregates not in `excluded`, oldest first.
    async fn get_pending_excluding(
        &self,
        excluded: &[AggregateId],
        limit: usize,
    ) -> Result<Vec<OutboxEntry>>;

    /// Returns `failed` rows, oldest first.
    async fn get_failed(&self, limit: usize) -> Result<Vec<OutboxEntry>>;

    /// Returns `failed` rows with `retry_count < max_retries`, oldest first.
    async fn get_retryable(&self, max_retries: u32, limit: usize) -> Result<Vec<OutboxEntry>>;

    /// Distinct aggregates owning a `failed` row with `retry_count >= min_retry_count`.
    async fn failed_aggregates(&self, min_retry_count: u32) -> Result<Vec<AggregateId>>;

    /// Loads a single row.
    async fn get(&self, id: EventId) -> Result<Option<OutboxEntry>>;

    /// `pending -> published`, recording `published_at`.
    async fn mark_published(&self, id: EventId) -> Result<bool>;

    /// `pending -> failed`, recording the error and incrementing `retry_count`.
    async fn mark_failed(&self, id: EventId, error_message: &str) -> Result<bool>;

    /// `failed -> pending`, clearing the error.
    async fn reset_to_pending(&self, id: EventId) -> Result<bool>;

    /// Increments `retry_count` without changing the status.
    async fn increment_retry(&self, id: EventId) -> Result<()>;

    /// Counts rows in a given status.
    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64>;
}
