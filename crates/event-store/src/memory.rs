use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventId, EventQuery, EventStoreError, NewEvent, OutboxEntry, OutboxStatus,
    Result, SortOrder, StoredEvent,
    store::{EventStore, OutboxStore},
};

#[derive(Default)]
struct Tables {
    events: Vec<StoredEvent>,
    outbox: Vec<OutboxEntry>,
    last_occurred: HashMap<AggregateId, DateTime<Utc>>,
}

impl Tables {
    /// Server clock, clamped so an aggregate's events never go back in time.
    fn next_timestamp(&mut self, aggregate_id: AggregateId) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_occurred.get(&aggregate_id) {
            Some(last) if *last >= now => *last + Duration::microseconds(1),
            _ => now,
        };
        self.last_occurred.insert(aggregate_id, ts);
        ts
    }

    fn entry_mut(&mut self, id: EventId) -> Result<&mut OutboxEntry> {
        self.outbox
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(EventStoreError::OutboxEntryNotFound(id))
    }

    fn transition(
        &mut self,
        id: EventId,
        to: OutboxStatus,
        update: impl FnOnce(&mut OutboxEntry),
    ) -> Result<bool> {
        let entry = self.entry_mut(id)?;
        if !entry.status.can_transition_to(to) {
            return Ok(false);
        }
        entry.status = to;
        update(entry);
        Ok(true)
    }
}

/// In-memory event log and outbox for testing.
///
/// Provides the same interface as the PostgreSQL implementation. Writes go
/// through [`InMemoryEventStore::commit`], which records the event store
/// rows and the outbox rows of a batch under one lock.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the events to the log and enqueues them in the outbox.
    pub async fn commit(&self, events: &[NewEvent]) -> Result<()> {
        let mut tables = self.tables.write().await;

        for event in events {
            if tables.events.iter().any(|e| e.id == event.event_id) {
                return Err(EventStoreError::InvalidEvent(format!(
                    "duplicate event id {}",
                    event.event_id
                )));
            }
        }

        for event in events {
            let occurred_at = tables.next_timestamp(event.aggregate_id);

            tables.outbox.push(OutboxEntry {
                id: event.event_id,
                aggregate_id: event.aggregate_id,
                aggregate_type: event.aggregate_type.clone(),
                event_type: event.event_type.clone(),
                event_version: event.event_version,
                payload: event.payload.clone(),
                status: OutboxStatus::Pending,
                retry_count: 0,
                created_at: occurred_at,
                published_at: None,
                error_message: None,
            });

            tables.events.push(StoredEvent {
                id: event.event_id,
                aggregate_id: event.aggregate_id,
                aggregate_type: event.aggregate_type.clone(),
                event_type: event.event_type.clone(),
                event_version: event.event_version,
                payload: event.payload.clone(),
                metadata: event.metadata.clone(),
                occurred_at,
            });
        }

        Ok(())
    }

    /// Returns every outbox row in insertion order.
    pub async fn outbox_entries(&self) -> Vec<OutboxEntry> {
        self.tables.read().await.outbox.clone()
    }

    /// Returns the total number of outbox rows.
    pub async fn outbox_count(&self) -> usize {
        self.tables.read().await.outbox.len()
    }

    /// Clears all events and outbox rows.
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        tables.events.clear();
        tables.outbox.clear();
        tables.last_occurred.clear();
    }

    async fn entries_with_status(&self, status: OutboxStatus, limit: usize) -> Vec<OutboxEntry> {
        // Insertion order is created_at order.
        self.tables
            .read()
            .await
            .outbox
            .iter()
            .filter(|e| e.status == status)
            .take(limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn query_events(&self, query: EventQuery) -> Result<Vec<StoredEvent>> {
        let tables = self.tables.read().await;
        let mut events: Vec<_> = tables
            .events
            .iter()
            .filter(|e| {
                if let Some(id) = query.aggregate_id
                    && e.aggregate_id != id
                {
                    return false;
                }
                if let Some(ref agg_type) = query.aggregate_type
                    && &e.aggregate_type != agg_type
                {
                    return false;
                }
                if let Some(ref types) = query.event_types
                    && !types.contains(&e.event_type)
                {
                    return false;
                }
                if let Some(from) = query.from_timestamp
                    && e.occurred_at < from
                {
                    return false;
                }
                if let Some(to) = query.to_timestamp
                    && e.occurred_at >= to
                {
                    return false;
                }
                true
            })
            .cloned()
            .collect();

        // Stable sort keeps append order for equal timestamps.
        events.sort_by_key(|e| e.occurred_at);
        if query.order == SortOrder::Descending {
            events.reverse();
        }

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(events.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_events(&self) -> Result<u64> {
        Ok(self.tables.read().await.events.len() as u64)
    }
}

#[async_trait]
impl OutboxStore for InMemoryEventStore {
    async fn get_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        Ok(self.entries_with_status(OutboxStatus::Pending, limit).await)
    }

    async fn get_pending_excluding(
        &self,
        excluded: &[AggregateId],
        limit: usize,
    ) -> Result<Vec<OutboxEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .outbox
            .iter()
            .filter(|e| e.status == OutboxStatus::Pending && !excluded.contains(&e.aggregate_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_failed(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        Ok(self.entries_with_status(OutboxStatus::Failed, limit).await)
    }

    async fn get_retryable(&self, max_retries: u32, limit: usize) -> Result<Vec<OutboxEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .outbox
            .iter()
            .filter(|e| e.status == OutboxStatus::Failed && !e.retries_exhausted(max_retries))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn failed_aggregates(&self, min_retry_count: u32) -> Result<Vec<AggregateId>> {
        let tables = self.tables.read().await;
        let mut ids: Vec<AggregateId> = Vec::new();
        for entry in &tables.outbox {
            if entry.status == OutboxStatus::Failed
                && i64::from(entry.retry_count) >= i64::from(min_retry_count)
                && !ids.contains(&entry.aggregate_id)
            {
                ids.push(entry.aggregate_id);
            }
        }
        Ok(ids)
    }

    async fn get(&self, id: EventId) -> Result<Option<OutboxEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.outbox.iter().find(|e| e.id == id).cloned())
    }

    async fn mark_published(&self, id: EventId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        tables.transition(id, OutboxStatus::Published, |entry| {
            entry.published_at = Some(Utc::now());
        })
    }

    async fn mark_failed(&self, id: EventId, error_message: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        tables.transition(id, OutboxStatus::Failed, |entry| {
            entry.error_message = Some(error_message.to_string());
            entry.retry_count += 1;
        })
    }

    async fn reset_to_pending(&self, id: EventId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        tables.transition(id, OutboxStatus::Pending, |entry| {
            entry.error_message = None;
        })
    }

    async fn increment_retry(&self, id: EventId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.entry_mut(id)?.retry_count += 1;
        Ok(())
    }

    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables.outbox.iter().filter(|e| e.status == status).count() as u64)
    }
}
