//! Rebuilds aggregates from the event store.

use common::AggregateId;
use event_store::{EventStore, EventStoreExt};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::chat::Message;
use crate::error::DomainError;
use crate::order::Order;
use crate::product::Product;
use crate::user::User;

/// Read-only view over the event log for audit and replay.
pub struct EventHistory<S: EventStore> {
    store: S,
}

impl<S: EventStore> EventHistory<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Applies every stored event of the aggregate, oldest first, to an
    /// empty instance. Returns `None` when nothing was recorded.
    #[tracing::instrument(skip(self), fields(aggregate_type = A::aggregate_type()))]
    pub async fn replay<A: Aggregate>(&self, id: AggregateId) -> Result<Option<A>, DomainError> {
        let stored = self.store.get_by_aggregate(id, A::aggregate_type()).await?;
        if stored.is_empty() {
            return Ok(None);
        }

        let mut events = Vec::with_capacity(stored.len());
        for row in stored {
            let event = A::Event::from_payload(&row.event_type, row.payload)
                .map_err(event_store::EventStoreError::from)?;
            events.push(event);
        }
        Ok(Some(A::replay(&events)))
    }

    pub async fn replay_user(&self, id: AggregateId) -> Result<Option<User>, DomainError> {
        self.replay(id).await
    }

    pub async fn replay_message(&self, id: AggregateId) -> Result<Option<Message>, DomainError> {
        self.replay(id).await
    }

    pub async fn replay_product(&self, id: AggregateId) -> Result<Option<Product>, DomainError> {
        self.replay(id).await
    }

    pub async fn replay_order(&self, id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.replay(id).await
    }
}
