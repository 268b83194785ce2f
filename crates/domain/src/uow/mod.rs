//! Unit of Work: one transaction around aggregate writes, outbox inserts and
//! event store appends.
//!
//! A unit of work hands out repository handles that borrow it, so no handle
//! can be used once the unit of work has been committed, rolled back or
//! dropped. Dropping an uncommitted unit of work rolls it back.

mod memory;
mod postgres;

pub use memory::{Fault, InMemoryDatabase, InMemoryUnitOfWork};
pub use postgres::{PgUnitOfWork, PgUnitOfWorkFactory};

use async_trait::async_trait;
use common::AggregateId;
use event_store::{EventStoreError, NewEvent};
use thiserror::Error;

use crate::aggregate::DomainEvent;
use crate::context::CommandContext;
use crate::repository::{MessageRepository, OrderRepository, ProductRepository, UserRepository};

/// Boxed error used as the source of infrastructure failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Lifecycle of a unit of work's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
        }
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors raised by a unit of work and the repositories bound to it.
#[derive(Debug, Error)]
pub enum UnitOfWorkError {
    #[error("Failed to begin transaction: {0}")]
    TransactionBeginFailed(#[source] BoxError),

    #[error("Failed to commit transaction: {0}")]
    CommitFailed(#[source] BoxError),

    #[error("Failed to roll back transaction: {0}")]
    RollbackFailed(#[source] BoxError),

    #[error("Failed to write outbox entry: {0}")]
    OutboxWriteFailed(#[source] BoxError),

    #[error("Failed to append to event store: {0}")]
    EventStoreWriteFailed(#[source] BoxError),

    #[error("Failed to serialize event payload: {0}")]
    PayloadSerializationFailed(#[source] BoxError),

    #[error("Repository error: {0}")]
    Repository(#[source] BoxError),

    /// The aggregate changed since it was loaded.
    #[error(
        "Concurrency conflict for {aggregate_type} {aggregate_id}: expected version {expected}"
    )]
    ConcurrencyConflict {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
        expected: i64,
    },

    /// The unit of work was used after commit or rollback.
    #[error("Unit of work is already {0}")]
    Closed(TransactionState),
}

impl UnitOfWorkError {
    pub(crate) fn repository(err: impl Into<BoxError>) -> Self {
        UnitOfWorkError::Repository(err.into())
    }
}

/// A transactional scope providing repositories and the event write path.
#[async_trait]
pub trait UnitOfWork: Send {
    /// User repository bound to this transaction.
    fn users(&mut self) -> Result<Box<dyn UserRepository + '_>, UnitOfWorkError>;

    /// Message repository bound to this transaction.
    fn messages(&mut self) -> Result<Box<dyn MessageRepository + '_>, UnitOfWorkError>;

    /// Product repository bound to this transaction.
    fn products(&mut self) -> Result<Box<dyn ProductRepository + '_>, UnitOfWorkError>;

    /// Order repository bound to this transaction.
    fn orders(&mut self) -> Result<Box<dyn OrderRepository + '_>, UnitOfWorkError>;

    /// Writes a `pending` outbox row and an event store row for each event.
    ///
    /// Events without metadata get the command context's metadata.
    async fn save_events(&mut self, events: &[NewEvent]) -> Result<(), UnitOfWorkError>;

    /// Commits the transaction.
    ///
    /// Idempotent once committed and a no-op after a rollback.
    async fn commit(&mut self) -> Result<(), UnitOfWorkError>;

    /// Rolls the transaction back unless it already ended.
    async fn rollback(&mut self) -> Result<(), UnitOfWorkError>;

    fn state(&self) -> TransactionState;
}

/// Starts units of work.
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    type Uow: UnitOfWork;

    async fn begin(&self, ctx: &CommandContext) -> Result<Self::Uow, UnitOfWorkError>;
}

/// Converts domain events into their persistence form.
pub fn encode_events<E: DomainEvent>(events: &[E]) -> Result<Vec<NewEvent>, UnitOfWorkError> {
    events
        .iter()
        .map(|event| {
            event.to_new_event().map_err(|e| match e {
                EventStoreError::Serialization(e) => {
                    UnitOfWorkError::PayloadSerializationFailed(Box::new(e))
                }
                other => UnitOfWorkError::PayloadSerializationFailed(Box::new(other)),
            })
        })
        .collect()
}

/// Extension trait for recording typed domain events.
#[async_trait]
pub trait UnitOfWorkExt: UnitOfWork {
    /// Encodes the events and saves them through [`UnitOfWork::save_events`].
    ///
    /// An encoding failure refuses the whole batch before anything is written.
    async fn record_events<E: DomainEvent>(&mut self, events: &[E]) -> Result<(), UnitOfWorkError> {
        let pending = encode_events(events)?;
        self.save_events(&pending).await
    }
}

impl<T: UnitOfWork + ?Sized> UnitOfWorkExt for T {}

pub(crate) fn ensure_active(state: TransactionState) -> Result<(), UnitOfWorkError> {
    match state {
        TransactionState::Active => Ok(()),
        closed => Err(UnitOfWorkError::Closed(closed)),
    }
}
