//! Persistence for the domain-event delivery pipeline.
//!
//! Two tables live side by side in every service database:
//! - `event_store`: the append-only log of everything that happened
//! - `outbox`: the events that still have to reach the message bus
//!
//! Both rows for an event are written inside the caller's transaction
//! (see [`postgres::append_event`] and [`postgres::enqueue_outbox`]) and
//! share one [`EventId`].

pub mod error;
pub mod event;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod query;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventId, NewEvent, NewEventBuilder, StoredEvent};
pub use memory::InMemoryEventStore;
pub use outbox::{OutboxEntry, OutboxStatus};
pub use postgres::PostgresEventStore;
pub use query::{EventQuery, SortOrder};
pub use store::{EventStore, EventStoreExt, OutboxStore};
