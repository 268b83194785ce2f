//! In-memory unit of work for tests and local runs.
//!
//! Writes are staged inside the unit of work and applied to the shared
//! tables on commit, after the optimistic version checks pass. Events go to
//! an [`InMemoryEventStore`] in the same step, so aggregate rows, event store
//! rows and outbox rows appear together or not at all.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::AggregateId;
use event_store::{InMemoryEventStore, NewEvent};
use tokio::sync::RwLock;

use super::{
    TransactionState, UnitOfWork, UnitOfWorkError, UnitOfWorkFactory, ensure_active,
};
use crate::aggregate::Aggregate;
use crate::chat::Message;
use crate::context::CommandContext;
use crate::order::Order;
use crate::product::Product;
use crate::repository::{MessageRepository, OrderRepository, ProductRepository, UserRepository};
use crate::user::{Email, User};

/// Failure points that can be switched on for tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Begin,
    Commit,
    Rollback,
    OutboxWrite,
    EventStoreWrite,
}

#[derive(Default)]
struct Faults {
    begin: AtomicBool,
    commit: AtomicBool,
    rollback: AtomicBool,
    outbox_write: AtomicBool,
    event_store_write: AtomicBool,
    write_delay_ms: AtomicU64,
}

impl Faults {
    fn flag(&self, fault: Fault) -> &AtomicBool {
        match fault {
            Fault::Begin => &self.begin,
            Fault::Commit => &self.commit,
            Fault::Rollback => &self.rollback,
            Fault::OutboxWrite => &self.outbox_write,
            Fault::EventStoreWrite => &self.event_store_write,
        }
    }

    fn is_set(&self, fault: Fault) -> bool {
        self.flag(fault).load(Ordering::SeqCst)
    }

    fn write_delay(&self) -> Duration {
        Duration::from_millis(self.write_delay_ms.load(Ordering::SeqCst))
    }
}

#[derive(Default)]
struct Tables {
    users: HashMap<AggregateId, User>,
    messages: HashMap<AggregateId, Message>,
    products: HashMap<AggregateId, Product>,
    orders: HashMap<AggregateId, Order>,
}

impl Tables {
    fn users(&self) -> &HashMap<AggregateId, User> {
        &self.users
    }

    fn messages(&self) -> &HashMap<AggregateId, Message> {
        &self.messages
    }

    fn products(&self) -> &HashMap<AggregateId, Product> {
        &self.products
    }

    fn orders(&self) -> &HashMap<AggregateId, Order> {
        &self.orders
    }
}

/// Shared in-memory database: aggregate tables plus the event store and
/// outbox.
#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    tables: Arc<RwLock<Tables>>,
    events: InMemoryEventStore,
    faults: Arc<Faults>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// The event store and outbox written by committed units of work.
    pub fn event_store(&self) -> &InMemoryEventStore {
        &self.events
    }

    /// Makes the given operation fail until [`heal`](Self::heal) is called.
    pub fn inject(&self, fault: Fault) {
        self.faults.flag(fault).store(true, Ordering::SeqCst);
    }

    pub fn heal(&self, fault: Fault) {
        self.faults.flag(fault).store(false, Ordering::SeqCst);
    }

    /// Delays every `save_events` call.
    pub fn set_write_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.faults.write_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Committed state of a user.
    pub async fn user(&self, id: AggregateId) -> Option<User> {
        self.tables.read().await.users.get(&id).cloned()
    }

    /// Committed state of a message.
    pub async fn message(&self, id: AggregateId) -> Option<Message> {
        self.tables.read().await.messages.get(&id).cloned()
    }

    /// Committed state of a product.
    pub async fn product(&self, id: AggregateId) -> Option<Product> {
        self.tables.read().await.products.get(&id).cloned()
    }

    /// Committed state of an order.
    pub async fn order(&self, id: AggregateId) -> Option<Order> {
        self.tables.read().await.orders.get(&id).cloned()
    }
}

#[async_trait]
impl UnitOfWorkFactory for InMemoryDatabase {
    type Uow = InMemoryUnitOfWork;

    async fn begin(&self, ctx: &CommandContext) -> Result<InMemoryUnitOfWork, UnitOfWorkError> {
        if self.faults.is_set(Fault::Begin) {
            return Err(UnitOfWorkError::TransactionBeginFailed(
                "injected begin failure".into(),
            ));
        }
        Ok(InMemoryUnitOfWork {
            db: self.clone(),
            state: TransactionState::Active,
            staged: Staged::default(),
            metadata: ctx.metadata(),
        })
    }
}

/// Rows written in one unit of work plus the version each had when first
/// saved.
struct StagedTable<A> {
    rows: HashMap<AggregateId, A>,
    base_versions: HashMap<AggregateId, i64>,
}

impl<A> Default for StagedTable<A> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            base_versions: HashMap::new(),
        }
    }
}

fn conflict<A: Aggregate>(aggregate_id: AggregateId, expected: i64) -> UnitOfWorkError {
    UnitOfWorkError::ConcurrencyConflict {
        aggregate_type: A::aggregate_type(),
        aggregate_id,
        expected,
    }
}

impl<A: Aggregate + Clone> StagedTable<A> {
    fn get(&self, committed: &HashMap<AggregateId, A>, id: AggregateId) -> Option<A> {
        self.rows.get(&id).or_else(|| committed.get(&id)).cloned()
    }

    fn stage(
        &mut self,
        committed: &HashMap<AggregateId, A>,
        aggregate: &mut A,
    ) -> Result<(), UnitOfWorkError> {
        let id = aggregate.id();
        let expected = aggregate.version();
        let current = self
            .rows
            .get(&id)
            .or_else(|| committed.get(&id))
            .map_or(0, A::version);
        if current != expected {
            return Err(conflict::<A>(id, expected));
        }

        self.base_versions.entry(id).or_insert(expected);
        aggregate.set_version(expected + 1);
        let mut row = aggregate.clone();
        row.clear_events();
        self.rows.insert(id, row);
        Ok(())
    }

    /// Fails if another unit of work committed one of our rows meanwhile.
    fn check(&self, committed: &HashMap<AggregateId, A>) -> Result<(), UnitOfWorkError> {
        for (id, base) in &self.base_versions {
            if committed.get(id).map_or(0, A::version) != *base {
                return Err(conflict::<A>(*id, *base));
            }
        }
        Ok(())
    }

    fn apply_to(self, committed: &mut HashMap<AggregateId, A>) {
        committed.extend(self.rows);
    }
}

#[derive(Default)]
struct Staged {
    users: StagedTable<User>,
    messages: StagedTable<Message>,
    products: StagedTable<Product>,
    orders: StagedTable<Order>,
    events: Vec<NewEvent>,
}

impl Staged {
    fn is_empty(&self) -> bool {
        self.users.rows.is_empty()
            && self.messages.rows.is_empty()
            && self.products.rows.is_empty()
            && self.orders.rows.is_empty()
            && self.events.is_empty()
    }

    fn check(&self, tables: &Tables) -> Result<(), UnitOfWorkError> {
        self.users.check(&tables.users)?;
        self.messages.check(&tables.messages)?;
        self.products.check(&tables.products)?;
        self.orders.check(&tables.orders)?;

        for user in self.users.rows.values() {
            let taken = tables
                .users
                .values()
                .any(|other| other.id() != user.id() && other.email() == user.email());
            if taken {
                return Err(UnitOfWorkError::repository(format!(
                    "duplicate key value violates unique constraint users_email_unique: {}",
                    user.email()
                )));
            }
        }
        Ok(())
    }

    fn apply_to(self, tables: &mut Tables) {
        self.users.apply_to(&mut tables.users);
        self.messages.apply_to(&mut tables.messages);
        self.products.apply_to(&mut tables.products);
        self.orders.apply_to(&mut tables.orders);
    }
}

/// Unit of work over an [`InMemoryDatabase`].
pub struct InMemoryUnitOfWork {
    db: InMemoryDatabase,
    state: TransactionState,
    staged: Staged,
    metadata: serde_json::Value,
}

/// Repository handle over one staged table.
struct InMemoryRepository<'u, A> {
    tables: &'u RwLock<Tables>,
    select: fn(&Tables) -> &HashMap<AggregateId, A>,
    staged: &'u mut StagedTable<A>,
}

impl<A: Aggregate + Clone> InMemoryRepository<'_, A> {
    async fn find_row(&self, id: AggregateId) -> Option<A> {
        let tables = self.tables.read().await;
        self.staged.get((self.select)(&tables), id)
    }

    async fn save_row(&mut self, aggregate: &mut A) -> Result<(), UnitOfWorkError> {
        let tables = self.tables.read().await;
        self.staged.stage((self.select)(&tables), aggregate)
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository<'_, User> {
    async fn find(&mut self, id: AggregateId) -> Result<Option<User>, UnitOfWorkError> {
        Ok(self.find_row(id).await)
    }

    async fn find_by_email(&mut self, email: &Email) -> Result<Option<User>, UnitOfWorkError> {
        if let Some(user) = self.staged.rows.values().find(|u| u.email() == email) {
            return Ok(Some(user.clone()));
        }
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email() == email && !self.staged.rows.contains_key(&u.id()))
            .cloned())
    }

    async fn save(&mut self, user: &mut User) -> Result<(), UnitOfWorkError> {
        self.save_row(user).await
    }
}

#[async_trait]
impl MessageRepository for InMemoryRepository<'_, Message> {
    async fn find(&mut self, id: AggregateId) -> Result<Option<Message>, UnitOfWorkError> {
        Ok(self.find_row(id).await)
    }

    async fn save(&mut self, message: &mut Message) -> Result<(), UnitOfWorkError> {
        self.save_row(message).await
    }
}

#[async_trait]
impl ProductRepository for InMemoryRepository<'_, Product> {
    async fn find(&mut self, id: AggregateId) -> Result<Option<Product>, UnitOfWorkError> {
        Ok(self.find_row(id).await)
    }

    async fn save(&mut self, product: &mut Product) -> Result<(), UnitOfWorkError> {
        self.save_row(product).await
    }
}

#[async_trait]
impl OrderRepository for InMemoryRepository<'_, Order> {
    async fn find(&mut self, id: AggregateId) -> Result<Option<Order>, UnitOfWorkError> {
        Ok(self.find_row(id).await)
    }

    async fn save(&mut self, order: &mut Order) -> Result<(), UnitOfWorkError> {
        self.save_row(order).await
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    fn users(&mut self) -> Result<Box<dyn UserRepository + '_>, UnitOfWorkError> {
        ensure_active(self.state)?;
        Ok(Box::new(InMemoryRepository {
            tables: &self.db.tables,
            select: Tables::users,
            staged: &mut self.staged.users,
        }))
    }

    fn messages(&mut self) -> Result<Box<dyn MessageRepository + '_>, UnitOfWorkError> {
        ensure_active(self.state)?;
        Ok(Box::new(InMemoryRepository {
            tables: &self.db.tables,
            select: Tables::messages,
            staged: &mut self.staged.messages,
        }))
    }

    fn products(&mut self) -> Result<Box<dyn ProductRepository + '_>, UnitOfWorkError> {
        ensure_active(self.state)?;
        Ok(Box::new(InMemoryRepository {
            tables: &self.db.tables,
            select: Tables::products,
            staged: &mut self.staged.products,
        }))
    }

    fn orders(&mut self) -> Result<Box<dyn OrderRepository + '_>, UnitOfWorkError> {
        ensure_active(self.state)?;
        Ok(Box::new(InMemoryRepository {
            tables: &self.db.tables,
            select: Tables::orders,
            staged: &mut self.staged.orders,
        }))
    }

    async fn save_events(&mut self, events: &[NewEvent]) -> Result<(), UnitOfWorkError> {
        ensure_active(self.state)?;

        let delay = self.db.faults.write_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.db.faults.is_set(Fault::OutboxWrite) {
            return Err(UnitOfWorkError::OutboxWriteFailed(
                "injected outbox write failure".into(),
            ));
        }
        if self.db.faults.is_set(Fault::EventStoreWrite) {
            return Err(UnitOfWorkError::EventStoreWriteFailed(
                "injected event store write failure".into(),
            ));
        }

        self.staged.events.extend(
            events
                .iter()
                .cloned()
                .map(|e| e.with_default_metadata(Some(&self.metadata))),
        );
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), UnitOfWorkError> {
        if self.state != TransactionState::Active {
            return Ok(());
        }

        let staged = std::mem::take(&mut self.staged);
        if self.db.faults.is_set(Fault::Commit) {
            self.state = TransactionState::RolledBack;
            return Err(UnitOfWorkError::CommitFailed(
                "injected commit failure".into(),
            ));
        }

        let mut tables = self.db.tables.write().await;
        if let Err(e) = staged.check(&tables) {
            self.state = TransactionState::RolledBack;
            return Err(e);
        }
        if let Err(e) = self.db.events.commit(&staged.events).await {
            self.state = TransactionState::RolledBack;
            return Err(UnitOfWorkError::CommitFailed(Box::new(e)));
        }
        staged.apply_to(&mut tables);
        self.state = TransactionState::Committed;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), UnitOfWorkError> {
        if self.state != TransactionState::Active {
            return Ok(());
        }

        self.staged = Staged::default();
        self.state = TransactionState::RolledBack;
        if self.db.faults.is_set(Fault::Rollback) {
            return Err(UnitOfWorkError::RollbackFailed(
                "injected rollback failure".into(),
            ));
        }
        Ok(())
    }

    fn state(&self) -> TransactionState {
        self.state
    }
}

impl Drop for InMemoryUnitOfWork {
    fn drop(&mut self) {
        if self.state == TransactionState::Active && !self.staged.is_empty() {
            tracing::debug!("unit of work dropped before commit, discarding staged writes");
        }
    }
}
