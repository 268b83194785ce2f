//! PostgreSQL unit of work over one pool transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::NewEvent;
use event_store::postgres::{append_event, enqueue_outbox};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use super::{
    TransactionState, UnitOfWork, UnitOfWorkError, UnitOfWorkFactory, ensure_active,
};
use crate::aggregate::Aggregate;
use crate::chat::Message;
use crate::context::CommandContext;
use crate::order::{Money, Order, OrderItem, OrderStatus};
use crate::product::Product;
use crate::repository::{MessageRepository, OrderRepository, ProductRepository, UserRepository};
use crate::user::{Email, User};

/// Starts [`PgUnitOfWork`]s on a connection pool.
#[derive(Clone)]
pub struct PgUnitOfWorkFactory {
    pool: PgPool,
}

impl PgUnitOfWorkFactory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UnitOfWorkFactory for PgUnitOfWorkFactory {
    type Uow = PgUnitOfWork;

    async fn begin(&self, ctx: &CommandContext) -> Result<PgUnitOfWork, UnitOfWorkError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| UnitOfWorkError::TransactionBeginFailed(Box::new(e)))?;

        Ok(PgUnitOfWork {
            tx: Some(tx),
            state: TransactionState::Active,
            metadata: ctx.metadata(),
        })
    }
}

/// Unit of work holding an open PostgreSQL transaction.
///
/// If it is dropped while active, the transaction is rolled back when the
/// connection returns to the pool.
pub struct PgUnitOfWork {
    tx: Option<Transaction<'static, Postgres>>,
    state: TransactionState,
    metadata: serde_json::Value,
}

impl PgUnitOfWork {
    fn conn(&mut self) -> Result<&mut PgConnection, UnitOfWorkError> {
        ensure_active(self.state)?;
        self.tx
            .as_deref_mut()
            .ok_or(UnitOfWorkError::Closed(self.state))
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    fn users(&mut self) -> Result<Box<dyn UserRepository + '_>, UnitOfWorkError> {
        Ok(Box::new(PgUserRepository { conn: self.conn()? }))
    }

    fn messages(&mut self) -> Result<Box<dyn MessageRepository + '_>, UnitOfWorkError> {
        Ok(Box::new(PgMessageRepository { conn: self.conn()? }))
    }

    fn products(&mut self) -> Result<Box<dyn ProductRepository + '_>, UnitOfWorkError> {
        Ok(Box::new(PgProductRepository { conn: self.conn()? }))
    }

    fn orders(&mut self) -> Result<Box<dyn OrderRepository + '_>, UnitOfWorkError> {
        Ok(Box::new(PgOrderRepository { conn: self.conn()? }))
    }

    #[tracing::instrument(skip_all, fields(count = events.len()))]
    async fn save_events(&mut self, events: &[NewEvent]) -> Result<(), UnitOfWorkError> {
        let events: Vec<NewEvent> = events
            .iter()
            .cloned()
            .map(|e| e.with_default_metadata(Some(&self.metadata)))
            .collect();
        let conn = self.conn()?;

        for event in &events {
            enqueue_outbox(&mut *conn, event)
                .await
                .map_err(|e| UnitOfWorkError::OutboxWriteFailed(Box::new(e)))?;
            append_event(&mut *conn, event)
                .await
                .map_err(|e| UnitOfWorkError::EventStoreWriteFailed(Box::new(e)))?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), UnitOfWorkError> {
        if self.state != TransactionState::Active {
            return Ok(());
        }
        let Some(tx) = self.tx.take() else {
            self.state = TransactionState::RolledBack;
            return Ok(());
        };

        match tx.commit().await {
            Ok(()) => {
                self.state = TransactionState::Committed;
                Ok(())
            }
            Err(e) => {
                self.state = TransactionState::RolledBack;
                Err(UnitOfWorkError::CommitFailed(Box::new(e)))
            }
        }
    }

    async fn rollback(&mut self) -> Result<(), UnitOfWorkError> {
        if self.state != TransactionState::Active {
            return Ok(());
        }
        self.state = TransactionState::RolledBack;

        match self.tx.take() {
            Some(tx) => tx
                .rollback()
                .await
                .map_err(|e| UnitOfWorkError::RollbackFailed(Box::new(e))),
            None => Ok(()),
        }
    }

    fn state(&self) -> TransactionState {
        self.state
    }
}

impl Drop for PgUnitOfWork {
    fn drop(&mut self) {
        if self.state == TransactionState::Active && self.tx.is_some() {
            tracing::debug!("unit of work dropped before commit, rolling back");
        }
    }
}

fn db_err(e: sqlx::Error) -> UnitOfWorkError {
    UnitOfWorkError::repository(e)
}

/// Turns a zero-row write into a version conflict.
fn check_written<A: Aggregate>(
    rows_affected: u64,
    aggregate: &mut A,
) -> Result<(), UnitOfWorkError> {
    if rows_affected == 0 {
        return Err(UnitOfWorkError::ConcurrencyConflict {
            aggregate_type: A::aggregate_type(),
            aggregate_id: aggregate.id(),
            expected: aggregate.version(),
        });
    }
    aggregate.set_version(aggregate.version() + 1);
    Ok(())
}

fn to_u32(value: i64, column: &str) -> Result<u32, UnitOfWorkError> {
    u32::try_from(value)
        .map_err(|_| UnitOfWorkError::repository(format!("{column} out of range: {value}")))
}

struct PgUserRepository<'t> {
    conn: &'t mut PgConnection,
}

const USER_COLUMNS: &str = "id, email, name, password_hash, created_at, updated_at, version";

fn row_to_user(row: PgRow) -> Result<User, sqlx::Error> {
    Ok(User::restore(
        AggregateId::from_uuid(row.try_get::<Uuid, _>("id")?),
        row.try_get("version")?,
        row.try_get("email")?,
        row.try_get("name")?,
        row.try_get("password_hash")?,
        row.try_get::<DateTime<Utc>, _>("created_at")?,
        row.try_get::<DateTime<Utc>, _>("updated_at")?,
    ))
}

#[async_trait]
impl UserRepository for PgUserRepository<'_> {
    async fn find(&mut self, id: AggregateId) -> Result<Option<User>, UnitOfWorkError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(db_err)?;
        row.map(row_to_user).transpose().map_err(db_err)
    }

    async fn find_by_email(&mut self, email: &Email) -> Result<Option<User>, UnitOfWorkError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query(&sql)
            .bind(email.as_str())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(db_err)?;
        row.map(row_to_user).transpose().map_err(db_err)
    }

    async fn save(&mut self, user: &mut User) -> Result<(), UnitOfWorkError> {
        let result = if user.version() == 0 {
            sqlx::query(
                r#"
                INSERT INTO users (id, email, name, password_hash, created_at, updated_at, version)
                VALUES ($1, $2, $3, $4, $5, $6, 1)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(user.id().as_uuid())
            .bind(user.email().as_str())
            .bind(user.name())
            .bind(user.password_hash())
            .bind(user.created_at())
            .bind(user.updated_at())
            .execute(&mut *self.conn)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE users
                SET email = $2, name = $3, password_hash = $4, updated_at = $5, version = version + 1
                WHERE id = $1 AND version = $6
                "#,
            )
            .bind(user.id().as_uuid())
            .bind(user.email().as_str())
            .bind(user.name())
            .bind(user.password_hash())
            .bind(user.updated_at())
            .bind(user.version())
            .execute(&mut *self.conn)
            .await
        }
        .map_err(db_err)?;

        check_written(result.rows_affected(), user)
    }
}

struct PgMessageRepository<'t> {
    conn: &'t mut PgConnection,
}

#[async_trait]
impl MessageRepository for PgMessageRepository<'_> {
    async fn find(&mut self, id: AggregateId) -> Result<Option<Message>, UnitOfWorkError> {
        let row = sqlx::query(
            r#"
            SELECT id, sender_id, receiver_id, content, created_at, read_at, version
            FROM messages WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let read = || -> Result<Message, sqlx::Error> {
            Ok(Message::restore(
                AggregateId::from_uuid(row.try_get::<Uuid, _>("id")?),
                row.try_get("version")?,
                AggregateId::from_uuid(row.try_get::<Uuid, _>("sender_id")?),
                AggregateId::from_uuid(row.try_get::<Uuid, _>("receiver_id")?),
                row.try_get("content")?,
                row.try_get("created_at")?,
                row.try_get("read_at")?,
            ))
        };
        read().map(Some).map_err(db_err)
    }

    async fn save(&mut self, message: &mut Message) -> Result<(), UnitOfWorkError> {
        let result = if message.version() == 0 {
            sqlx::query(
                r#"
                INSERT INTO messages (id, sender_id, receiver_id, content, created_at, read_at, version)
                VALUES ($1, $2, $3, $4, $5, $6, 1)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(message.id().as_uuid())
            .bind(message.sender_id().as_uuid())
            .bind(message.receiver_id().as_uuid())
            .bind(message.content())
            .bind(message.created_at())
            .bind(message.read_at())
            .execute(&mut *self.conn)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE messages
                SET content = $2, read_at = $3, version = version + 1
                WHERE id = $1 AND version = $4
                "#,
            )
            .bind(message.id().as_uuid())
            .bind(message.content())
            .bind(message.read_at())
            .bind(message.version())
            .execute(&mut *self.conn)
            .await
        }
        .map_err(db_err)?;

        check_written(result.rows_affected(), message)
    }
}

struct PgProductRepository<'t> {
    conn: &'t mut PgConnection,
}

#[async_trait]
impl ProductRepository for PgProductRepository<'_> {
    async fn find(&mut self, id: AggregateId) -> Result<Option<Product>, UnitOfWorkError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, price, stock, created_at, updated_at, version
            FROM products WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let stock = to_u32(row.try_get("stock").map_err(db_err)?, "stock")?;
        let read = || -> Result<Product, sqlx::Error> {
            Ok(Product::restore(
                AggregateId::from_uuid(row.try_get::<Uuid, _>("id")?),
                row.try_get("version")?,
                row.try_get("name")?,
                row.try_get("description")?,
                Money::from_cents(row.try_get("price")?),
                stock,
                row.try_get("created_at")?,
                row.try_get("updated_at")?,
            ))
        };
        read().map(Some).map_err(db_err)
    }

    async fn save(&mut self, product: &mut Product) -> Result<(), UnitOfWorkError> {
        let result = if product.version() == 0 {
            sqlx::query(
                r#"
                INSERT INTO products (id, name, description, price, stock, created_at, updated_at, version)
                VALUES ($1, $2, $3, $4, $5, $6, $7, 1)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(product.id().as_uuid())
            .bind(product.name())
            .bind(product.description())
            .bind(product.price().cents())
            .bind(i64::from(product.stock()))
            .bind(product.created_at())
            .bind(product.updated_at())
            .execute(&mut *self.conn)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE products
                SET name = $2, description = $3, price = $4, stock = $5, updated_at = $6,
                    version = version + 1
                WHERE id = $1 AND version = $7
                "#,
            )
            .bind(product.id().as_uuid())
            .bind(product.name())
            .bind(product.description())
            .bind(product.price().cents())
            .bind(i64::from(product.stock()))
            .bind(product.updated_at())
            .bind(product.version())
            .execute(&mut *self.conn)
            .await
        }
        .map_err(db_err)?;

        check_written(result.rows_affected(), product)
    }
}

struct PgOrderRepository<'t> {
    conn: &'t mut PgConnection,
}

#[async_trait]
impl OrderRepository for PgOrderRepository<'_> {
    async fn find(&mut self, id: AggregateId) -> Result<Option<Order>, UnitOfWorkError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, status, total_amount, created_at, updated_at, version
            FROM orders WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let item_rows = sqlx::query(
            r#"
            SELECT product_id, quantity, unit_price
            FROM order_items WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *self.conn)
        .await
        .map_err(db_err)?;

        let mut items = Vec::with_capacity(item_rows.len());
        for item in item_rows {
            let quantity: i64 = item.try_get("quantity").map_err(db_err)?;
            items.push(OrderItem::from_parts(
                AggregateId::from_uuid(item.try_get::<Uuid, _>("product_id").map_err(db_err)?),
                to_u32(quantity, "quantity")?,
                Money::from_cents(item.try_get("unit_price").map_err(db_err)?),
            ));
        }

        let status: String = row.try_get("status").map_err(db_err)?;
        let status = OrderStatus::parse(&status)
            .ok_or_else(|| UnitOfWorkError::repository(format!("unknown order status: {status}")))?;

        let read = || -> Result<Order, sqlx::Error> {
            Ok(Order::restore(
                AggregateId::from_uuid(row.try_get::<Uuid, _>("id")?),
                row.try_get("version")?,
                AggregateId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
                status,
                items,
                Money::from_cents(row.try_get("total_amount")?),
                row.try_get("created_at")?,
                row.try_get("updated_at")?,
            ))
        };
        read().map(Some).map_err(db_err)
    }

    async fn save(&mut self, order: &mut Order) -> Result<(), UnitOfWorkError> {
        let result = if order.version() == 0 {
            sqlx::query(
                r#"
                INSERT INTO orders (id, user_id, status, total_amount, created_at, updated_at, version)
                VALUES ($1, $2, $3, $4, $5, $6, 1)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(order.id().as_uuid())
            .bind(order.user_id().as_uuid())
            .bind(order.status().as_str())
            .bind(order.total_amount().cents())
            .bind(order.created_at())
            .bind(order.updated_at())
            .execute(&mut *self.conn)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE orders
                SET status = $2, total_amount = $3, updated_at = $4, version = version + 1
                WHERE id = $1 AND version = $5
                "#,
            )
            .bind(order.id().as_uuid())
            .bind(order.status().as_str())
            .bind(order.total_amount().cents())
            .bind(order.updated_at())
            .bind(order.version())
            .execute(&mut *self.conn)
            .await
        }
        .map_err(db_err)?;

        check_written(result.rows_affected(), order)?;

        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order.id().as_uuid())
            .execute(&mut *self.conn)
            .await
            .map_err(db_err)?;

        for (position, item) in order.items().iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| UnitOfWorkError::repository("too many order items"))?;
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order.id().as_uuid())
            .bind(position)
            .bind(item.product_id().as_uuid())
            .bind(i64::from(item.quantity()))
            .bind(item.unit_price().cents())
            .execute(&mut *self.conn)
            .await
            .map_err(db_err)?;
        }
        Ok(())
    }
}
