use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventId, EventQuery, EventStoreError, NewEvent, OutboxEntry, OutboxStatus,
    Result, SortOrder, StoredEvent,
    store::{EventStore, OutboxStore},
};

const EVENT_COLUMNS: &str = "id, aggregate_id, aggregate_type, event_type, event_version, payload, metadata, occurred_at";

const OUTBOX_COLUMNS: &str = "id, aggregate_id, aggregate_type, event_type, event_version, payload, status, retry_count, created_at, published_at, error_message";

/// Converts a row limit for binding; anything past `i64::MAX` means "all rows".
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Appends an event to the log on the caller's connection.
///
/// Meant to run on a connection borrowed from an open transaction, so the
/// row commits or rolls back together with the aggregate write.
/// `occurred_at` is assigned by the server with `clock_timestamp()`, which
/// keeps the staging order of events appended in one transaction.
pub async fn append_event(conn: &mut PgConnection, event: &NewEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO event_store (id, aggregate_id, aggregate_type, event_type, event_version, payload, metadata, occurred_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, clock_timestamp())
        "#,
    )
    .bind(event.event_id.as_uuid())
    .bind(event.aggregate_id.as_uuid())
    .bind(&event.aggregate_type)
    .bind(&event.event_type)
    .bind(event.event_version)
    .bind(&event.payload)
    .bind(&event.metadata)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Inserts a `pending` outbox row for the event on the caller's connection.
pub async fn enqueue_outbox(conn: &mut PgConnection, event: &NewEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO outbox (id, aggregate_id, aggregate_type, event_type, event_version, payload, status, retry_count, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, 'pending', 0, clock_timestamp())
        "#,
    )
    .bind(event.event_id.as_uuid())
    .bind(event.aggregate_id.as_uuid())
    .bind(&event.aggregate_type)
    .bind(&event.event_type)
    .bind(event.event_version)
    .bind(&event.payload)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// PostgreSQL-backed event log and outbox.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<StoredEvent> {
        Ok(StoredEvent {
            id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            event_type: row.try_get("event_type")?,
            event_version: row.try_get("event_version")?,
            payload: row.try_get("payload")?,
            metadata: row.try_get("metadata")?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }

    fn row_to_entry(row: PgRow) -> Result<OutboxEntry> {
        let status: String = row.try_get("status")?;

        Ok(OutboxEntry {
            id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            event_type: row.try_get("event_type")?,
            event_version: row.try_get("event_version")?,
            payload: row.try_get("payload")?,
            status: status.parse()?,
            retry_count: row.try_get("retry_count")?,
            created_at: row.try_get("created_at")?,
            published_at: row.try_get("published_at")?,
            error_message: row.try_get("error_message")?,
        })
    }

    async fn entries_with_status(
        &self,
        status: OutboxStatus,
        limit: usize,
    ) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox WHERE status = $1 ORDER BY created_at ASC, seq ASC LIMIT $2"
        ))
        .bind(status.as_str())
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    /// Resolves an update that touched no row into "lost the race" or "unknown id".
    async fn transitioned(&self, id: EventId, rows_affected: u64) -> Result<bool> {
        if rows_affected > 0 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM outbox WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await?;

        if exists {
            tracing::debug!(outbox_id = %id, "Outbox row already left the source state");
            Ok(false)
        } else {
            Err(EventStoreError::OutboxEntryNotFound(id))
        }
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn query_events(&self, query: EventQuery) -> Result<Vec<StoredEvent>> {
        let mut sql = format!("SELECT {EVENT_COLUMNS} FROM event_store WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.aggregate_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND aggregate_id = ${param_count}"));
        }
        if query.aggregate_type.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND aggregate_type = ${param_count}"));
        }
        if query.event_types.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND event_type = ANY(${param_count})"));
        }
        if query.from_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND occurred_at >= ${param_count}"));
        }
        if query.to_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND occurred_at < ${param_count}"));
        }

        match query.order {
            SortOrder::Ascending => sql.push_str(" ORDER BY occurred_at ASC, seq ASC"),
            SortOrder::Descending => sql.push_str(" ORDER BY occurred_at DESC, seq DESC"),
        }

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(id) = query.aggregate_id {
            sqlx_query = sqlx_query.bind(id.as_uuid());
        }
        if let Some(agg_type) = query.aggregate_type {
            sqlx_query = sqlx_query.bind(agg_type);
        }
        if let Some(event_types) = query.event_types {
            sqlx_query = sqlx_query.bind(event_types);
        }
        if let Some(from_ts) = query.from_timestamp {
            sqlx_query = sqlx_query.bind(from_ts);
        }
        if let Some(to_ts) = query.to_timestamp {
            sqlx_query = sqlx_query.bind(to_ts);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(sql_limit(limit));
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(sql_limit(offset));
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn count_events(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM event_store")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl OutboxStore for PostgresEventStore {
    async fn get_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        self.entries_with_status(OutboxStatus::Pending, limit).await
    }

    async fn get_pending_excluding(
        &self,
        excluded: &[AggregateId],
        limit: usize,
    ) -> Result<Vec<OutboxEntry>> {
        let excluded: Vec<Uuid> = excluded.iter().map(AggregateId::as_uuid).collect();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {OUTBOX_COLUMNS} FROM outbox
            WHERE status = 'pending' AND aggregate_id <> ALL($1)
            ORDER BY created_at ASC, seq ASC
            LIMIT $2
            "#
        ))
        .bind(excluded)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn get_failed(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        self.entries_with_status(OutboxStatus::Failed, limit).await
    }

    async fn get_retryable(&self, max_retries: u32, limit: usize) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {OUTBOX_COLUMNS} FROM outbox
            WHERE status = 'failed' AND retry_count < $1
            ORDER BY created_at ASC, seq ASC
            LIMIT $2
            "#
        ))
        .bind(i64::from(max_retries))
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn failed_aggregates(&self, min_retry_count: u32) -> Result<Vec<AggregateId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT DISTINCT aggregate_id FROM outbox WHERE status = 'failed' AND retry_count >= $1",
        )
        .bind(i64::from(min_retry_count))
        .fetch_all(&self.pool)
        .await?;

        if !ids.is_empty() {
            tracing::debug!(count = ids.len(), min_retry_count, "Aggregates with failed outbox rows");
        }
        Ok(ids.into_iter().map(AggregateId::from_uuid).collect())
    }

    async fn get(&self, id: EventId) -> Result<Option<OutboxEntry>> {
        let row = sqlx::query(&format!("SELECT {OUTBOX_COLUMNS} FROM outbox WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_entry).transpose()
    }

    async fn mark_published(&self, id: EventId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'published', published_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        self.transitioned(id, result.rows_affected()).await
    }

    async fn mark_failed(&self, id: EventId, error_message: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'failed', error_message = $2, retry_count = retry_count + 1
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_uuid())
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        self.transitioned(id, result.rows_affected()).await
    }

    async fn reset_to_pending(&self, id: EventId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'pending', error_message = NULL
            WHERE id = $1 AND status = 'failed'
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        self.transitioned(id, result.rows_affected()).await
    }

    async fn increment_retry(&self, id: EventId) -> Result<()> {
        let result = sqlx::query("UPDATE outbox SET retry_count = retry_count + 1 WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EventStoreError::OutboxEntryNotFound(id));
        }
        Ok(())
    }

    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}
