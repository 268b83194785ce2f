//! Operator endpoints for failed outbox rows.

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::{EventId, OutboxEntry, OutboxStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1_000;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

/// Outbox row as shown to operators; the payload is left out.
#[derive(Debug, Serialize)]
pub struct OutboxEntryResponse {
    pub id: EventId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub event_type: String,
    pub status: OutboxStatus,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<OutboxEntry> for OutboxEntryResponse {
    fn from(entry: OutboxEntry) -> Self {
        Self {
            id: entry.id,
            aggregate_id: entry.aggregate_id,
            aggregate_type: entry.aggregate_type,
            event_type: entry.event_type,
            status: entry.status,
            retry_count: entry.retry_count,
            error_message: entry.error_message,
            created_at: entry.created_at,
        }
    }
}

/// GET /outbox/failed: lists failed rows, oldest first. `limit` is capped at
/// 1000.
pub async fn failed(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<OutboxEntryResponse>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let entries = state.outbox.get_failed(limit).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

/// POST /outbox/{id}/reset: returns a failed row to pending.
#[tracing::instrument(skip(state))]
pub async fn reset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OutboxEntryResponse>, ApiError> {
    let id = parse_event_id(&id)?;
    if !state.outbox.reset_to_pending(id).await? {
        return Err(ApiError::Conflict(format!("Outbox entry {id} is not failed")));
    }
    tracing::info!(outbox_id = %id, "Outbox entry re-armed by operator");

    let entry = state
        .outbox
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Outbox entry not found: {id}")))?;
    Ok(Json(entry.into()))
}

fn parse_event_id(id: &str) -> Result<EventId, ApiError> {
    let uuid = Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid outbox id: {e}")))?;
    Ok(EventId::from(uuid))
}
