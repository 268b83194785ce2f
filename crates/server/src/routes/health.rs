//! Health check endpoint.

use axum::Json;
use axum::extract::State;
use event_store::OutboxStatus;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct OutboxHealth {
    pub pending: u64,
    pub failed: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub outbox: OutboxHealth,
}

/// GET /health: returns service status and the outbox backlog.
pub async fn check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let pending = state.outbox.count_by_status(OutboxStatus::Pending).await?;
    let failed = state.outbox.count_by_status(OutboxStatus::Failed).await?;
    metrics::gauge!("outbox_pending_rows").set(pending as f64);
    metrics::gauge!("outbox_failed_rows").set(failed as f64);

    Ok(Json(HealthResponse {
        status: "ok",
        outbox: OutboxHealth { pending, failed },
    }))
}
