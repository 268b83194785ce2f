//! Service process for the domain-event pipeline.
//!
//! Runs the outbox relay and the configured subscribers next to a small ops
//! HTTP surface: health with the outbox backlog, Prometheus metrics, and
//! the operator reset path for failed outbox rows.

pub mod config;
pub mod error;
pub mod routes;
pub mod runtime;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use event_store::OutboxStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

pub use config::{BusTransport, Config, ConfigError, DatabaseConfig, LogFormat};

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub outbox: Arc<dyn OutboxStore>,
}

impl AppState {
    pub fn new(outbox: Arc<dyn OutboxStore>) -> Self {
        Self { outbox }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: AppState, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/outbox/failed", get(routes::outbox::failed))
        .route("/outbox/{id}/reset", post(routes::outbox::reset))
        .with_state(state)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}
