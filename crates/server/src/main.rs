//! Service entry point.

use std::sync::Arc;

use event_store::PostgresEventStore;
use server::config::Config;
use server::runtime::{self, Bus, Workers};
use tokio::signal;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Configuration and tracing
    let config = Config::from_env()?;
    runtime::init_tracing(config.log_format);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Database pool and migrations
    let pool = runtime::connect_pool(&config.database).await?;
    let store = PostgresEventStore::new(pool);
    store.run_migrations().await?;
    let outbox = Arc::new(store);

    // 4. Bus, relay and subscribers
    let topics = runtime::topic_registry(&config);
    let bus = Bus::connect(&config, &topics).await?;
    let workers = Workers::start(&config, outbox.clone(), &bus, topics);

    // 5. Ops HTTP server
    let app = server::create_app(server::AppState::new(outbox), metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, service = %config.service_name, "starting server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    workers.shutdown().await;
    tracing::info!("server shut down gracefully");
    Ok(())
}
