use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_pipeline::config::Config;
use order_pipeline::metrics::{self, Metrics};
use order_pipeline::store::PgOrderStore;
use order_pipeline::worker::{spawn_workers, ProcessingWorker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_pipeline=debug")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Starting order processing pipeline");

    // === 1. Order store ===
    tracing::info!(database_url = %config.database_url, "Connecting to Postgres");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;

    let store = Arc::new(PgOrderStore::new(pool));
    store.ensure_schema().await?;

    // === 2. Metrics registry + HTTP endpoint ===
    let metrics = Arc::new(Metrics::new()?);
    let registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start metrics runtime");
                return;
            }
        };
        rt.block_on(async {
            if let Err(e) = metrics::start_metrics_server(registry, metrics_port).await {
                tracing::error!(error = %e, "Metrics server error");
            }
        });
    });

    // === 3. Worker pool ===
    let worker = Arc::new(ProcessingWorker::new(
        store.clone(),
        metrics.clone(),
        config.processing_delay,
    ));

    let handles = spawn_workers(
        config.worker_count,
        worker,
        config.kafka_brokers.clone(),
        config.consumer_group.clone(),
        config.order_topic.clone(),
    );

    tracing::info!(
        workers = handles.len(),
        topic = %config.order_topic,
        group = %config.consumer_group,
        "Pipeline running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping workers");

    for handle in handles {
        handle.abort();
    }

    Ok(())
}
