use std::sync::Arc;

use herald_db::metrics::PgMetricsSource;
use herald_events::{AlertScheduler, DeliveryWorker, Notifier};
use herald_worker::config::WorkerConfig;
use herald_worker::logging;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = WorkerConfig::from_env().expect("Invalid worker configuration");

    // --- Tracing ---
    logging::init(config.log_format);
    tracing::info!(
        alert_tick_secs = config.alert_tick.as_secs(),
        delivery_tick_secs = config.delivery.tick_interval.as_secs(),
        batch_size = config.delivery.batch_size,
        "Loaded worker configuration"
    );

    // --- Database ---
    let pool = herald_db::create_pool(&config.database_url, config.max_connections)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    herald_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    herald_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Services ---
    let cancel = CancellationToken::new();

    let scheduler = AlertScheduler::new(
        pool.clone(),
        Arc::new(PgMetricsSource::new(pool.clone())),
        Notifier::new(pool.clone()),
        config.alert_tick,
    );
    let scheduler_cancel = cancel.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_cancel).await;
    });

    let delivery_worker = DeliveryWorker::new(pool.clone(), config.delivery.clone())
        .expect("Failed to build webhook HTTP client");
    let delivery_cancel = cancel.clone();
    let delivery_handle = tokio::spawn(async move {
        delivery_worker.run(delivery_cancel).await;
    });

    tracing::info!("Worker services started (alert scheduler, delivery worker)");

    // --- Shutdown ---
    shutdown_signal().await;
    cancel.cancel();

    let drained = tokio::time::timeout(config.shutdown_timeout, async {
        let _ = scheduler_handle.await;
        let _ = delivery_handle.await;
    })
    .await;
    match drained {
        Ok(()) => tracing::info!("Worker services stopped"),
        Err(_) => tracing::warn!(
            timeout_secs = config.shutdown_timeout.as_secs(),
            "Shutdown timed out with ticks still in flight"
        ),
    }

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
