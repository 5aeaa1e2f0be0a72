use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use brewfleet_api::jobs::{CommandExpiryJob, JobScheduler};
use brewfleet_api::services::DispatchWorker;
use brewfleet_api::{app, config, middleware};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = config::Config::load()?;

    middleware::logging::init_logging(&config.logging);
    middleware::metrics::init_metrics();

    info!("Starting Brewfleet API v{}", env!("CARGO_PKG_VERSION"));

    let db_config = persistence::db::DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        connect_timeout_secs: config.database.connect_timeout_secs,
        idle_timeout_secs: config.database.idle_timeout_secs,
    };
    let pool = persistence::db::create_pool(&db_config).await?;

    info!("Running database migrations...");
    sqlx::migrate!("../persistence/src/migrations").run(&pool).await?;
    info!("Migrations completed");

    let state = app::AppState::new(config.clone(), pool.clone());

    // Dispatch worker drains the command outbox for the lifetime of the
    // process.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = DispatchWorker::new(
        pool.clone(),
        state.registry.clone(),
        &state.dispatch,
        config.dispatch.worker_batch_size,
        Duration::from_secs(config.dispatch.worker_poll_secs),
        shutdown_rx,
    );
    let worker_handle = worker.spawn();

    let mut scheduler = JobScheduler::new();
    scheduler.register(CommandExpiryJob::new(
        pool.clone(),
        config.dispatch.expiry_sweep_minutes,
    ));
    scheduler.start();

    let addr = config.socket_addr();
    let app = app::router(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(10)).await;
    let _ = worker_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install ctrl-c handler");
    info!("Shutdown signal received");
}
