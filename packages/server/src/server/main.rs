// Main entry point for API server

use std::sync::Arc;

use anyhow::{Context, Result};
use ernest_core::domains::listings::{ListingSynchronizer, ListingsCache};
use ernest_core::kernel::jobs::{JobQueue, PostgresJobQueue};
use ernest_core::server::{build_processor, build_router, build_server_deps, AppState};
use ernest_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ernest_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Ernest API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        destinations = config.route_destinations.len(),
        "Configuration loaded"
    );

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    let queue: Arc<dyn JobQueue> = Arc::new(PostgresJobQueue::new(pool.clone()));

    // Recover jobs left running by a previous process before anything claims
    queue
        .reset_stale_jobs()
        .await
        .context("Failed to reset stale jobs")?;

    let synchronizer = Arc::new(ListingSynchronizer::new(pool.clone(), queue.clone()));
    let enqueued = synchronizer
        .enqueue_missing_enrichment()
        .await
        .context("Failed to enqueue missing enrichment")?;
    if enqueued > 0 {
        tracing::info!(enqueued, "Enqueued enrichment jobs for existing listings");
    }
    let notifications = synchronizer
        .enqueue_pending_notifications()
        .await
        .context("Failed to enqueue pending notifications")?;
    if notifications > 0 {
        tracing::info!(notifications, "Enqueued notifications for enriched listings");
    }

    let deps = build_server_deps(pool.clone(), &config)?;
    let cache = Arc::new(ListingsCache::new(pool.clone()));

    let shutdown = CancellationToken::new();
    let processor = build_processor(&deps, queue, cache.clone(), &config).spawn(shutdown.clone());

    let app = build_router(AppState {
        db_pool: pool,
        cache,
        synchronizer,
        sync_token: config.sync_token.clone(),
    });

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
            }
            signal.cancel();
        })
        .await
        .context("Server error")?;

    // The in-flight job, if any, finishes before the processor exits
    shutdown.cancel();
    processor.await.context("Queue processor task failed")?;

    Ok(())
}
