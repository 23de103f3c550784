//! Application setup and server configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    extract::Extension,
    http::{Method, StatusCode},
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::domains::listings::{
    register_listing_jobs, ListingSynchronizer, ListingsCache, NotifyWhenEnriched,
};
use crate::kernel::jobs::{JobQueue, JobRegistry, QueueProcessor, QueueProcessorConfig};
use crate::kernel::{
    AnthropicClient, BaseListingAnalyzer, BaseNotifier, ServerDeps, TelegramClient,
    ValhallaClient,
};
use crate::server::routes::{health_handler, list_listings_handler, sync_listings_handler};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub cache: Arc<ListingsCache>,
    pub synchronizer: Arc<ListingSynchronizer>,
    /// Sync endpoint is disabled when `None`.
    pub sync_token: Option<String>,
}

/// Build the external service clients from configuration.
///
/// Analysis and notification are optional; their jobs are skipped when the
/// credentials are missing.
pub fn build_server_deps(pool: PgPool, config: &Config) -> Result<ServerDeps> {
    let routes = Arc::new(ValhallaClient::new(config.valhalla_url.clone())?);

    let analyzer: Option<Arc<dyn BaseListingAnalyzer>> = match &config.anthropic_api_key {
        Some(key) => Some(Arc::new(AnthropicClient::new(
            key.clone(),
            Some(config.anthropic_model.clone()),
        )?)),
        None => {
            info!("ANTHROPIC_API_KEY not set, AI enrichment jobs will be skipped");
            None
        }
    };

    let notifier: Option<Arc<dyn BaseNotifier>> = match config.telegram() {
        Some((token, chat_id)) => Some(Arc::new(TelegramClient::new(token, chat_id)?)),
        None => {
            info!("Telegram not configured, notify jobs will be skipped");
            None
        }
    };

    Ok(ServerDeps::new(pool, routes, analyzer, notifier))
}

/// Wire the queue processor with every listing handler, the listings cache
/// and notification chaining.
pub fn build_processor(
    deps: &ServerDeps,
    queue: Arc<dyn JobQueue>,
    cache: Arc<ListingsCache>,
    config: &Config,
) -> QueueProcessor {
    let mut registry = JobRegistry::new();
    register_listing_jobs(
        &mut registry,
        deps,
        config.route_destinations.clone(),
        config.public_origin.clone(),
    );

    QueueProcessor::new(
        queue.clone(),
        Arc::new(registry),
        QueueProcessorConfig::default(),
    )
    .with_cache(cache)
    .with_completion_hook(Arc::new(NotifyWhenEnriched::new(
        deps.db_pool.clone(),
        queue,
    )))
}

/// Build the Axum application router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/listings", get(list_listings_handler))
        .route("/api/listings/sync", post(sync_listings_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    REQUEST_TIMEOUT,
                ))
                .layer(cors)
                .layer(Extension(state)),
        )
}
