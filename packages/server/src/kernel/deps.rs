//! Server dependencies for job handlers (using traits for testability)
//!
//! This module provides the dependency container handed to every domain
//! handler. All external services sit behind trait abstractions so tests
//! can swap in the mocks from `test_dependencies`.

use std::sync::Arc;

use sqlx::PgPool;

use crate::kernel::{BaseListingAnalyzer, BaseNotifier, BaseRouteProvider};

/// Server dependencies accessible to handlers.
#[derive(Clone)]
pub struct ServerDeps {
    pub db_pool: PgPool,
    pub routes: Arc<dyn BaseRouteProvider>,
    /// `None` when no API key is configured; enrichment jobs are skipped.
    pub analyzer: Option<Arc<dyn BaseListingAnalyzer>>,
    /// `None` when no bot is configured; notify jobs are skipped.
    pub notifier: Option<Arc<dyn BaseNotifier>>,
}

impl ServerDeps {
    pub fn new(
        db_pool: PgPool,
        routes: Arc<dyn BaseRouteProvider>,
        analyzer: Option<Arc<dyn BaseListingAnalyzer>>,
        notifier: Option<Arc<dyn BaseNotifier>>,
    ) -> Self {
        Self {
            db_pool,
            routes,
            analyzer,
            notifier,
        }
    }
}
