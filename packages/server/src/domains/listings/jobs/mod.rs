//! Listing enrichment jobs.
//!
//! Each job targets one listing by external id:
//! - `compute-routes` - cycling routes to the configured destinations
//! - `ai-enrich` - positives, negatives and a cleaned description
//! - `notify` - announce the listing once routes and enrichment exist
//!
//! `NotifyWhenEnriched` chains the first two into the third.

mod ai_enrich;
mod chaining;
mod compute_routes;
mod notify;

use std::sync::Arc;

pub use ai_enrich::{AiEnrichHandler, MAX_AI_DESCRIPTION_CHARS, MAX_AI_ITEMS};
pub use chaining::NotifyWhenEnriched;
pub use compute_routes::ComputeRoutesHandler;
pub use notify::{build_caption, build_message, format_price, NotifyHandler, CAPTION_LIMIT};

use crate::common::Destination;
use crate::kernel::jobs::{EnqueueItem, JobKind, JobRegistry, DEFAULT_MAX_ATTEMPTS};
use crate::kernel::ServerDeps;

/// Retry budget per job kind.
pub fn max_attempts_for(kind: &JobKind) -> i32 {
    match kind {
        JobKind::ComputeRoutes => 3,
        JobKind::AiEnrich => 2,
        JobKind::Notify => 3,
        JobKind::Other(_) => DEFAULT_MAX_ATTEMPTS,
    }
}

/// Enqueue request for one listing with the kind's retry budget.
pub fn listing_job(kind: JobKind, external_id: impl Into<String>) -> EnqueueItem {
    let max_attempts = max_attempts_for(&kind);
    EnqueueItem::new(kind, external_id, max_attempts)
}

/// Register all listing job handlers.
pub fn register_listing_jobs(
    registry: &mut JobRegistry,
    deps: &ServerDeps,
    destinations: Vec<Destination>,
    public_origin: impl Into<String>,
) {
    registry
        .register(
            JobKind::ComputeRoutes,
            Arc::new(ComputeRoutesHandler::new(
                deps.db_pool.clone(),
                deps.routes.clone(),
                destinations,
            )),
        )
        .register(
            JobKind::AiEnrich,
            Arc::new(AiEnrichHandler::new(
                deps.db_pool.clone(),
                deps.analyzer.clone(),
            )),
        )
        .register(
            JobKind::Notify,
            Arc::new(NotifyHandler::new(
                deps.db_pool.clone(),
                deps.notifier.clone(),
                public_origin,
            )),
        );
}
