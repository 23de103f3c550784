use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use super::listing_job;
use crate::domains::listings::models::Listing;
use crate::kernel::jobs::{CompletionHook, Job, JobKind, JobQueue};

/// Enqueues a `notify` job once a listing has both routes and enrichment.
///
/// Whichever of `compute-routes` and `ai-enrich` finishes second triggers
/// it. The queue absorbs a duplicate if both race.
pub struct NotifyWhenEnriched {
    pool: PgPool,
    queue: Arc<dyn JobQueue>,
}

impl NotifyWhenEnriched {
    pub fn new(pool: PgPool, queue: Arc<dyn JobQueue>) -> Self {
        Self { pool, queue }
    }
}

#[async_trait]
impl CompletionHook for NotifyWhenEnriched {
    async fn on_completed(&self, job: &Job) -> Result<()> {
        if !matches!(job.job_type, JobKind::ComputeRoutes | JobKind::AiEnrich) {
            return Ok(());
        }

        let Some(listing) = Listing::find_by_id(&job.target_key, &self.pool).await? else {
            return Ok(());
        };

        if !listing.is_ready_to_notify() {
            return Ok(());
        }

        let inserted = self
            .queue
            .enqueue_many(&[listing_job(JobKind::Notify, &listing.external_id)])
            .await?;

        if inserted > 0 {
            info!(external_id = %listing.external_id, "listing enriched, notification queued");
        }

        Ok(())
    }
}
