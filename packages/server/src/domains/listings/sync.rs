//! Reconciles a scraped snapshot with stored listings.
//!
//! A sync pass:
//! 1. Upserts every incoming listing (a failing row is logged and counted)
//! 2. Marks stored listings absent from a non-empty snapshot as disappeared
//! 3. Enqueues route and enrichment jobs for active listings missing them
//!
//! An empty snapshot never marks anything disappeared; it almost always
//! means the scraper failed rather than that every listing was sold.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};

use super::jobs::listing_job;
use super::models::{Listing, ListingSnapshot};
use crate::kernel::jobs::{EnqueueItem, JobKind, JobQueue};

/// Counts from one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub upserted: u64,
    pub failed: u64,
    pub disappeared: u64,
    pub jobs_enqueued: u64,
}

pub struct ListingSynchronizer {
    pool: PgPool,
    queue: Arc<dyn JobQueue>,
}

impl ListingSynchronizer {
    pub fn new(pool: PgPool, queue: Arc<dyn JobQueue>) -> Self {
        Self { pool, queue }
    }

    pub async fn sync(&self, incoming: &[ListingSnapshot]) -> Result<SyncResult> {
        let mut result = SyncResult::default();

        for snapshot in incoming {
            match Listing::upsert(snapshot, &self.pool).await {
                Ok(()) => result.upserted += 1,
                Err(e) => {
                    result.failed += 1;
                    warn!(
                        external_id = %snapshot.external_id,
                        error = %format!("{:#}", e),
                        "failed to upsert listing"
                    );
                }
            }
        }

        if incoming.is_empty() {
            warn!("empty snapshot, skipping disappearance marking");
        } else {
            let seen: Vec<String> = incoming.iter().map(|l| l.external_id.clone()).collect();
            result.disappeared = Listing::mark_disappeared_except(&seen, &self.pool)
                .await
                .context("failed to mark disappeared listings")?;
        }

        result.jobs_enqueued = self.enqueue_missing_enrichment().await?;

        info!(
            upserted = result.upserted,
            failed = result.failed,
            disappeared = result.disappeared,
            jobs_enqueued = result.jobs_enqueued,
            "listing sync finished"
        );

        Ok(result)
    }

    /// Enqueue route and enrichment jobs for every active listing missing
    /// them. Returns the number of jobs actually inserted.
    pub async fn enqueue_missing_enrichment(&self) -> Result<u64> {
        let missing_routes = Listing::find_ids_missing_routes(&self.pool)
            .await
            .context("failed to find listings without routes")?;
        let missing_enrichment = Listing::find_ids_missing_enrichment(&self.pool)
            .await
            .context("failed to find listings without enrichment")?;

        let items: Vec<EnqueueItem> = missing_routes
            .into_iter()
            .map(|id| listing_job(JobKind::ComputeRoutes, id))
            .chain(
                missing_enrichment
                    .into_iter()
                    .map(|id| listing_job(JobKind::AiEnrich, id)),
            )
            .collect();

        if items.is_empty() {
            return Ok(0);
        }

        self.queue.enqueue_many(&items).await
    }

    /// Enqueue `notify` for every listing that is ready but was never
    /// announced. Run at startup: a crash between completing the last
    /// enrichment job and chaining its notification leaves no job behind.
    pub async fn enqueue_pending_notifications(&self) -> Result<u64> {
        let ready = Listing::find_ids_ready_to_notify(&self.pool)
            .await
            .context("failed to find listings ready to notify")?;

        if ready.is_empty() {
            return Ok(0);
        }

        let items: Vec<EnqueueItem> = ready
            .into_iter()
            .map(|id| listing_job(JobKind::Notify, id))
            .collect();

        self.queue.enqueue_many(&items).await
    }
}
