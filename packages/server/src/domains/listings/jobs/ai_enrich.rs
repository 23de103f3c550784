use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::common::{AnalysisRequest, ListingAnalysis};
use crate::domains::listings::models::Listing;
use crate::kernel::jobs::{Job, JobHandler, JobOutcome};
use crate::kernel::BaseListingAnalyzer;

/// Stored positives and negatives, each.
pub const MAX_AI_ITEMS: usize = 8;

pub const MAX_AI_DESCRIPTION_CHARS: usize = 10_000;

/// Runs the listing analyzer and stores its verdict.
pub struct AiEnrichHandler {
    pool: PgPool,
    analyzer: Option<Arc<dyn BaseListingAnalyzer>>,
}

impl AiEnrichHandler {
    pub fn new(pool: PgPool, analyzer: Option<Arc<dyn BaseListingAnalyzer>>) -> Self {
        Self { pool, analyzer }
    }
}

#[async_trait]
impl JobHandler for AiEnrichHandler {
    async fn execute(&self, job: &Job) -> Result<JobOutcome> {
        let Some(analyzer) = &self.analyzer else {
            return Ok(JobOutcome::Skipped);
        };

        let Some(listing) = Listing::find_by_id(&job.target_key, &self.pool).await? else {
            return Ok(JobOutcome::Skipped);
        };

        if listing.is_enriched() {
            return Ok(JobOutcome::Skipped);
        }

        let analysis = analyzer.analyze(&analysis_request(&listing)).await?;
        Listing::set_enrichment(&listing.external_id, &clamp(analysis), &self.pool).await?;

        Ok(JobOutcome::Completed)
    }
}

fn analysis_request(listing: &Listing) -> AnalysisRequest {
    AnalysisRequest {
        address: listing.address.clone(),
        price: listing.price,
        living_area: listing.living_area,
        bedrooms: listing.bedrooms,
        energy_label: listing.energy_label.clone(),
        construction_year: listing.construction_year,
        description: listing.description.clone(),
        photos: listing.photos.0.clone(),
    }
}

fn clamp(mut analysis: ListingAnalysis) -> ListingAnalysis {
    analysis.positives.truncate(MAX_AI_ITEMS);
    analysis.negatives.truncate(MAX_AI_ITEMS);
    if let Some((idx, _)) = analysis.description.char_indices().nth(MAX_AI_DESCRIPTION_CHARS) {
        analysis.description.truncate(idx);
    }
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_limits_items_and_description() {
        let analysis = ListingAnalysis {
            positives: (0..12).map(|i| format!("plus {i}")).collect(),
            negatives: vec!["noisy".to_string()],
            description: "ë".repeat(MAX_AI_DESCRIPTION_CHARS + 5),
        };

        let clamped = clamp(analysis);

        assert_eq!(clamped.positives.len(), MAX_AI_ITEMS);
        assert_eq!(clamped.negatives.len(), 1);
        assert_eq!(clamped.description.chars().count(), MAX_AI_DESCRIPTION_CHARS);
    }
}
