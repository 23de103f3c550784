//! Test fixtures for creating test data.
//!
//! These fixtures use the model methods directly to create test data.

use anyhow::Result;
use ernest_core::common::ListingAnalysis;
use ernest_core::domains::listings::{Listing, ListingSnapshot};
use ernest_core::kernel::jobs::{Job, JobStatus};
use ernest_core::kernel::MockRouteProvider;
use sqlx::PgPool;
use uuid::Uuid;

/// A typical available listing in Amsterdam.
pub fn snapshot(external_id: &str) -> ListingSnapshot {
    ListingSnapshot::builder()
        .external_id(external_id)
        .url(format!("https://example.nl/koop/amsterdam/{}", external_id))
        .address(format!("Teststraat {}", external_id))
        .postcode("1011 AB")
        .neighbourhood("Centrum")
        .price(450_000)
        .bedrooms(2)
        .living_area(65)
        .energy_label("A")
        .construction_year(1930)
        .description("Sunny apartment close to the canals.")
        .latitude(52.3676)
        .longitude(4.9041)
        .photos(vec![
            "https://cdn.example.nl/1.jpg".to_string(),
            "https://cdn.example.nl/2.jpg".to_string(),
        ])
        .build()
}

/// Insert a listing through the regular upsert path.
pub async fn create_test_listing(pool: &PgPool, external_id: &str) -> Result<Listing> {
    Listing::upsert(&snapshot(external_id), pool).await?;
    load_listing(pool, external_id).await
}

/// Insert a listing that already has routes and enrichment.
pub async fn create_enriched_listing(pool: &PgPool, external_id: &str) -> Result<Listing> {
    create_test_listing(pool, external_id).await?;

    let routes = [("fareharbor".to_string(), MockRouteProvider::route(14))]
        .into_iter()
        .collect();
    Listing::set_routes(external_id, &routes, pool).await?;
    Listing::set_enrichment(external_id, &test_analysis(), pool).await?;

    load_listing(pool, external_id).await
}

pub fn test_analysis() -> ListingAnalysis {
    ListingAnalysis {
        positives: vec!["south-facing balcony".to_string()],
        negatives: vec!["no lift".to_string()],
        description: "Bright two-bedroom apartment.".to_string(),
    }
}

pub async fn load_listing(pool: &PgPool, external_id: &str) -> Result<Listing> {
    Listing::find_by_id(external_id, pool)
        .await?
        .ok_or_else(|| anyhow::anyhow!("listing {} not found", external_id))
}

pub async fn load_job(pool: &PgPool, job_id: Uuid) -> Result<Job> {
    Job::find_by_id(job_id, pool)
        .await?
        .ok_or_else(|| anyhow::anyhow!("job {} not found", job_id))
}

/// Make a backed-off job claimable right away.
pub async fn make_due(pool: &PgPool, job_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE jobs SET run_after = NOW() WHERE id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Make every pending job claimable right away.
pub async fn make_all_due(pool: &PgPool) -> Result<()> {
    sqlx::query("UPDATE jobs SET run_after = NOW() WHERE status = 'pending'")
        .execute(pool)
        .await?;
    Ok(())
}

/// Number of jobs currently in `status`.
pub async fn count_jobs(pool: &PgPool, status: JobStatus) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs WHERE status = $1")
        .bind(status)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
