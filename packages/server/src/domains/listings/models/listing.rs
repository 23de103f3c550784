use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use typed_builder::TypedBuilder;

use crate::common::{ListingAnalysis, RouteResult};

/// Scraper status meaning "available". An empty status is treated the same.
pub const AVAILABLE_STATUS: &str = "Beschikbaar";

/// SQL predicate selecting active listings.
const ACTIVE_PREDICATE: &str = "disappeared_at IS NULL AND status IN ('Beschikbaar', '')";

/// Routes keyed by destination name.
pub type RouteMap = BTreeMap<String, RouteResult>;

/// Listing - a scraped property plus enrichment produced by background jobs
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub external_id: String,
    pub url: String,

    // Core property data
    pub address: String,
    pub postcode: Option<String>,
    pub neighbourhood: Option<String>,
    pub price: i32,
    pub bedrooms: i32,
    pub living_area: i32,
    pub energy_label: Option<String>,
    pub object_type: Option<String>,
    pub construction_year: Option<i32>,
    pub description: Option<String>,

    // Amenities
    pub has_garden: Option<bool>,
    pub has_balcony: Option<bool>,
    pub has_roof_terrace: Option<bool>,

    // Location
    pub latitude: f64,
    pub longitude: f64,

    pub photos: Json<Vec<String>>,

    // Lifecycle
    pub status: String,
    pub offered_since: Option<String>,
    pub disappeared_at: Option<DateTime<Utc>>,

    // Enrichment (written by jobs only)
    pub routes: Option<Json<RouteMap>>,
    pub ai_positives: Option<Vec<String>>,
    pub ai_negatives: Option<Vec<String>>,
    pub ai_description: Option<String>,
    pub notified_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One listing as delivered by the scraper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ListingSnapshot {
    #[builder(setter(into))]
    pub external_id: String,
    #[builder(setter(into))]
    pub url: String,
    #[builder(setter(into))]
    pub address: String,
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub postcode: Option<String>,
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub neighbourhood: Option<String>,
    pub price: i32,
    #[builder(default)]
    pub bedrooms: i32,
    #[builder(default)]
    pub living_area: i32,
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub energy_label: Option<String>,
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub object_type: Option<String>,
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub construction_year: Option<i32>,
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub description: Option<String>,
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub has_garden: Option<bool>,
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub has_balcony: Option<bool>,
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub has_roof_terrace: Option<bool>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    #[builder(default)]
    pub photos: Vec<String>,
    #[serde(default = "default_status")]
    #[builder(default = default_status(), setter(into))]
    pub status: String,
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub offered_since: Option<String>,
}

fn default_status() -> String {
    AVAILABLE_STATUS.to_string()
}

/// Whether a scraper status counts as available.
pub fn is_available_status(status: &str) -> bool {
    status == AVAILABLE_STATUS || status.is_empty()
}

impl Listing {
    pub fn is_active(&self) -> bool {
        self.disappeared_at.is_none() && is_available_status(&self.status)
    }

    pub fn has_routes(&self) -> bool {
        self.routes.is_some()
    }

    pub fn is_enriched(&self) -> bool {
        self.ai_positives.is_some()
    }

    /// Active, fully enriched and not yet announced.
    pub fn is_ready_to_notify(&self) -> bool {
        self.is_active() && self.has_routes() && self.is_enriched() && self.notified_at.is_none()
    }

    pub async fn find_by_id(external_id: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Active listings, newest first.
    pub async fn find_active(pool: &PgPool) -> Result<Vec<Self>> {
        let sql = format!(
            "SELECT * FROM listings WHERE {ACTIVE_PREDICATE} ORDER BY created_at DESC, external_id"
        );
        sqlx::query_as::<_, Listing>(&sql)
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    /// Insert or refresh a listing from the scraper.
    ///
    /// Clears `disappeared_at` so a listing that comes back is active again.
    /// Enrichment columns are left untouched.
    pub async fn upsert(snapshot: &ListingSnapshot, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO listings (
                external_id, url, address, postcode, neighbourhood, price, bedrooms,
                living_area, energy_label, object_type, construction_year, description,
                has_garden, has_balcony, has_roof_terrace, latitude, longitude, photos,
                status, offered_since
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            ON CONFLICT (external_id) DO UPDATE SET
                url = EXCLUDED.url,
                address = EXCLUDED.address,
                postcode = EXCLUDED.postcode,
                neighbourhood = EXCLUDED.neighbourhood,
                price = EXCLUDED.price,
                bedrooms = EXCLUDED.bedrooms,
                living_area = EXCLUDED.living_area,
                energy_label = EXCLUDED.energy_label,
                object_type = EXCLUDED.object_type,
                construction_year = EXCLUDED.construction_year,
                description = EXCLUDED.description,
                has_garden = EXCLUDED.has_garden,
                has_balcony = EXCLUDED.has_balcony,
                has_roof_terrace = EXCLUDED.has_roof_terrace,
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                photos = EXCLUDED.photos,
                status = EXCLUDED.status,
                offered_since = EXCLUDED.offered_since,
                disappeared_at = NULL,
                updated_at = NOW()
            "#,
        )
        .bind(&snapshot.external_id)
        .bind(&snapshot.url)
        .bind(&snapshot.address)
        .bind(&snapshot.postcode)
        .bind(&snapshot.neighbourhood)
        .bind(snapshot.price)
        .bind(snapshot.bedrooms)
        .bind(snapshot.living_area)
        .bind(&snapshot.energy_label)
        .bind(&snapshot.object_type)
        .bind(snapshot.construction_year)
        .bind(&snapshot.description)
        .bind(snapshot.has_garden)
        .bind(snapshot.has_balcony)
        .bind(snapshot.has_roof_terrace)
        .bind(snapshot.latitude)
        .bind(snapshot.longitude)
        .bind(Json(&snapshot.photos))
        .bind(&snapshot.status)
        .bind(&snapshot.offered_since)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark every present listing not in `seen_ids` as disappeared (for sync)
    pub async fn mark_disappeared_except(seen_ids: &[String], pool: &PgPool) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE listings
            SET disappeared_at = NOW(), updated_at = NOW()
            WHERE disappeared_at IS NULL
              AND external_id <> ALL($1::text[])
            "#,
        )
        .bind(seen_ids)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Active listings without routes
    pub async fn find_ids_missing_routes(pool: &PgPool) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT external_id FROM listings WHERE {ACTIVE_PREDICATE} AND routes IS NULL \
             ORDER BY created_at, external_id"
        );
        sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    /// Active listings without AI enrichment
    pub async fn find_ids_missing_enrichment(pool: &PgPool) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT external_id FROM listings WHERE {ACTIVE_PREDICATE} AND ai_positives IS NULL \
             ORDER BY created_at, external_id"
        );
        sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    /// Active listings with routes and enrichment that were never announced
    pub async fn find_ids_ready_to_notify(pool: &PgPool) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT external_id FROM listings WHERE {ACTIVE_PREDICATE} \
             AND routes IS NOT NULL AND ai_positives IS NOT NULL AND notified_at IS NULL \
             ORDER BY created_at, external_id"
        );
        sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn set_routes(external_id: &str, routes: &RouteMap, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE listings
            SET routes = $2, updated_at = NOW()
            WHERE external_id = $1
            "#,
        )
        .bind(external_id)
        .bind(Json(routes))
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_enrichment(
        external_id: &str,
        analysis: &ListingAnalysis,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE listings
            SET ai_positives = $2,
                ai_negatives = $3,
                ai_description = $4,
                updated_at = NOW()
            WHERE external_id = $1
            "#,
        )
        .bind(external_id)
        .bind(&analysis.positives)
        .bind(&analysis.negatives)
        .bind(&analysis.description)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Stamp `notified_at`. Returns false if it was already set.
    pub async fn mark_notified(external_id: &str, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE listings
            SET notified_at = NOW(), updated_at = NOW()
            WHERE external_id = $1 AND notified_at IS NULL
            "#,
        )
        .bind(external_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
