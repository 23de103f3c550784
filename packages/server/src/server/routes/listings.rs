use anyhow::Context;
use axum::{
    extract::Extension,
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};

use crate::domains::listings::{ListingSnapshot, SyncResult};
use crate::kernel::jobs::CacheInvalidator;
use crate::server::app::AppState;
use crate::server::error::ApiError;

/// Active listings from the in-memory projection.
pub async fn list_listings_handler(
    Extension(state): Extension<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let listings = state.cache.get().await?;
    let body = serde_json::to_vec(listings.as_slice()).context("failed to serialize listings")?;

    Ok(([(header::CONTENT_TYPE, "application/json")], body))
}

/// Accept a scraper snapshot and reconcile it.
pub async fn sync_listings_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(snapshot): Json<Vec<ListingSnapshot>>,
) -> Result<Json<SyncResult>, ApiError> {
    let Some(expected) = state.sync_token.as_deref() else {
        return Err(ApiError::SyncDisabled);
    };

    if bearer_token(&headers) != Some(expected) {
        return Err(ApiError::Unauthorized);
    }

    let result = state.synchronizer.sync(&snapshot).await?;
    state.cache.invalidate();

    Ok(Json(result))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}
