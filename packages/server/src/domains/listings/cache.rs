//! In-memory projection of active listings served by the API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use sqlx::PgPool;
use tracing::debug;

use super::models::Listing;
use crate::kernel::jobs::CacheInvalidator;

/// Active listings, loaded lazily and dropped on invalidation.
pub struct ListingsCache {
    pool: PgPool,
    listings: RwLock<Option<Arc<Vec<Listing>>>>,
    /// Bumped on every invalidation so a load that raced with one is not stored.
    generation: AtomicU64,
}

impl ListingsCache {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            listings: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Cached listings, loading them from the database on a miss.
    pub async fn get(&self) -> Result<Arc<Vec<Listing>>> {
        if let Some(listings) = self.cached() {
            return Ok(listings);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let loaded = Arc::new(Listing::find_active(&self.pool).await?);
        debug!(count = loaded.len(), "loaded listings cache");

        let mut slot = self.listings.write().unwrap_or_else(|e| e.into_inner());
        if self.generation.load(Ordering::Acquire) == generation {
            *slot = Some(loaded.clone());
        }
        Ok(loaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.cached().is_some()
    }

    fn cached(&self) -> Option<Arc<Vec<Listing>>> {
        self.listings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl CacheInvalidator for ListingsCache {
    fn invalidate(&self) {
        let mut slot = self.listings.write().unwrap_or_else(|e| e.into_inner());
        self.generation.fetch_add(1, Ordering::AcqRel);
        *slot = None;
    }
}
