use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::common::{Coordinates, Destination};
use crate::domains::listings::models::{Listing, RouteMap};
use crate::kernel::jobs::{Job, JobHandler, JobOutcome};
use crate::kernel::BaseRouteProvider;

/// Pause between routing calls for the same listing.
const ROUTE_CALL_PAUSE: Duration = Duration::from_millis(200);

/// Computes cycling routes from a listing to every destination.
pub struct ComputeRoutesHandler {
    pool: PgPool,
    routes: Arc<dyn BaseRouteProvider>,
    destinations: Vec<Destination>,
    pause: Duration,
}

impl ComputeRoutesHandler {
    pub fn new(
        pool: PgPool,
        routes: Arc<dyn BaseRouteProvider>,
        destinations: Vec<Destination>,
    ) -> Self {
        Self {
            pool,
            routes,
            destinations,
            pause: ROUTE_CALL_PAUSE,
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }
}

#[async_trait]
impl JobHandler for ComputeRoutesHandler {
    async fn execute(&self, job: &Job) -> Result<JobOutcome> {
        let Some(listing) = Listing::find_by_id(&job.target_key, &self.pool).await? else {
            return Ok(JobOutcome::Skipped);
        };

        if listing.has_routes() {
            return Ok(JobOutcome::Skipped);
        }

        let from = Coordinates::new(listing.latitude, listing.longitude);
        let mut routes = RouteMap::new();

        for (i, destination) in self.destinations.iter().enumerate() {
            if i > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }

            match self.routes.cycling_route(from, destination.location).await? {
                Some(route) => {
                    routes.insert(destination.name.clone(), route);
                }
                None => warn!(
                    external_id = %listing.external_id,
                    destination = %destination.name,
                    "no route found"
                ),
            }
        }

        if routes.is_empty() {
            bail!(
                "routing service returned no route for any of {} destinations",
                self.destinations.len()
            );
        }

        debug!(external_id = %listing.external_id, count = routes.len(), "storing routes");
        Listing::set_routes(&listing.external_id, &routes, &self.pool).await?;

        Ok(JobOutcome::Completed)
    }
}
