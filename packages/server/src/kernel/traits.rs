// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Business logic (like "which listings need routes") lives in domain handlers
// that use these traits.
//
// Naming convention: Base* for trait names (e.g., BaseRouteProvider, BaseNotifier)

use anyhow::Result;
use async_trait::async_trait;

use crate::common::{
    AnalysisRequest, Coordinates, ListingAnalysis, NotificationMessage, RouteResult,
};

// =============================================================================
// Routing Trait
// =============================================================================

#[async_trait]
pub trait BaseRouteProvider: Send + Sync {
    /// Cycling route between two points.
    ///
    /// `Ok(None)` means the routing service answered but produced no route
    /// (unreachable, no shape). `Err` is reserved for transport failures.
    async fn cycling_route(&self, from: Coordinates, to: Coordinates)
        -> Result<Option<RouteResult>>;
}

// =============================================================================
// Analysis Trait
// =============================================================================

#[async_trait]
pub trait BaseListingAnalyzer: Send + Sync {
    /// Summarize a listing into positives, negatives and a plain description.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<ListingAnalysis>;
}

// =============================================================================
// Notification Trait
// =============================================================================

#[async_trait]
pub trait BaseNotifier: Send + Sync {
    /// Deliver a rendered notification. An error means nothing was delivered
    /// or delivery was partial; callers may retry.
    async fn send(&self, message: &NotificationMessage) -> Result<()>;
}
