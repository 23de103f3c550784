pub mod cache;
pub mod jobs;
pub mod models;
pub mod sync;

pub use cache::ListingsCache;
pub use jobs::{register_listing_jobs, NotifyWhenEnriched};
pub use models::{Listing, ListingSnapshot, RouteMap};
pub use sync::{ListingSynchronizer, SyncResult};
