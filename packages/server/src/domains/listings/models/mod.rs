pub mod listing;

pub use listing::{is_available_status, Listing, ListingSnapshot, RouteMap, AVAILABLE_STATUS};
