// Ernest - listing sync and enrichment core
//
// This crate reconciles scraped listing snapshots against Postgres and drains
// a durable job queue that enriches them (routes, AI analysis, notifications).
//
// Job handlers are organized per-domain in domains/*/jobs/

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
