//! Kernel module - server infrastructure and dependencies.

pub mod anthropic_client;
pub mod deps;
pub mod jobs;
pub mod lru_cache;
pub mod telegram_client;
pub mod test_dependencies;
pub mod traits;
pub mod valhalla_client;

pub use anthropic_client::{AnalyzerError, AnthropicClient, DEFAULT_ANTHROPIC_MODEL};
pub use deps::ServerDeps;
pub use lru_cache::LruCache;
pub use telegram_client::TelegramClient;
pub use test_dependencies::{MockAnalyzer, MockNotifier, MockRoute, MockRouteProvider, TestDependencies};
pub use traits::*;
pub use valhalla_client::{ValhallaClient, DEFAULT_VALHALLA_URL, ROUTE_CACHE_CAPACITY};
