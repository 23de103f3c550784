//! Test harness with testcontainers for integration testing.
//!
//! One Postgres container is shared by the whole test binary. Every test
//! gets its own freshly migrated database inside it, because job claiming
//! is global to the `jobs` table and parallel tests would steal each
//! other's work otherwise.

use std::sync::Arc;

use anyhow::{Context, Result};
use ernest_core::domains::listings::{ListingSynchronizer, ListingsCache};
use ernest_core::kernel::jobs::{JobQueue, PostgresJobQueue};
use ernest_core::kernel::{ServerDeps, TestDependencies};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Shared test infrastructure that persists across all tests.
///
/// Holds no connections: every `#[tokio::test]` runs its own runtime and a
/// connection does not outlive the runtime that opened it.
struct SharedTestInfra {
    /// Base URL without a database name
    server_url: String,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

/// Global shared infrastructure - initialized once, reused by all tests.
static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .with_tag("16")
            .with_cmd(["-c", "max_connections=300"])
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let server_url = format!("postgresql://postgres:postgres@{}:{}", pg_host, pg_port);

        Ok(Self {
            server_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }

    /// Create and migrate an empty database for one test.
    async fn fresh_database(&self) -> Result<PgPool> {
        let name = format!("test_{}", Uuid::new_v4().simple());

        let mut admin = PgConnection::connect(&format!("{}/postgres", self.server_url))
            .await
            .context("Failed to connect to Postgres")?;
        let create = format!("CREATE DATABASE {}", name);
        (&mut admin)
            .execute(create.as_str())
            .await
            .context("Failed to create test database")?;
        admin.close().await?;

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(&format!("{}/{}", self.server_url, name))
            .await
            .context("Failed to connect to test database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(pool)
    }
}

/// Test harness that manages test infrastructure.
///
/// # Example using test-context
///
/// ```ignore
/// use test_context::test_context;
///
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &TestHarness) {
///     let queue = ctx.queue();
///     // ... test code
/// }
/// ```
pub struct TestHarness {
    /// Database pool - use this for test fixtures.
    pub db_pool: PgPool,
    /// Mock external services
    pub deps: TestDependencies,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await.expect("Failed to create test harness")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;
        let db_pool = infra.fresh_database().await?;

        Ok(Self {
            db_pool,
            deps: TestDependencies::new(),
        })
    }

    pub fn queue(&self) -> Arc<PostgresJobQueue> {
        Arc::new(PostgresJobQueue::new(self.db_pool.clone()))
    }

    pub fn dyn_queue(&self) -> Arc<dyn JobQueue> {
        self.queue()
    }

    pub fn synchronizer(&self) -> ListingSynchronizer {
        ListingSynchronizer::new(self.db_pool.clone(), self.dyn_queue())
    }

    pub fn cache(&self) -> Arc<ListingsCache> {
        Arc::new(ListingsCache::new(self.db_pool.clone()))
    }

    pub fn server_deps(&self) -> ServerDeps {
        self.deps.server_deps(self.db_pool.clone())
    }
}
