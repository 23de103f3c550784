use std::collections::BTreeMap;
use std::time::Duration;

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::kernel::jobs::Job;
use crate::server::app::AppState;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: &'static str,
    database: DbStatus,
    pool: PoolStats,
    /// Job counts keyed by status; absent when the database is down.
    #[serde(skip_serializing_if = "Option::is_none")]
    jobs: Option<BTreeMap<&'static str, i64>>,
    listings_cached: bool,
}

#[derive(Serialize)]
pub struct DbStatus {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    size: u32,
    idle: usize,
    max: u32,
}

/// Liveness plus a queue backlog summary.
///
/// 200 when the database answers within five seconds, 503 otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let jobs = tokio::time::timeout(CHECK_TIMEOUT, Job::count_by_status(&state.db_pool)).await;

    let (database, jobs) = match jobs {
        Ok(Ok(counts)) => {
            let by_status = counts
                .into_iter()
                .map(|(status, count)| (status.as_str(), count))
                .collect();
            (DbStatus { ok: true, error: None }, Some(by_status))
        }
        Ok(Err(e)) => (
            DbStatus {
                ok: false,
                error: Some(format!("{:#}", e)),
            },
            None,
        ),
        Err(_) => (
            DbStatus {
                ok: false,
                error: Some(format!("no answer within {}s", CHECK_TIMEOUT.as_secs())),
            },
            None,
        ),
    };

    let status_code = if database.ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let pool = PoolStats {
        size: state.db_pool.size(),
        idle: state.db_pool.num_idle(),
        max: state.db_pool.options().get_max_connections(),
    };

    (
        status_code,
        Json(HealthResponse {
            status: if database.ok { "healthy" } else { "unhealthy" },
            database,
            pool,
            jobs,
            listings_cached: state.cache.is_loaded(),
        }),
    )
}
