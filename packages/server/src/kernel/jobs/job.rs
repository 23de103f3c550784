//! Job model for background listing enrichment.

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Maximum stored length of `last_error`, in characters.
pub const MAX_ERROR_LEN: usize = 1000;

/// Default retry budget for a newly enqueued job.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl JobStatus {
    /// Terminal jobs never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Skipped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        }
    }
}

/// Kind of work a job performs.
///
/// Stored as text so rows written by a newer deployment still load; those
/// surface as [`JobKind::Other`] and are skipped by the processor unless a
/// handler is registered for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobKind {
    ComputeRoutes,
    AiEnrich,
    Notify,
    Other(String),
}

impl JobKind {
    pub fn as_str(&self) -> &str {
        match self {
            JobKind::ComputeRoutes => "compute-routes",
            JobKind::AiEnrich => "ai-enrich",
            JobKind::Notify => "notify",
            JobKind::Other(name) => name,
        }
    }
}

impl From<String> for JobKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "compute-routes" => JobKind::ComputeRoutes,
            "ai-enrich" => JobKind::AiEnrich,
            "notify" => JobKind::Notify,
            _ => JobKind::Other(value),
        }
    }
}

impl From<&str> for JobKind {
    fn from(value: &str) -> Self {
        JobKind::from(value.to_string())
    }
}

impl From<JobKind> for String {
    fn from(kind: JobKind) -> Self {
        match kind {
            JobKind::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Job Model
// ============================================================================

/// Column list shared by every query returning a [`Job`].
pub(crate) const JOB_COLUMNS: &str = "id, job_type, target_key, status, attempts, max_attempts, \
     last_error, run_after, created_at, updated_at";

#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub job_type: JobKind,
    pub target_key: String,
    pub status: JobStatus,
    /// Number of claims so far (not failures).
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub run_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Whether another claim is allowed after the current attempt.
    pub fn has_budget(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Option<Self>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Find the pending or running job for a `(kind, target)` pair, if any.
    pub async fn find_active(kind: &JobKind, target_key: &str, pool: &PgPool) -> Result<Option<Self>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE job_type = $1 AND target_key = $2 AND status IN ('pending', 'running')"
        );
        sqlx::query_as::<_, Self>(&sql)
            .bind(kind.as_str())
            .bind(target_key)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// All jobs for a target, oldest first.
    pub async fn find_by_target(target_key: &str, pool: &PgPool) -> Result<Vec<Self>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE target_key = $1 ORDER BY created_at, id"
        );
        sqlx::query_as::<_, Self>(&sql)
            .bind(target_key)
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    /// Job counts per status, for observability.
    pub async fn count_by_status(pool: &PgPool) -> Result<Vec<(JobStatus, i64)>> {
        sqlx::query_as::<_, (JobStatus, i64)>(
            r#"
            SELECT status, COUNT(*)
            FROM jobs
            GROUP BY status
            ORDER BY status
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}

// ============================================================================
// Enqueue / outcome types
// ============================================================================

/// A request to create a job, absorbed if an active job already exists for
/// the same `(kind, target_key)`.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct EnqueueItem {
    pub kind: JobKind,
    pub target_key: String,
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: i32,
}

impl EnqueueItem {
    pub fn new(kind: JobKind, target_key: impl Into<String>, max_attempts: i32) -> Self {
        Self {
            kind,
            target_key: target_key.into(),
            max_attempts,
        }
    }
}

/// What `fail` did with a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Returned to pending; eligible again at `run_after`.
    Retrying { run_after: DateTime<Utc> },
    /// Retry budget consumed; job is terminally failed.
    Exhausted,
    /// Job was missing or not running; nothing changed.
    Ignored,
}

/// Result of the startup crash-recovery sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaleJobReport {
    pub reset: u64,
    pub failed: u64,
}

// ============================================================================
// Retry policy
// ============================================================================

/// Exponential backoff: `base * factor^(attempts - 1)`, optionally capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub factor: u32,
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            factor: 4,
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before a job that has been claimed `attempts` times may run again.
    pub fn delay_for(&self, attempts: i32) -> Duration {
        let exponent = attempts.saturating_sub(1).max(0) as u32;
        let multiplier = self.factor.checked_pow(exponent).unwrap_or(u32::MAX);
        let delay = self.base.saturating_mul(multiplier);
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// Truncate an error message to at most `max` characters.
pub fn truncate_error(message: &str, max: usize) -> String {
    match message.char_indices().nth(max) {
        Some((byte_idx, _)) => message[..byte_idx].to_string(),
        None => message.to_string(),
    }
}
