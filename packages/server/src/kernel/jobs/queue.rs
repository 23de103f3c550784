//! PostgreSQL-backed job queue implementation.
//!
//! The queue owns every job state transition. Claiming uses
//! `FOR UPDATE SKIP LOCKED` so any number of processes can poll the same
//! table without handing one job to two workers.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::job::{
    truncate_error, EnqueueItem, FailOutcome, Job, JobKind, JobStatus, RetryPolicy,
    StaleJobReport, JOB_COLUMNS, MAX_ERROR_LEN,
};

/// Rows per multi-row insert; keeps us far below the bind parameter limit.
const ENQUEUE_CHUNK_SIZE: usize = 1000;

/// Message recorded on jobs that were running on their last attempt when
/// the previous process died.
pub const CRASHED_ON_FINAL_ATTEMPT: &str = "process crashed during final attempt";

/// Trait for job queue operations.
///
/// Implementations persist jobs and perform atomic state transitions.
/// They know nothing about what a job does.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Insert jobs, silently absorbing any whose `(kind, target_key)` already
    /// has a pending or running job. Returns the number inserted.
    async fn enqueue_many(&self, items: &[EnqueueItem]) -> Result<u64>;

    /// Claim the oldest due pending job, moving it to `running` and
    /// incrementing its attempt count.
    async fn claim(&self) -> Result<Option<Job>>;

    /// Mark a running job as completed. No-op in any other state.
    async fn complete(&self, job_id: Uuid) -> Result<()>;

    /// Mark a job as skipped (terminal, not retried).
    async fn skip(&self, job_id: Uuid, reason: &str) -> Result<()>;

    /// Record a failure: back to pending with backoff while budget remains,
    /// otherwise terminally failed.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<FailOutcome>;

    /// Resolve jobs left running by a previous process. Must run before any
    /// claiming starts.
    async fn reset_stale_jobs(&self) -> Result<StaleJobReport>;
}

/// Retry configuration for the queue.
#[derive(Debug, Clone, Default)]
pub struct JobQueueConfig {
    pub default_policy: RetryPolicy,
    pub policies: HashMap<JobKind, RetryPolicy>,
}

impl JobQueueConfig {
    /// Override the backoff curve for one job kind.
    pub fn with_policy(mut self, kind: JobKind, policy: RetryPolicy) -> Self {
        self.policies.insert(kind, policy);
        self
    }

    pub fn policy_for(&self, kind: &JobKind) -> RetryPolicy {
        self.policies
            .get(kind)
            .copied()
            .unwrap_or(self.default_policy)
    }
}

/// PostgreSQL-backed job queue implementation.
#[derive(Clone)]
pub struct PostgresJobQueue {
    pool: PgPool,
    config: JobQueueConfig,
}

impl PostgresJobQueue {
    /// Create a new PostgreSQL job queue with the default retry policy.
    pub fn new(pool: PgPool) -> Self {
        Self::with_config(pool, JobQueueConfig::default())
    }

    /// Create with custom retry configuration.
    pub fn with_config(pool: PgPool, config: JobQueueConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &JobQueueConfig {
        &self.config
    }

    async fn insert_chunk(&self, items: &[&EnqueueItem]) -> Result<u64> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO jobs (id, job_type, target_key, max_attempts) ");

        // v7 ids are monotonic within the process, so rows from one batch
        // share created_at but still claim in insertion order
        builder.push_values(items, |mut row, item| {
            row.push_bind(Uuid::now_v7())
                .push_bind(item.kind.as_str())
                .push_bind(&item.target_key)
                .push_bind(item.max_attempts);
        });

        builder.push(
            " ON CONFLICT (job_type, target_key) WHERE status IN ('pending', 'running') DO NOTHING",
        );

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue_many(&self, items: &[EnqueueItem]) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }

        // Duplicates inside one batch are absorbed here rather than relying
        // on the conflict clause.
        let mut seen = HashSet::new();
        let unique: Vec<&EnqueueItem> = items
            .iter()
            .filter(|item| seen.insert((item.kind.as_str().to_string(), item.target_key.clone())))
            .collect();

        let mut inserted = 0;
        for chunk in unique.chunks(ENQUEUE_CHUNK_SIZE) {
            inserted += self
                .insert_chunk(chunk)
                .await
                .context("failed to enqueue jobs")?;
        }

        debug!(requested = items.len(), inserted, "enqueued jobs");
        Ok(inserted)
    }

    async fn claim(&self) -> Result<Option<Job>> {
        let sql = format!(
            r#"
            UPDATE jobs
            SET status = 'running',
                attempts = attempts + 1,
                updated_at = NOW()
            WHERE id = (
                SELECT id
                FROM jobs
                WHERE status = 'pending' AND run_after <= NOW()
                ORDER BY created_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        );

        let job = sqlx::query_as::<_, Job>(&sql)
            .fetch_optional(&self.pool)
            .await
            .context("failed to claim job")?;

        if let Some(job) = &job {
            debug!(
                job_id = %job.id,
                job_type = %job.job_type,
                target_key = %job.target_key,
                attempt = job.attempts,
                "claimed job"
            );
        }

        Ok(job)
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed',
                updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(job_id = %job_id, "complete ignored, job not running");
        }

        Ok(())
    }

    async fn skip(&self, job_id: Uuid, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'skipped',
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'running')
            "#,
        )
        .bind(job_id)
        .bind(truncate_error(reason, MAX_ERROR_LEN))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<FailOutcome> {
        let truncated = truncate_error(error, MAX_ERROR_LEN);
        let mut tx = self.pool.begin().await?;

        // Lock the row so a concurrent fail/complete can't interleave
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 FOR UPDATE");
        let job = sqlx::query_as::<_, Job>(&sql)
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(job) = job else {
            warn!(job_id = %job_id, "fail ignored, job not found");
            return Ok(FailOutcome::Ignored);
        };

        if job.status != JobStatus::Running {
            debug!(job_id = %job_id, status = job.status.as_str(), "fail ignored, job not running");
            return Ok(FailOutcome::Ignored);
        }

        let outcome = if job.has_budget() {
            let delay = self.config.policy_for(&job.job_type).delay_for(job.attempts);

            let run_after = sqlx::query_scalar::<_, DateTime<Utc>>(
                r#"
                UPDATE jobs
                SET status = 'pending',
                    last_error = $2,
                    run_after = NOW() + make_interval(secs => $3),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING run_after
                "#,
            )
            .bind(job_id)
            .bind(&truncated)
            .bind(delay.as_secs_f64())
            .fetch_one(&mut *tx)
            .await?;

            FailOutcome::Retrying { run_after }
        } else {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'failed',
                    last_error = $2,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(job_id)
            .bind(&truncated)
            .execute(&mut *tx)
            .await?;

            FailOutcome::Exhausted
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn reset_stale_jobs(&self) -> Result<StaleJobReport> {
        let mut tx = self.pool.begin().await?;

        // Budget left: undo the wasted attempt and try again
        let reset = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                attempts = GREATEST(0, attempts - 1),
                updated_at = NOW()
            WHERE status = 'running' AND attempts < max_attempts
            "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // Whatever is still running crashed on its final attempt
        let failed = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed',
                last_error = $1,
                updated_at = NOW()
            WHERE status = 'running'
            "#,
        )
        .bind(CRASHED_ON_FINAL_ATTEMPT)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await.context("failed to reset stale jobs")?;

        if reset > 0 || failed > 0 {
            info!(reset, failed, "recovered stale jobs from previous run");
        }

        Ok(StaleJobReport { reset, failed })
    }
}
