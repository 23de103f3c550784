//! Queue processor service for draining the job queue.
//!
//! The `QueueProcessor` is a background service that:
//! - Claims one job at a time from the queue
//! - Dispatches it to the handler registered for its kind
//! - Records the outcome (completed/skipped/failed with backoff)
//! - Sleeps a per-kind rate limit between jobs
//! - Flushes the read cache every few completions or when idle
//!
//! # Architecture
//!
//! ```text
//! QueueProcessor
//!     │
//!     ├─► claim() ── none ──► flush cache if dirty, sleep idle_interval
//!     ├─► JobRegistry lookup ── missing ──► skip (not retried)
//!     ├─► JobHandler.execute(job)
//!     │       ├─► Completed ──► complete + CompletionHook
//!     │       ├─► Skipped   ──► skip + CompletionHook
//!     │       └─► Err       ──► fail (queue applies backoff)
//!     └─► sleep rate limit for the job's kind
//! ```
//!
//! The loop is sequential: the next claim only happens after the
//! previous outcome is persisted. Scale out by running more processes.
//!
//! # Example
//!
//! ```ignore
//! let shutdown = CancellationToken::new();
//! queue.reset_stale_jobs().await?;
//! let handle = QueueProcessor::new(queue, registry, QueueProcessorConfig::default())
//!     .with_cache(cache)
//!     .spawn(shutdown.clone());
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::hooks::{CacheInvalidator, CompletionHook};
use super::job::{FailOutcome, Job, JobKind};
use super::queue::JobQueue;
use super::registry::{JobOutcome, SharedJobRegistry};

/// Reason recorded when a handler reports the job as not applicable.
pub const HANDLER_SKIPPED: &str = "handler returned skipped";

/// Configuration for the queue processor.
#[derive(Debug, Clone)]
pub struct QueueProcessorConfig {
    /// How long to wait when no job is due
    pub idle_interval: Duration,
    /// How long to wait after the loop itself hit an error
    pub error_cooldown: Duration,
    /// Flush the cache after this many completions
    pub flush_every: u32,
    /// Delay after a job whose kind has no explicit rate limit
    pub default_rate_limit: Duration,
    /// Delay after each job, per kind
    pub rate_limits: HashMap<JobKind, Duration>,
}

impl Default for QueueProcessorConfig {
    fn default() -> Self {
        let rate_limits = HashMap::from([
            (JobKind::ComputeRoutes, Duration::from_millis(200)),
            (JobKind::AiEnrich, Duration::from_millis(500)),
            (JobKind::Notify, Duration::from_secs(1)),
        ]);

        Self {
            idle_interval: Duration::from_secs(5),
            error_cooldown: Duration::from_secs(5),
            flush_every: 5,
            default_rate_limit: Duration::from_millis(200),
            rate_limits,
        }
    }
}

impl QueueProcessorConfig {
    pub fn rate_limit_for(&self, kind: &JobKind) -> Duration {
        self.rate_limits
            .get(kind)
            .copied()
            .unwrap_or(self.default_rate_limit)
    }
}

/// What happened to a claimed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Completed,
    Skipped,
    Failed(FailOutcome),
}

/// Result of one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was due.
    Idle,
    /// A job was claimed but no handler is registered for its kind.
    Unhandled { kind: JobKind },
    /// A job ran through its handler.
    Handled { kind: JobKind, result: JobResult },
}

/// Background service that drains the job queue.
pub struct QueueProcessor {
    queue: Arc<dyn JobQueue>,
    registry: SharedJobRegistry,
    config: QueueProcessorConfig,
    cache: Option<Arc<dyn CacheInvalidator>>,
    completion_hook: Option<Arc<dyn CompletionHook>>,
    completed_since_flush: u32,
}

impl QueueProcessor {
    /// Create a new queue processor.
    pub fn new(
        queue: Arc<dyn JobQueue>,
        registry: SharedJobRegistry,
        config: QueueProcessorConfig,
    ) -> Self {
        Self {
            queue,
            registry,
            config,
            cache: None,
            completion_hook: None,
            completed_since_flush: 0,
        }
    }

    /// Invalidate this cache on the flush cadence.
    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Run this hook after every job its handler completed or skipped.
    pub fn with_completion_hook(mut self, hook: Arc<dyn CompletionHook>) -> Self {
        self.completion_hook = Some(hook);
        self
    }

    pub fn config(&self) -> &QueueProcessorConfig {
        &self.config
    }

    /// Completions not yet followed by a cache flush.
    pub fn completed_since_flush(&self) -> u32 {
        self.completed_since_flush
    }

    /// Perform one iteration: claim at most one job and persist its outcome.
    ///
    /// Handler errors are recorded on the job and never returned. An `Err`
    /// here means the queue itself could not be reached.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let Some(job) = self.queue.claim().await? else {
            if self.completed_since_flush > 0 {
                self.flush();
            }
            return Ok(TickOutcome::Idle);
        };

        let Some(handler) = self.registry.get(&job.job_type).cloned() else {
            let reason = format!("no handler registered for job type {}", job.job_type);
            warn!(job_id = %job.id, job_type = %job.job_type, "skipping job without handler");
            self.queue.skip(job.id, &reason).await?;
            return Ok(TickOutcome::Unhandled { kind: job.job_type });
        };

        debug!(job_id = %job.id, job_type = %job.job_type, target_key = %job.target_key, "executing job");

        // Run on its own task so a panicking handler fails the job instead
        // of taking the loop down with it.
        let task_job = job.clone();
        let outcome = tokio::spawn(async move { handler.execute(&task_job).await })
            .await
            .unwrap_or_else(|join_err| Err(anyhow!("handler panicked: {}", join_err)));

        let result = match outcome {
            Ok(JobOutcome::Completed) => {
                self.queue.complete(job.id).await?;
                self.completed_since_flush += 1;
                info!(job_type = %job.job_type, target_key = %job.target_key, "job completed");
                self.run_completion_hook(&job).await;
                JobResult::Completed
            }
            Ok(JobOutcome::Skipped) => {
                self.queue.skip(job.id, HANDLER_SKIPPED).await?;
                info!(job_type = %job.job_type, target_key = %job.target_key, "job skipped");
                // A re-run after a crash skips work it already did; chaining still applies
                self.run_completion_hook(&job).await;
                JobResult::Skipped
            }
            Err(e) => {
                let message = format!("{:#}", e);
                let fail_outcome = self.queue.fail(job.id, &message).await?;
                match &fail_outcome {
                    FailOutcome::Retrying { run_after } => warn!(
                        job_type = %job.job_type,
                        target_key = %job.target_key,
                        attempt = job.attempts,
                        retry_at = %run_after,
                        error = %message,
                        "job failed, will retry"
                    ),
                    FailOutcome::Exhausted => error!(
                        job_type = %job.job_type,
                        target_key = %job.target_key,
                        attempt = job.attempts,
                        error = %message,
                        "job failed permanently"
                    ),
                    FailOutcome::Ignored => warn!(
                        job_id = %job.id,
                        error = %message,
                        "job failed but was no longer running"
                    ),
                }
                JobResult::Failed(fail_outcome)
            }
        };

        if self.completed_since_flush >= self.config.flush_every {
            self.flush();
        }

        Ok(TickOutcome::Handled {
            kind: job.job_type,
            result,
        })
    }

    /// Run until the token is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            flush_every = self.config.flush_every,
            idle_interval_ms = self.config.idle_interval.as_millis() as u64,
            kinds = ?self.registry.registered_kinds(),
            "queue processor started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let delay = match self.tick().await {
                Ok(TickOutcome::Idle) => self.config.idle_interval,
                Ok(TickOutcome::Unhandled { .. }) => Duration::ZERO,
                Ok(TickOutcome::Handled { kind, .. }) => self.config.rate_limit_for(&kind),
                Err(e) => {
                    error!(error = %format!("{:#}", e), "queue processor error, cooling down");
                    self.config.error_cooldown
                }
            };

            if delay.is_zero() {
                continue;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if self.completed_since_flush > 0 {
            self.flush();
        }

        info!("queue processor stopped");
    }

    /// Start the processor as a detached background task.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    fn flush(&mut self) {
        if let Some(cache) = &self.cache {
            cache.invalidate();
            debug!(completed = self.completed_since_flush, "flushed cache");
        }
        self.completed_since_flush = 0;
    }

    async fn run_completion_hook(&self, job: &Job) {
        let Some(hook) = &self.completion_hook else {
            return;
        };

        if let Err(e) = hook.on_completed(job).await {
            warn!(
                job_id = %job.id,
                job_type = %job.job_type,
                error = %format!("{:#}", e),
                "completion hook failed"
            );
        }
    }
}
