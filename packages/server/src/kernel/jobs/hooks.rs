//! Side-effect seams invoked by the queue processor.

use anyhow::Result;
use async_trait::async_trait;

use super::job::Job;

/// Drops a cached read projection so the next read recomputes it.
///
/// Called on a cadence (every few completions, or when the queue goes
/// idle), never per job.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self);
}

/// Follow-up logic run after a handler finishes a job, e.g. enqueueing a
/// dependent job once all prerequisites for a target exist.
///
/// Runs for `Completed` and handler-returned `Skipped` outcomes, so it must
/// re-check target state rather than assume the job did anything. Errors
/// are logged by the processor; they never affect the finished job.
#[async_trait]
pub trait CompletionHook: Send + Sync {
    async fn on_completed(&self, job: &Job) -> Result<()>;
}
