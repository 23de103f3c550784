//! Job infrastructure for background listing enrichment.
//!
//! This module provides the kernel-level infrastructure for job execution:
//! - [`PostgresJobQueue`] - Database-backed job store behind the [`JobQueue`] trait
//! - [`JobRegistry`] - Maps each [`JobKind`] to its [`JobHandler`]
//! - [`QueueProcessor`] - Long-running service that claims and executes jobs
//! - [`Job`] - Job model and read queries
//!
//! # Architecture
//!
//! ```text
//! ListingSynchronizer / CompletionHook
//!     │
//!     └─► JobQueue.enqueue_many()  (idempotent per (kind, target))
//!
//! QueueProcessor
//!     │
//!     ├─► JobQueue.claim()          (FOR UPDATE SKIP LOCKED)
//!     ├─► JobRegistry → JobHandler.execute(job)
//!     └─► complete / skip / fail    (fail applies backoff or terminates)
//! ```
//!
//! Domain handlers live in their domains; this module only provides the
//! infrastructure.

mod hooks;
mod job;
mod processor;
mod queue;
mod registry;

pub use hooks::{CacheInvalidator, CompletionHook};
pub use job::{
    truncate_error, EnqueueItem, FailOutcome, Job, JobKind, JobStatus, RetryPolicy,
    StaleJobReport, DEFAULT_MAX_ATTEMPTS, MAX_ERROR_LEN,
};
pub use processor::{
    JobResult, QueueProcessor, QueueProcessorConfig, TickOutcome, HANDLER_SKIPPED,
};
pub use queue::{JobQueue, JobQueueConfig, PostgresJobQueue, CRASHED_ON_FINAL_ATTEMPT};
pub use registry::{JobHandler, JobOutcome, JobRegistry, SharedJobRegistry};
