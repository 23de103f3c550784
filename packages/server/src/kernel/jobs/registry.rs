//! Job registry mapping job kinds to handlers.
//!
//! Each domain registers its handlers at startup. When the processor claims
//! a job, it looks up the handler by kind; a kind without a handler is
//! skipped rather than retried.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::job::{Job, JobKind};

/// Outcome reported by a handler that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Work was performed.
    Completed,
    /// Work does not apply (target gone, already done, feature disabled).
    Skipped,
}

/// A unit of work for one job kind.
///
/// Returning `Err` signals a retryable failure. Handlers may run more than
/// once for the same target and must detect "already done" themselves.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, job: &Job) -> Result<JobOutcome>;
}

/// Registry that maps job kinds to handlers.
///
/// # Example
///
/// ```ignore
/// let mut registry = JobRegistry::new();
/// registry.register(JobKind::ComputeRoutes, Arc::new(ComputeRoutesHandler::new(pool, routes)));
///
/// let processor = QueueProcessor::new(queue, Arc::new(registry), config);
/// ```
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for a job kind, replacing any previous one.
    pub fn register(&mut self, kind: JobKind, handler: Arc<dyn JobHandler>) -> &mut Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn get(&self, kind: &JobKind) -> Option<&Arc<dyn JobHandler>> {
        self.handlers.get(kind)
    }

    /// Check if a job kind is registered.
    pub fn is_registered(&self, kind: &JobKind) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Get all registered job kinds.
    pub fn registered_kinds(&self) -> Vec<&JobKind> {
        self.handlers.keys().collect()
    }
}

/// Thread-safe registry wrapped in Arc.
pub type SharedJobRegistry = Arc<JobRegistry>;
