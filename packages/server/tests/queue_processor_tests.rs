//! Integration tests for the queue processor running the listing handlers
//! against a real queue with mocked external services.

mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use ernest_core::common::Destination;
use ernest_core::domains::listings::{register_listing_jobs, ListingsCache, NotifyWhenEnriched};
use ernest_core::kernel::jobs::{
    EnqueueItem, FailOutcome, Job, JobHandler, JobKind, JobOutcome, JobQueue, JobRegistry,
    JobResult, JobStatus, QueueProcessor, QueueProcessorConfig, TickOutcome, HANDLER_SKIPPED,
};
use ernest_core::kernel::{
    MockAnalyzer, MockNotifier, MockRoute, MockRouteProvider, TestDependencies,
};
use test_context::test_context;
use tokio_util::sync::CancellationToken;

use crate::common::{
    count_jobs, create_enriched_listing, create_test_listing, load_job, load_listing, snapshot,
    TestHarness,
};

const PUBLIC_ORIGIN: &str = "https://ernest.example";

fn destinations() -> Vec<Destination> {
    vec![
        Destination::new("fareharbor", 52.3599, 4.8912),
        Destination::new("airwallex", 52.37, 4.8878),
    ]
}

/// Processor with every listing handler and notification chaining.
fn listing_processor(ctx: &TestHarness, deps: &TestDependencies) -> QueueProcessor {
    let server_deps = deps.server_deps(ctx.db_pool.clone());
    let mut registry = JobRegistry::new();
    register_listing_jobs(&mut registry, &server_deps, destinations(), PUBLIC_ORIGIN);

    QueueProcessor::new(
        ctx.dyn_queue(),
        Arc::new(registry),
        QueueProcessorConfig::default(),
    )
    .with_completion_hook(Arc::new(NotifyWhenEnriched::new(
        ctx.db_pool.clone(),
        ctx.dyn_queue(),
    )))
}

/// Tick until the queue reports nothing due, collecting every outcome.
async fn drain(processor: &mut QueueProcessor) -> Vec<TickOutcome> {
    let mut outcomes = Vec::new();
    loop {
        let outcome = processor.tick().await.unwrap();
        if outcome == TickOutcome::Idle {
            return outcomes;
        }
        outcomes.push(outcome);
    }
}

struct Completes;

#[async_trait]
impl JobHandler for Completes {
    async fn execute(&self, _job: &Job) -> Result<JobOutcome> {
        Ok(JobOutcome::Completed)
    }
}

struct Panics;

#[async_trait]
impl JobHandler for Panics {
    async fn execute(&self, _job: &Job) -> Result<JobOutcome> {
        panic!("handler blew up");
    }
}

fn noop_kind() -> JobKind {
    JobKind::Other("noop".to_string())
}

// =============================================================================
// Dispatch
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn idle_when_queue_empty(ctx: &TestHarness) {
    let mut processor = listing_processor(ctx, &ctx.deps);
    assert_eq!(processor.tick().await.unwrap(), TickOutcome::Idle);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn job_without_handler_is_skipped(ctx: &TestHarness) {
    ctx.queue()
        .enqueue_many(&[EnqueueItem::new(noop_kind(), "x", 3)])
        .await
        .unwrap();
    let mut processor = listing_processor(ctx, &ctx.deps);

    let outcome = processor.tick().await.unwrap();

    assert_eq!(outcome, TickOutcome::Unhandled { kind: noop_kind() });
    let job = Job::find_by_target("x", &ctx.db_pool).await.unwrap().remove(0);
    assert_eq!(job.status, JobStatus::Skipped);
    assert!(job.last_error.unwrap().contains("no handler registered"));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn enriches_and_notifies_new_listing(ctx: &TestHarness) {
    ctx.synchronizer().sync(&[snapshot("1")]).await.unwrap();
    let mut processor = listing_processor(ctx, &ctx.deps);

    let outcomes = drain(&mut processor).await;

    // compute-routes, ai-enrich, then the chained notify
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| matches!(
        o,
        TickOutcome::Handled { result: JobResult::Completed, .. }
    )));
    assert_eq!(
        outcomes.last(),
        Some(&TickOutcome::Handled {
            kind: JobKind::Notify,
            result: JobResult::Completed,
        })
    );

    let listing = load_listing(&ctx.db_pool, "1").await.unwrap();
    let routes = listing.routes.as_ref().expect("routes stored");
    assert_eq!(routes.0.len(), 2);
    assert_eq!(routes.0["fareharbor"].duration_minutes, 12);
    assert!(listing.is_enriched());
    assert!(listing.notified_at.is_some());

    let sent = ctx.deps.notifier.as_ref().unwrap().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].links[0].url, format!("{}/?listing=1", PUBLIC_ORIGIN));

    let requests = ctx.deps.analyzer.as_ref().unwrap().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].price, 450_000);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn already_notified_listing_is_not_announced_again(ctx: &TestHarness) {
    create_enriched_listing(&ctx.db_pool, "1").await.unwrap();
    ernest_core::domains::listings::Listing::mark_notified("1", &ctx.db_pool)
        .await
        .unwrap();
    ctx.queue()
        .enqueue_many(&[EnqueueItem::new(JobKind::Notify, "1", 3)])
        .await
        .unwrap();
    let mut processor = listing_processor(ctx, &ctx.deps);

    let outcome = processor.tick().await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::Handled {
            kind: JobKind::Notify,
            result: JobResult::Skipped,
        }
    );
    assert!(ctx.deps.notifier.as_ref().unwrap().sent().is_empty());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn rerun_after_crash_still_announces_listing(ctx: &TestHarness) {
    // Enrichment was stored, then the process died before `complete`
    create_enriched_listing(&ctx.db_pool, "9").await.unwrap();
    let queue = ctx.queue();
    queue
        .enqueue_many(&[EnqueueItem::new(JobKind::AiEnrich, "9", 2)])
        .await
        .unwrap();
    queue.claim().await.unwrap().expect("claimable job");
    queue.reset_stale_jobs().await.unwrap();
    let mut processor = listing_processor(ctx, &ctx.deps);

    let outcomes = drain(&mut processor).await;

    assert_eq!(
        outcomes,
        vec![
            TickOutcome::Handled {
                kind: JobKind::AiEnrich,
                result: JobResult::Skipped,
            },
            TickOutcome::Handled {
                kind: JobKind::Notify,
                result: JobResult::Completed,
            },
        ]
    );
    assert!(load_listing(&ctx.db_pool, "9").await.unwrap().notified_at.is_some());
    assert_eq!(ctx.deps.notifier.as_ref().unwrap().sent().len(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn missing_listing_is_skipped(ctx: &TestHarness) {
    ctx.queue()
        .enqueue_many(&[EnqueueItem::new(JobKind::ComputeRoutes, "gone", 3)])
        .await
        .unwrap();
    let mut processor = listing_processor(ctx, &ctx.deps);

    let outcome = processor.tick().await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::Handled {
            kind: JobKind::ComputeRoutes,
            result: JobResult::Skipped,
        }
    );
    let job = Job::find_by_target("gone", &ctx.db_pool).await.unwrap().remove(0);
    assert_eq!(job.last_error.as_deref(), Some(HANDLER_SKIPPED));
    assert!(ctx.deps.routes.calls().is_empty());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn unconfigured_services_skip_their_jobs(ctx: &TestHarness) {
    create_test_listing(&ctx.db_pool, "1").await.unwrap();
    ctx.queue()
        .enqueue_many(&[
            EnqueueItem::new(JobKind::AiEnrich, "1", 2),
            EnqueueItem::new(JobKind::Notify, "1", 3),
        ])
        .await
        .unwrap();
    let deps = TestDependencies::new()
        .with_analyzer(None)
        .with_notifier(None);
    let mut processor = listing_processor(ctx, &deps);

    let outcomes = drain(&mut processor).await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| matches!(
        o,
        TickOutcome::Handled { result: JobResult::Skipped, .. }
    )));
    assert_eq!(count_jobs(&ctx.db_pool, JobStatus::Skipped).await.unwrap(), 2);
}

// =============================================================================
// Failures
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn handler_error_schedules_retry(ctx: &TestHarness) {
    create_test_listing(&ctx.db_pool, "1").await.unwrap();
    ctx.queue()
        .enqueue_many(&[EnqueueItem::new(JobKind::ComputeRoutes, "1", 3)])
        .await
        .unwrap();
    let deps = TestDependencies::new().with_routes(MockRouteProvider::with_fallback(
        MockRoute::Error("valhalla unavailable".to_string()),
    ));
    let mut processor = listing_processor(ctx, &deps);

    let outcome = processor.tick().await.unwrap();

    assert!(matches!(
        outcome,
        TickOutcome::Handled {
            kind: JobKind::ComputeRoutes,
            result: JobResult::Failed(FailOutcome::Retrying { .. }),
        }
    ));
    let job = Job::find_by_target("1", &ctx.db_pool).await.unwrap().remove(0);
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.last_error.unwrap().contains("valhalla unavailable"));
    assert!(!load_listing(&ctx.db_pool, "1").await.unwrap().has_routes());

    // Backoff keeps the job out of reach for now
    assert_eq!(processor.tick().await.unwrap(), TickOutcome::Idle);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn no_route_to_any_destination_fails_the_job(ctx: &TestHarness) {
    create_test_listing(&ctx.db_pool, "1").await.unwrap();
    ctx.queue()
        .enqueue_many(&[EnqueueItem::new(JobKind::ComputeRoutes, "1", 1)])
        .await
        .unwrap();
    let deps = TestDependencies::new().with_routes(MockRouteProvider::unreachable());
    let mut processor = listing_processor(ctx, &deps);

    let outcome = processor.tick().await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::Handled {
            kind: JobKind::ComputeRoutes,
            result: JobResult::Failed(FailOutcome::Exhausted),
        }
    );
    assert_eq!(deps.routes.calls().len(), 2);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn partial_routes_are_stored(ctx: &TestHarness) {
    create_test_listing(&ctx.db_pool, "1").await.unwrap();
    ctx.queue()
        .enqueue_many(&[EnqueueItem::new(JobKind::ComputeRoutes, "1", 3)])
        .await
        .unwrap();
    let deps = TestDependencies::new()
        .with_routes(MockRouteProvider::always(20).then(MockRoute::NoRoute));
    let mut processor = listing_processor(ctx, &deps);

    let outcome = processor.tick().await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::Handled {
            kind: JobKind::ComputeRoutes,
            result: JobResult::Completed,
        }
    );
    let listing = load_listing(&ctx.db_pool, "1").await.unwrap();
    let routes = listing.routes.expect("routes stored").0;
    assert!(!routes.contains_key("fareharbor"));
    assert_eq!(routes["airwallex"].duration_minutes, 20);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn failed_notification_leaves_listing_unnotified(ctx: &TestHarness) {
    create_enriched_listing(&ctx.db_pool, "1").await.unwrap();
    ctx.queue()
        .enqueue_many(&[EnqueueItem::new(JobKind::Notify, "1", 3)])
        .await
        .unwrap();
    let deps = TestDependencies::new().with_notifier(Some(MockNotifier::failing("chat not found")));
    let mut processor = listing_processor(ctx, &deps);

    let outcome = processor.tick().await.unwrap();

    assert!(matches!(
        outcome,
        TickOutcome::Handled {
            result: JobResult::Failed(FailOutcome::Retrying { .. }),
            ..
        }
    ));
    assert!(load_listing(&ctx.db_pool, "1").await.unwrap().notified_at.is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn analyzer_failure_retries_ai_enrich(ctx: &TestHarness) {
    create_test_listing(&ctx.db_pool, "1").await.unwrap();
    ctx.queue()
        .enqueue_many(&[EnqueueItem::new(JobKind::AiEnrich, "1", 2)])
        .await
        .unwrap();
    let deps =
        TestDependencies::new().with_analyzer(Some(MockAnalyzer::failing("model overloaded")));
    let mut processor = listing_processor(ctx, &deps);

    let outcome = processor.tick().await.unwrap();

    assert!(matches!(
        outcome,
        TickOutcome::Handled {
            kind: JobKind::AiEnrich,
            result: JobResult::Failed(FailOutcome::Retrying { .. }),
        }
    ));
    assert!(!load_listing(&ctx.db_pool, "1").await.unwrap().is_enriched());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn panicking_handler_fails_the_job(ctx: &TestHarness) {
    ctx.queue()
        .enqueue_many(&[EnqueueItem::new(noop_kind(), "x", 3)])
        .await
        .unwrap();
    let mut registry = JobRegistry::new();
    registry.register(noop_kind(), Arc::new(Panics));
    let mut processor = QueueProcessor::new(
        ctx.dyn_queue(),
        Arc::new(registry),
        QueueProcessorConfig::default(),
    );

    let outcome = processor.tick().await.unwrap();

    assert!(matches!(
        outcome,
        TickOutcome::Handled {
            result: JobResult::Failed(FailOutcome::Retrying { .. }),
            ..
        }
    ));
    let job = Job::find_by_target("x", &ctx.db_pool).await.unwrap().remove(0);
    assert!(job.last_error.unwrap().contains("panicked"));
}

// =============================================================================
// Cache flushing and lifecycle
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn cache_flushes_after_batch_of_completions(ctx: &TestHarness) {
    let items: Vec<EnqueueItem> = (0..3)
        .map(|i| EnqueueItem::new(noop_kind(), i.to_string(), 3))
        .collect();
    ctx.queue().enqueue_many(&items).await.unwrap();

    let cache: Arc<ListingsCache> = ctx.cache();
    cache.get().await.unwrap();

    let mut registry = JobRegistry::new();
    registry.register(noop_kind(), Arc::new(Completes));
    let config = QueueProcessorConfig {
        flush_every: 2,
        ..QueueProcessorConfig::default()
    };
    let mut processor =
        QueueProcessor::new(ctx.dyn_queue(), Arc::new(registry), config).with_cache(cache.clone());

    processor.tick().await.unwrap();
    assert!(cache.is_loaded(), "one completion is below the flush threshold");
    assert_eq!(processor.completed_since_flush(), 1);

    processor.tick().await.unwrap();
    assert!(!cache.is_loaded());
    assert_eq!(processor.completed_since_flush(), 0);

    // The last completion is flushed once the queue runs dry
    cache.get().await.unwrap();
    processor.tick().await.unwrap();
    assert!(cache.is_loaded());
    assert_eq!(processor.tick().await.unwrap(), TickOutcome::Idle);
    assert!(!cache.is_loaded());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn processor_stops_on_cancellation(ctx: &TestHarness) {
    ctx.queue()
        .enqueue_many(&[EnqueueItem::new(noop_kind(), "x", 3)])
        .await
        .unwrap();
    let mut registry = JobRegistry::new();
    registry.register(noop_kind(), Arc::new(Completes));
    let config = QueueProcessorConfig {
        idle_interval: Duration::from_millis(50),
        ..QueueProcessorConfig::default()
    };
    let shutdown = CancellationToken::new();
    let handle = QueueProcessor::new(ctx.dyn_queue(), Arc::new(registry), config)
        .spawn(shutdown.clone());

    // Wait for the job to be processed
    let queue_job = async {
        loop {
            let job = Job::find_by_target("x", &ctx.db_pool).await.unwrap().remove(0);
            if job.status == JobStatus::Completed {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    };
    let job = tokio::time::timeout(Duration::from_secs(10), queue_job)
        .await
        .expect("job should complete");

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("processor should stop")
        .unwrap();

    assert_eq!(load_job(&ctx.db_pool, job.id).await.unwrap().attempts, 1);
}
