// TestDependencies - mock implementations for testing
//
// Provides mock services that can be injected into ServerDeps for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use super::{BaseListingAnalyzer, BaseNotifier, BaseRouteProvider, ServerDeps};
use crate::common::{
    AnalysisRequest, Coordinates, LineString, ListingAnalysis, NotificationMessage, RouteResult,
};

// =============================================================================
// Mock Route Provider
// =============================================================================

/// What the mock routing service does on each call.
#[derive(Debug, Clone)]
pub enum MockRoute {
    Found(RouteResult),
    NoRoute,
    Error(String),
}

pub struct MockRouteProvider {
    /// Scripted answers; once exhausted, `fallback` is used.
    script: Mutex<VecDeque<MockRoute>>,
    fallback: MockRoute,
    calls: Mutex<Vec<(Coordinates, Coordinates)>>,
}

impl MockRouteProvider {
    /// Every call returns a route of `minutes` minutes.
    pub fn always(minutes: i64) -> Self {
        Self::with_fallback(MockRoute::Found(Self::route(minutes)))
    }

    /// Every call finds no route.
    pub fn unreachable() -> Self {
        Self::with_fallback(MockRoute::NoRoute)
    }

    pub fn with_fallback(fallback: MockRoute) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue an answer ahead of the fallback.
    pub fn then(self, answer: MockRoute) -> Self {
        self.script.lock().unwrap().push_back(answer);
        self
    }

    pub fn route(minutes: i64) -> RouteResult {
        RouteResult {
            duration_minutes: minutes,
            geometry: LineString::new(vec![[4.89, 52.36], [4.88, 52.37]]),
        }
    }

    pub fn calls(&self) -> Vec<(Coordinates, Coordinates)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseRouteProvider for MockRouteProvider {
    async fn cycling_route(
        &self,
        from: Coordinates,
        to: Coordinates,
    ) -> Result<Option<RouteResult>> {
        self.calls.lock().unwrap().push((from, to));
        let answer = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match answer {
            MockRoute::Found(route) => Ok(Some(route)),
            MockRoute::NoRoute => Ok(None),
            MockRoute::Error(message) => Err(anyhow!(message)),
        }
    }
}

// =============================================================================
// Mock Analyzer
// =============================================================================

pub struct MockAnalyzer {
    result: Result<ListingAnalysis, String>,
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl MockAnalyzer {
    pub fn new(analysis: ListingAnalysis) -> Self {
        Self {
            result: Ok(analysis),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockAnalyzer {
    fn default() -> Self {
        Self::new(ListingAnalysis {
            positives: vec!["bright living room".to_string()],
            negatives: vec!["steep stairs".to_string()],
            description: "Two-floor apartment with a balcony.".to_string(),
        })
    }
}

#[async_trait]
impl BaseListingAnalyzer for MockAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<ListingAnalysis> {
        self.requests.lock().unwrap().push(request.clone());
        self.result.clone().map_err(|message| anyhow!(message))
    }
}

// =============================================================================
// Mock Notifier
// =============================================================================

#[derive(Default)]
pub struct MockNotifier {
    fail_with: Option<String>,
    sent: Mutex<Vec<NotificationMessage>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<NotificationMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseNotifier for MockNotifier {
    async fn send(&self, message: &NotificationMessage) -> Result<()> {
        if let Some(message) = &self.fail_with {
            return Err(anyhow!(message.clone()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// Mock services bundled for building `ServerDeps` in tests.
pub struct TestDependencies {
    pub routes: Arc<MockRouteProvider>,
    pub analyzer: Option<Arc<MockAnalyzer>>,
    pub notifier: Option<Arc<MockNotifier>>,
}

impl TestDependencies {
    /// Routes always succeed; analyzer and notifier are configured.
    pub fn new() -> Self {
        Self {
            routes: Arc::new(MockRouteProvider::always(12)),
            analyzer: Some(Arc::new(MockAnalyzer::default())),
            notifier: Some(Arc::new(MockNotifier::new())),
        }
    }

    pub fn with_routes(mut self, routes: MockRouteProvider) -> Self {
        self.routes = Arc::new(routes);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Option<MockAnalyzer>) -> Self {
        self.analyzer = analyzer.map(Arc::new);
        self
    }

    pub fn with_notifier(mut self, notifier: Option<MockNotifier>) -> Self {
        self.notifier = notifier.map(Arc::new);
        self
    }

    pub fn server_deps(&self, db_pool: PgPool) -> ServerDeps {
        ServerDeps::new(
            db_pool,
            self.routes.clone(),
            self.analyzer
                .clone()
                .map(|a| a as Arc<dyn BaseListingAnalyzer>),
            self.notifier.clone().map(|n| n as Arc<dyn BaseNotifier>),
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
