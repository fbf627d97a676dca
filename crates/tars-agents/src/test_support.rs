//! Test doubles for agents, persistence and metrics.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tars_models::analysis::{AgentType, Analysis};
use tars_models::breaker::CircuitState;
use tars_models::metrics::{AgentOutcome, MetricsSink};
use tars_models::recommendation::{Action, AgentRun, Recommendation};
use tars_store::{RecommendationStore, StoreError};
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, AgentMetadata};
use crate::error::AgentError;

/// What a [`MockAgent`] returns from `analyze`.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Succeed { score: f64, confidence: f64 },
    Fail(String),
    /// Fail the first `failures` calls, then succeed.
    FailThenSucceed {
        failures: u32,
        score: f64,
        confidence: f64,
    },
}

/// Canned agent with call counters.
pub struct MockAgent {
    name: String,
    agent_type: AgentType,
    behavior: MockBehavior,
    delay: Duration,
    available: AtomicBool,
    calls: AtomicU32,
    availability_checks: AtomicU32,
}

impl MockAgent {
    pub fn new(name: &str, agent_type: AgentType, behavior: MockBehavior) -> Self {
        Self {
            name: name.to_string(),
            agent_type,
            behavior,
            delay: Duration::ZERO,
            available: AtomicBool::new(true),
            calls: AtomicU32::new(0),
            availability_checks: AtomicU32::new(0),
        }
    }

    pub fn succeeding(agent_type: AgentType, score: f64, confidence: f64) -> Self {
        Self::new(
            &format!("{agent_type}_analyst"),
            agent_type,
            MockBehavior::Succeed { score, confidence },
        )
    }

    pub fn failing(agent_type: AgentType, message: &str) -> Self {
        Self::new(
            &format!("{agent_type}_analyst"),
            agent_type,
            MockBehavior::Fail(message.to_string()),
        )
    }

    pub fn flaky(agent_type: AgentType, failures: u32, score: f64, confidence: f64) -> Self {
        Self::new(
            &format!("{agent_type}_analyst"),
            agent_type,
            MockBehavior::FailThenSucceed {
                failures,
                score,
                confidence,
            },
        )
    }

    /// Sleep this long before answering. The sleep honors cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn unavailable(self) -> Self {
        self.set_available(false);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `analyze` calls so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn availability_checks(&self) -> u32 {
        self.availability_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    fn metadata(&self) -> AgentMetadata {
        AgentMetadata {
            description: format!("mock {} agent", self.agent_type),
            version: "0.0.0".to_string(),
            required_services: vec![],
        }
    }

    async fn is_available(&self, _cancel: &CancellationToken) -> bool {
        self.availability_checks.fetch_add(1, Ordering::SeqCst);
        self.available.load(Ordering::SeqCst)
    }

    async fn analyze(&self, cancel: &CancellationToken, symbol: &str) -> Result<Analysis, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        let (score, confidence) = match &self.behavior {
            MockBehavior::Succeed { score, confidence } => (*score, *confidence),
            MockBehavior::Fail(message) => return Err(AgentError::Upstream(message.clone())),
            MockBehavior::FailThenSucceed {
                failures,
                score,
                confidence,
            } => {
                if call <= *failures {
                    return Err(AgentError::Upstream(format!("transient failure #{call}")));
                }
                (*score, *confidence)
            }
        };
        Ok(Analysis::new(
            symbol,
            self.agent_type,
            score,
            confidence,
            &format!("Mock {} analysis", self.agent_type),
        ))
    }
}

/// A store whose writes fail. `runs_only` fails just the audit trail.
pub struct FailingStore {
    fail_recommendations: bool,
    recommendation_attempts: AtomicU32,
}

impl FailingStore {
    /// Fails every write.
    pub fn new() -> Self {
        Self {
            fail_recommendations: true,
            recommendation_attempts: AtomicU32::new(0),
        }
    }

    pub fn runs_only() -> Self {
        Self {
            fail_recommendations: false,
            recommendation_attempts: AtomicU32::new(0),
        }
    }

    pub fn recommendation_attempts(&self) -> u32 {
        self.recommendation_attempts.load(Ordering::SeqCst)
    }
}

impl Default for FailingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecommendationStore for FailingStore {
    async fn create_agent_run(&self, _run: &AgentRun) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }

    async fn update_agent_run(&self, _run: &AgentRun) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }

    async fn create_recommendation(&self, _recommendation: &Recommendation) -> Result<(), StoreError> {
        self.recommendation_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_recommendations {
            Err(StoreError::Unavailable("disk full".to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct Recorded {
    requests: Vec<String>,
    agent_results: Vec<(AgentType, Result<f64, String>)>,
    recommendations: Vec<Action>,
    transitions: Vec<(String, CircuitState, CircuitState)>,
}

/// Metrics sink that keeps everything it is told.
#[derive(Default)]
pub struct RecordingMetrics {
    recorded: Mutex<Recorded>,
}

impl RecordingMetrics {
    fn with<T>(&self, f: impl FnOnce(&mut Recorded) -> T) -> T {
        f(&mut self.recorded.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn requests(&self) -> Vec<String> {
        self.with(|r| r.requests.clone())
    }

    /// Scores of successful agent results, in join order.
    pub fn agent_scores(&self) -> Vec<(AgentType, f64)> {
        self.with(|r| {
            r.agent_results
                .iter()
                .filter_map(|(t, o)| o.as_ref().ok().map(|s| (*t, *s)))
                .collect()
        })
    }

    /// Error categories of failed agent results, in join order.
    pub fn failure_categories(&self) -> Vec<(AgentType, String)> {
        self.with(|r| {
            r.agent_results
                .iter()
                .filter_map(|(t, o)| o.as_ref().err().map(|c| (*t, c.clone())))
                .collect()
        })
    }

    pub fn recommendations(&self) -> Vec<Action> {
        self.with(|r| r.recommendations.clone())
    }

    pub fn transitions(&self) -> Vec<(String, CircuitState, CircuitState)> {
        self.with(|r| r.transitions.clone())
    }
}

impl MetricsSink for RecordingMetrics {
    fn record_request(&self, symbol: &str) {
        self.with(|r| r.requests.push(symbol.to_string()));
    }

    fn record_agent_result(&self, agent_type: AgentType, _elapsed: Duration, outcome: AgentOutcome<'_>) {
        let entry = match outcome {
            AgentOutcome::Success { score, .. } => Ok(score),
            AgentOutcome::Failure { category } => Err(category.to_string()),
        };
        self.with(|r| r.agent_results.push((agent_type, entry)));
    }

    fn record_recommendation(&self, recommendation: &Recommendation) {
        self.with(|r| r.recommendations.push(recommendation.action));
    }

    fn record_breaker_transition(&self, name: &str, from: CircuitState, to: CircuitState) {
        self.with(|r| r.transitions.push((name.to_string(), from, to)));
    }
}
