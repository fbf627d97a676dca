use std::sync::Arc;
use std::time::{Duration, Instant};

use tars_models::analysis::Analysis;
use tars_models::metrics::{AgentOutcome, MetricsSink};
use tars_models::recommendation::{AgentRun, MissingAgentInfo, Recommendation};
use tars_store::RecommendationStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::Agent;
use crate::error::{AgentError, AnalysisError};
use crate::synthesizer::Synthesizer;

/// Fans a symbol out to agents, joins their analyses and persists the
/// synthesized recommendation.
pub struct Orchestrator {
    synthesizer: Synthesizer,
    store: Arc<dyn RecommendationStore>,
    metrics: Arc<dyn MetricsSink>,
    agent_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        synthesizer: Synthesizer,
        store: Arc<dyn RecommendationStore>,
        metrics: Arc<dyn MetricsSink>,
        agent_timeout: Duration,
    ) -> Self {
        Self {
            synthesizer,
            store,
            metrics,
            agent_timeout,
        }
    }

    pub fn agent_timeout(&self) -> Duration {
        self.agent_timeout
    }

    /// Analyze `symbol` with every available agent and return the persisted
    /// recommendation.
    ///
    /// Each agent runs in its own task under a child of `cancel` with its own
    /// timeout. Agent failures become `MissingAgentInfo` entries; only
    /// `NoAgentsAvailable`, `AllAgentsFailed` and `Persistence` escape.
    pub async fn analyze_symbol(
        &self,
        cancel: &CancellationToken,
        symbol: &str,
        agents: &[Arc<dyn Agent>],
    ) -> Result<Recommendation, AnalysisError> {
        let start = Instant::now();
        self.metrics.record_request(symbol);
        info!(symbol = %symbol, agents = agents.len(), "Starting analysis");

        // 1. Availability
        let mut available = Vec::new();
        let mut missing = Vec::new();
        for agent in agents {
            if agent.is_available(cancel).await {
                available.push(Arc::clone(agent));
            } else {
                warn!(symbol = %symbol, agent = %agent.name(), "Agent unavailable");
                missing.push(MissingAgentInfo::unavailable(agent.agent_type(), agent.name()));
            }
        }
        if available.is_empty() {
            return Err(AnalysisError::NoAgentsAvailable {
                symbol: symbol.to_string(),
                missing,
            });
        }

        // 2. Fan-out
        let mut tasks = Vec::with_capacity(available.len());
        for agent in available {
            let run = AgentRun::start(symbol, agent.name(), agent.agent_type());
            if let Err(e) = self.store.create_agent_run(&run).await {
                warn!(agent = %agent.name(), error = %e, "Failed to record agent run start");
            }

            let task_agent = Arc::clone(&agent);
            let task_symbol = symbol.to_string();
            let child = cancel.child_token();
            let timeout = self.agent_timeout;
            let handle = tokio::spawn(async move {
                let agent_start = Instant::now();
                let result = run_agent(task_agent.as_ref(), &child, &task_symbol, timeout).await;
                (result, agent_start.elapsed())
            });
            tasks.push((agent, run, handle));
        }

        // 3. Join
        let mut analyses: Vec<Analysis> = Vec::new();
        for (agent, mut run, handle) in tasks {
            let (result, elapsed) = match handle.await {
                Ok(joined) => joined,
                Err(e) => {
                    error!(agent = %agent.name(), error = %e, "Agent task panicked");
                    (Err(AgentError::Panicked(e.to_string())), Duration::ZERO)
                }
            };
            let elapsed_ms = elapsed.as_millis() as u64;

            match result {
                Ok(analysis) => {
                    info!(agent = %agent.name(), score = analysis.score, confidence = analysis.confidence, elapsed_ms, "Agent succeeded");
                    run.complete(analysis.score, analysis.confidence, elapsed_ms);
                    self.metrics.record_agent_result(
                        agent.agent_type(),
                        elapsed,
                        AgentOutcome::Success {
                            score: analysis.score,
                            confidence: analysis.confidence,
                        },
                    );
                    analyses.push(analysis);
                }
                Err(e) => {
                    warn!(agent = %agent.name(), error = %e, elapsed_ms, "Agent failed");
                    run.fail(&e, elapsed_ms);
                    self.metrics.record_agent_result(
                        agent.agent_type(),
                        elapsed,
                        AgentOutcome::Failure {
                            category: e.category(),
                        },
                    );
                    missing.push(MissingAgentInfo::failed(agent.agent_type(), agent.name(), &e));
                }
            }

            if let Err(e) = self.store.update_agent_run(&run).await {
                warn!(agent = %agent.name(), error = %e, "Failed to record agent run result");
            }
        }

        if analyses.is_empty() {
            return Err(AnalysisError::AllAgentsFailed {
                symbol: symbol.to_string(),
                failures: missing,
            });
        }

        // 4. Synthesize and persist
        let recommendation = self.synthesizer.synthesize(symbol, &analyses, missing).await;
        self.store
            .create_recommendation(&recommendation)
            .await
            .map_err(|source| AnalysisError::Persistence {
                symbol: symbol.to_string(),
                source,
            })?;
        self.metrics.record_recommendation(&recommendation);

        info!(
            symbol = %symbol,
            action = %recommendation.action,
            score = recommendation.score,
            confidence = recommendation.confidence,
            completeness = recommendation.data_completeness,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Analysis complete"
        );
        Ok(recommendation)
    }
}

/// One agent invocation bounded by `timeout` and by the parent cancellation.
/// A timeout cancels only this agent's token.
async fn run_agent(
    agent: &dyn Agent,
    cancel: &CancellationToken,
    symbol: &str,
    timeout: Duration,
) -> Result<Analysis, AgentError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        outcome = tokio::time::timeout(timeout, agent.analyze(cancel, symbol)) => match outcome {
            Ok(result) => result,
            Err(_) => {
                debug!(agent = %agent.name(), timeout_ms = timeout.as_millis() as u64, "Agent timed out");
                cancel.cancel();
                Err(AgentError::Timeout(timeout))
            }
        },
    }
}
