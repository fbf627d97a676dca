use std::time::Duration;

use tars_models::analysis::AgentType;
use tars_models::breaker::CircuitState;
use tars_models::metrics::{AgentOutcome, MetricsSink};
use tars_models::recommendation::Recommendation;
use tracing::{debug, info, warn};

/// Emits every observation as a tracing event under the `tars::metrics` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMetrics;

impl MetricsSink for LogMetrics {
    fn record_request(&self, symbol: &str) {
        debug!(target: "tars::metrics", symbol = %symbol, "request");
    }

    fn record_agent_result(&self, agent_type: AgentType, elapsed: Duration, outcome: AgentOutcome<'_>) {
        let elapsed_ms = elapsed.as_millis() as u64;
        match outcome {
            AgentOutcome::Success { score, confidence } => {
                debug!(target: "tars::metrics", agent_type = %agent_type, elapsed_ms, score, confidence, "agent_success");
            }
            AgentOutcome::Failure { category } => {
                debug!(target: "tars::metrics", agent_type = %agent_type, elapsed_ms, category, "agent_failure");
            }
        }
    }

    fn record_recommendation(&self, recommendation: &Recommendation) {
        info!(
            target: "tars::metrics",
            symbol = %recommendation.symbol,
            action = %recommendation.action,
            score = recommendation.score,
            confidence = recommendation.confidence,
            "recommendation"
        );
    }

    fn record_breaker_transition(&self, name: &str, from: CircuitState, to: CircuitState) {
        if to == CircuitState::Open {
            warn!(target: "tars::metrics", breaker = %name, from = %from, "breaker_trip");
        } else {
            info!(target: "tars::metrics", breaker = %name, from = %from, to = %to, "breaker_transition");
        }
    }
}
