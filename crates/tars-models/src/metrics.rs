use std::time::Duration;

use crate::analysis::AgentType;
use crate::breaker::CircuitState;
use crate::recommendation::Recommendation;

/// Result of one agent invocation as seen by metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AgentOutcome<'a> {
    Success { score: f64, confidence: f64 },
    Failure { category: &'a str },
}

/// Side channel for counters and timers. Implementations must not fail and
/// must not block; nothing in the pipeline reads back from a sink.
pub trait MetricsSink: Send + Sync {
    fn record_request(&self, symbol: &str);

    fn record_agent_result(&self, agent_type: AgentType, elapsed: Duration, outcome: AgentOutcome<'_>);

    fn record_recommendation(&self, recommendation: &Recommendation);

    fn record_breaker_transition(&self, name: &str, from: CircuitState, to: CircuitState);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_request(&self, _symbol: &str) {}

    fn record_agent_result(&self, _agent_type: AgentType, _elapsed: Duration, _outcome: AgentOutcome<'_>) {}

    fn record_recommendation(&self, _recommendation: &Recommendation) {}

    fn record_breaker_transition(&self, _name: &str, _from: CircuitState, _to: CircuitState) {}
}
