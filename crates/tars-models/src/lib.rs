pub mod account;
pub mod analysis;
pub mod breaker;
pub mod config;
pub mod metrics;
pub mod recommendation;

pub use account::{Account, Position, Quote};
pub use analysis::{
    normalize_confidence, normalize_score, AgentType, Analysis, AnalysisPayload,
    EXPECTED_AGENT_COUNT,
};
pub use breaker::{BreakerCounts, CircuitState};
pub use config::{
    AccountConfig, AgentConfig, AgentWeights, BreakerConfig, ClaudeConfig, HealthConfig,
    OrchestratorConfig, RetryConfig, SizingConfig, StoreConfig, StrategyConfig, SynthesisConfig,
    TarsConfig,
};
pub use metrics::{AgentOutcome, MetricsSink, NoopMetrics};
pub use recommendation::{
    Action, AgentRun, AgentRunStatus, MissingAgentInfo, Recommendation, RecommendationStatus,
};
