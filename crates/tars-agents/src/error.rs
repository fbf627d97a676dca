use std::time::Duration;

use tars_models::recommendation::MissingAgentInfo;
use tars_store::StoreError;
use thiserror::Error;

/// Failure of a single agent invocation. Never escapes the orchestrator;
/// it is folded into a `MissingAgentInfo`.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Agent response parse error: {0}")]
    Parse(String),

    #[error("Agent returned an unstructured response ({} chars)", .0.len())]
    Unstructured(String),

    #[error("Agent timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Agent cancelled")]
    Cancelled,

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("gave up after {attempts} attempt(s): {last_error}")]
    RetryExhausted {
        attempts: u32,
        last_error: Box<AgentError>,
    },

    #[error("Agent task panicked: {0}")]
    Panicked(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Short, stable label for metrics.
    pub fn category(&self) -> &'static str {
        match self {
            AgentError::Cli(_) => "cli",
            AgentError::Parse(_) => "parse",
            AgentError::Unstructured(_) => "unstructured",
            AgentError::Timeout(_) => "timeout",
            AgentError::Cancelled => "cancelled",
            AgentError::Unavailable(_) => "unavailable",
            AgentError::Upstream(_) => "upstream",
            AgentError::RetryExhausted { .. } => "retry_exhausted",
            AgentError::Panicked(_) => "panicked",
            AgentError::Json(_) => "json",
        }
    }
}

/// Request-level failure of `Orchestrator::analyze_symbol`.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("no agents available for {symbol}")]
    NoAgentsAvailable {
        symbol: String,
        missing: Vec<MissingAgentInfo>,
    },

    #[error("all agents failed for {symbol} ({} missing)", .failures.len())]
    AllAgentsFailed {
        symbol: String,
        failures: Vec<MissingAgentInfo>,
    },

    #[error("recommendation for {symbol} could not be persisted: {source}")]
    Persistence {
        symbol: String,
        #[source]
        source: StoreError,
    },
}

/// Failure of an `AccountProvider` lookup.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("account provider unavailable: {0}")]
    Unavailable(String),

    #[error("no quote for {0}")]
    NoQuote(String),
}
