use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tars_models::analysis::{AgentType, Analysis};
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;

/// Descriptive information about an agent implementation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentMetadata {
    pub description: String,
    pub version: String,
    /// External services the agent depends on (e.g. "claude-cli", "newsapi").
    pub required_services: Vec<String>,
}

/// An independent analysis provider. Mockable for testing.
///
/// `cancel` is the per-request token handed down by the orchestrator;
/// implementations should stop work promptly once it fires.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn agent_type(&self) -> AgentType;

    fn metadata(&self) -> AgentMetadata;

    async fn is_available(&self, cancel: &CancellationToken) -> bool;

    async fn analyze(&self, cancel: &CancellationToken, symbol: &str) -> Result<Analysis, AgentError>;
}
