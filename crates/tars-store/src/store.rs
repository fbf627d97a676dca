use async_trait::async_trait;
use tars_models::recommendation::{AgentRun, Recommendation};

use crate::error::StoreError;

/// Durable sink for recommendations and the per-agent audit trail.
///
/// Agent-run writes are best effort for callers; a failed
/// `create_recommendation` means the recommendation was not delivered.
#[async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn create_agent_run(&self, run: &AgentRun) -> Result<(), StoreError>;

    async fn update_agent_run(&self, run: &AgentRun) -> Result<(), StoreError>;

    async fn create_recommendation(&self, recommendation: &Recommendation) -> Result<(), StoreError>;
}
