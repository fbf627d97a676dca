use async_trait::async_trait;
use serde_json::Value;
use tars_models::analysis::{AgentType, Analysis};
use tars_models::config::{AgentConfig, ClaudeConfig};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agent::{Agent, AgentMetadata};
use crate::claude_cli::{check_cli_available, ClaudeCli};
use crate::error::AgentError;
use crate::parser::{into_analysis, parse_payload};
use crate::prompts::{system_prompt, user_prompt};

/// Dependency name used for the breaker guarding CLI-backed agents.
pub const CLAUDE_DEPENDENCY: &str = "claude-cli";

/// An agent that asks the `claude` CLI for its opinion.
pub struct ClaudeAgent {
    name: String,
    agent_type: AgentType,
    cli: ClaudeCli,
}

impl ClaudeAgent {
    pub fn new(name: &str, agent_type: AgentType, cli: ClaudeCli) -> Self {
        Self {
            name: name.to_string(),
            agent_type,
            cli,
        }
    }

    /// Build from an `[[agents]]` entry. The entry's model overrides the
    /// `[claude]` default.
    pub fn from_config(agent: &AgentConfig, claude: &ClaudeConfig) -> Self {
        let mut cli = ClaudeCli::from(claude);
        if let Some(model) = &agent.model {
            cli.model = model.clone();
        }
        Self::new(&agent.name, agent.agent_type, cli)
    }

    pub fn cli(&self) -> &ClaudeCli {
        &self.cli
    }
}

#[async_trait]
impl Agent for ClaudeAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    fn metadata(&self) -> AgentMetadata {
        AgentMetadata {
            description: format!("{} analysis via the claude CLI", self.agent_type),
            version: env!("CARGO_PKG_VERSION").to_string(),
            required_services: vec![CLAUDE_DEPENDENCY.to_string()],
        }
    }

    async fn is_available(&self, cancel: &CancellationToken) -> bool {
        check_cli_available(cancel).await
    }

    async fn analyze(&self, cancel: &CancellationToken, symbol: &str) -> Result<Analysis, AgentError> {
        let raw = self
            .cli
            .invoke(&system_prompt(self.agent_type), &user_prompt(symbol, self.agent_type), cancel)
            .await?;
        debug!(agent = %self.name, response_len = raw.len(), "Claude responded");

        let analysis = into_analysis(parse_payload(&raw), symbol, self.agent_type)?;
        Ok(analysis.with_data("model", Value::from(self.cli.model.as_str())))
    }
}
