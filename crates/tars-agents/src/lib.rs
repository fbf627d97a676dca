pub mod account;
pub mod agent;
pub mod claude_agent;
pub mod claude_cli;
pub mod error;
pub mod guarded;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod sizer;
pub mod strategy;
pub mod synthesizer;
pub mod test_support;

pub use account::{AccountProvider, StaticAccountProvider};
pub use agent::{Agent, AgentMetadata};
pub use claude_agent::{ClaudeAgent, CLAUDE_DEPENDENCY};
pub use error::{AgentError, AnalysisError, ProviderError};
pub use guarded::GuardedAgent;
pub use orchestrator::Orchestrator;
pub use sizer::PositionSizer;
pub use strategy::ActionStrategy;
pub use synthesizer::{Aggregate, Synthesizer};
