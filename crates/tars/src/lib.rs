//! TARS - Trading Agent Recommendation Synthesizer
//!
//! Fans a symbol out to independent analysis agents, tolerates partial
//! failure, and synthesizes one sized Buy/Hold/Sell recommendation.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use tars::models::config::TarsConfig;
//! use tars::{LogMetrics, Tars};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let tars = Tars::from_config(&TarsConfig::default(), std::sync::Arc::new(LogMetrics))?;
//! let recommendation = tars.analyze(&CancellationToken::new(), "AAPL").await?;
//! println!("{} {}", recommendation.action, recommendation.quantity);
//! # Ok(())
//! # }
//! ```

pub mod metrics;

pub use metrics::LogMetrics;
pub use tars_agents as agents;
pub use tars_models as models;
pub use tars_resilience as resilience;
pub use tars_store as store;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tars_agents::{
    Agent, AnalysisError, ClaudeAgent, GuardedAgent, Orchestrator, StaticAccountProvider, Synthesizer,
    CLAUDE_DEPENDENCY,
};
use tars_models::config::TarsConfig;
use tars_models::metrics::MetricsSink;
use tars_models::recommendation::Recommendation;
use tars_resilience::{BreakerRegistry, BreakerSettings, RetryPolicy};
use tars_store::{RecommendationStore, SqliteStore, StoreError};
use tokio_util::sync::CancellationToken;

/// Claude-backed agents for every enabled `[[agents]]` entry, each guarded by
/// the shared breaker for the CLI.
pub fn build_agents(config: &TarsConfig, breakers: &Arc<BreakerRegistry>) -> Vec<Arc<dyn Agent>> {
    config
        .agents
        .iter()
        .filter(|a| a.enabled)
        .map(|a| {
            Arc::new(GuardedAgent::new(
                ClaudeAgent::from_config(a, &config.claude),
                CLAUDE_DEPENDENCY,
                Arc::clone(breakers),
                RetryPolicy::from(&config.retry),
                Duration::from_secs(config.health.ttl_seconds),
            )) as Arc<dyn Agent>
        })
        .collect()
}

/// Build an Orchestrator from configuration around the given store.
pub fn build_orchestrator(
    config: &TarsConfig,
    store: Arc<dyn RecommendationStore>,
    metrics: Arc<dyn MetricsSink>,
) -> Orchestrator {
    let account = Arc::new(StaticAccountProvider::from_config(&config.account));
    Orchestrator::new(
        Synthesizer::from_config(config, account),
        store,
        metrics,
        Duration::from_secs(config.orchestrator.agent_timeout_seconds),
    )
}

/// A fully wired pipeline: SQLite store, breaker registry and configured agents.
pub struct Tars {
    orchestrator: Orchestrator,
    agents: Vec<Arc<dyn Agent>>,
    breakers: Arc<BreakerRegistry>,
    store: Arc<SqliteStore>,
}

impl Tars {
    pub fn from_config(config: &TarsConfig, metrics: Arc<dyn MetricsSink>) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(&config.store.sqlite_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create store directory: {}", parent.display()))?;
            }
        }
        let store = Arc::new(
            SqliteStore::open(&config.store.sqlite_path)
                .with_context(|| format!("Failed to open store: {}", config.store.sqlite_path))?,
        );
        let breakers = Arc::new(BreakerRegistry::new(
            BreakerSettings::from(&config.breaker),
            Arc::clone(&metrics),
        ));
        let agents = build_agents(config, &breakers);
        let orchestrator = build_orchestrator(config, store.clone(), metrics);

        Ok(Self {
            orchestrator,
            agents,
            breakers,
            store,
        })
    }

    pub fn agents(&self) -> &[Arc<dyn Agent>] {
        &self.agents
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Run every configured agent for `symbol` and persist the result.
    pub async fn analyze(&self, cancel: &CancellationToken, symbol: &str) -> Result<Recommendation, AnalysisError> {
        self.orchestrator
            .analyze_symbol(cancel, symbol, &self.agents)
            .await
    }

    /// Most recent stored recommendations for `symbol`, newest first.
    pub fn history(&self, symbol: &str, limit: usize) -> Result<Vec<Recommendation>, StoreError> {
        self.store.recommendations_for_symbol(symbol, limit)
    }
}
