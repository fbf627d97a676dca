use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::account::{Account, Position};
use crate::analysis::AgentType;

/// Top-level configuration for TARS.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TarsConfig {
    pub orchestrator: OrchestratorConfig,
    pub weights: AgentWeights,
    pub synthesis: SynthesisConfig,
    pub strategy: StrategyConfig,
    pub sizing: SizingConfig,
    pub breaker: BreakerConfig,
    pub retry: RetryConfig,
    pub health: HealthConfig,
    pub claude: ClaudeConfig,
    pub agents: Vec<AgentConfig>,
    pub store: StoreConfig,
    pub account: AccountConfig,
}

impl Default for TarsConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            weights: AgentWeights::default(),
            synthesis: SynthesisConfig::default(),
            strategy: StrategyConfig::default(),
            sizing: SizingConfig::default(),
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
            health: HealthConfig::default(),
            claude: ClaudeConfig::default(),
            agents: AgentConfig::defaults(),
            store: StoreConfig::default(),
            account: AccountConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Per-agent timeout in seconds. Each agent gets its own deadline.
    pub agent_timeout_seconds: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent_timeout_seconds: 30,
        }
    }
}

/// Relative influence of each agent category on the aggregate score.
/// Weights do not have to sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentWeights {
    pub fundamental: f64,
    pub news: f64,
    pub technical: f64,
}

impl AgentWeights {
    pub fn weight(&self, agent_type: AgentType) -> f64 {
        match agent_type {
            AgentType::Fundamental => self.fundamental,
            AgentType::News => self.news,
            AgentType::Technical => self.technical,
        }
    }
}

impl Default for AgentWeights {
    fn default() -> Self {
        Self {
            fundamental: 0.4,
            news: 0.3,
            technical: 0.3,
        }
    }
}

/// Tuning for the missing-agent confidence penalty (percent points).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthesisConfig {
    pub missing_penalty_per_agent: f64,
    pub max_missing_penalty: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            missing_penalty_per_agent: 15.0,
            max_missing_penalty: 45.0,
        }
    }
}

/// Strategy selection. `name` is one of `default`, `conservative`,
/// `aggressive`, `custom`; thresholds only apply to `custom` and
/// `min_confidence` to `conservative` and `custom`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    pub name: String,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    pub min_confidence: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            buy_threshold: 25.0,
            sell_threshold: -25.0,
            min_confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SizingConfig {
    /// Fraction of capital allowed in one position (0.10 = 10%).
    pub max_position_percent: Decimal,
    /// Minimum order lot. Also the fallback when sizing inputs are unusable.
    pub min_shares: Decimal,
    /// Upper bound on order size. Zero means unlimited.
    pub max_shares: Decimal,
    /// Scale position value by `0.5 + confidence / 200`.
    pub scale_by_confidence: bool,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            max_position_percent: Decimal::new(10, 2),
            min_shares: Decimal::ONE,
            max_shares: Decimal::ZERO,
            scale_by_confidence: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Requests required in the window before the failure ratio is evaluated.
    pub min_requests: u32,
    /// Failure ratio (0.0 - 1.0) at or above which the breaker trips.
    pub failure_ratio: f64,
    /// Trial calls allowed while half-open.
    pub half_open_max_requests: u32,
    /// Cooldown in seconds before an open breaker goes half-open.
    pub open_timeout_seconds: u64,
    /// Period in seconds after which closed-state counts are cleared. Zero never clears.
    pub interval_seconds: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            min_requests: 5,
            failure_ratio: 0.5,
            half_open_max_requests: 3,
            open_timeout_seconds: 60,
            interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval_ms: 500,
            max_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// How long an availability probe result is trusted. Zero disables caching.
    pub ttl_seconds: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { ttl_seconds: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClaudeConfig {
    /// Default model for agents without an override.
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-haiku-latest".to_string(),
            timeout_seconds: 45,
        }
    }
}

/// Configuration for a single analysis agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub name: String,
    pub agent_type: AgentType,
    /// Override model for this agent. Falls back to `ClaudeConfig::model`.
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl AgentConfig {
    pub fn defaults() -> Vec<AgentConfig> {
        AgentType::ALL
            .iter()
            .map(|agent_type| AgentConfig {
                name: format!("{agent_type}_analyst"),
                agent_type: *agent_type,
                model: None,
                enabled: true,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub sqlite_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/tars.db".to_string(),
        }
    }
}

/// Fixed account snapshot served when no brokerage connection is wired in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AccountConfig {
    pub account: Account,
    pub positions: Vec<Position>,
    /// Last trade price per symbol.
    pub prices: BTreeMap<String, Decimal>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            account: Account {
                equity: Decimal::new(100_000, 0),
                portfolio_value: Decimal::new(100_000, 0),
                buying_power: Decimal::new(100_000, 0),
                cash: Decimal::new(100_000, 0),
            },
            positions: Vec::new(),
            prices: BTreeMap::new(),
        }
    }
}
