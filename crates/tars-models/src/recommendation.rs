use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::AgentType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Hold,
    Sell,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Hold => "hold",
            Action::Sell => "sell",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Action::Buy),
            "hold" => Ok(Action::Hold),
            "sell" => Ok(Action::Sell),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// Lifecycle of a recommendation. Only `Pending` is assigned here; the
/// approval/execution workflow downstream owns the other transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Executed,
    Expired,
}

impl RecommendationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::Pending => "pending",
            RecommendationStatus::Approved => "approved",
            RecommendationStatus::Rejected => "rejected",
            RecommendationStatus::Executed => "executed",
            RecommendationStatus::Expired => "expired",
        }
    }
}

impl FromStr for RecommendationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecommendationStatus::Pending),
            "approved" => Ok(RecommendationStatus::Approved),
            "rejected" => Ok(RecommendationStatus::Rejected),
            "executed" => Ok(RecommendationStatus::Executed),
            "expired" => Ok(RecommendationStatus::Expired),
            other => Err(format!("unknown recommendation status: {other}")),
        }
    }
}

/// An agent that did not contribute to a recommendation, and why.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MissingAgentInfo {
    pub agent_type: AgentType,
    pub agent_name: String,
    pub reason: String,
}

impl MissingAgentInfo {
    pub fn unavailable(agent_type: AgentType, agent_name: &str) -> Self {
        Self {
            agent_type,
            agent_name: agent_name.to_string(),
            reason: "unavailable: dependency unhealthy".to_string(),
        }
    }

    pub fn failed(agent_type: AgentType, agent_name: &str, cause: impl fmt::Display) -> Self {
        Self {
            agent_type,
            agent_name: agent_name.to_string(),
            reason: format!("failed: {cause}"),
        }
    }
}

/// The synthesized trading decision for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub id: Uuid,
    pub symbol: String,
    pub action: Action,
    /// Weighted aggregate score, clamped to [-100, 100].
    pub score: f64,
    /// Clamped to [0, 100], after the missing-agent penalty.
    pub confidence: f64,
    pub reasoning: String,
    pub fundamental_score: f64,
    pub sentiment_score: f64,
    pub technical_score: f64,
    /// Percentage of expected agent categories that responded.
    pub data_completeness: f64,
    pub missing_agents: Vec<MissingAgentInfo>,
    pub status: RecommendationStatus,
    /// Order size in shares. Zero for `Hold`.
    pub quantity: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentRunStatus {
    Running,
    Completed,
    Failed,
}

impl AgentRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRunStatus::Running => "running",
            AgentRunStatus::Completed => "completed",
            AgentRunStatus::Failed => "failed",
        }
    }
}

impl FromStr for AgentRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(AgentRunStatus::Running),
            "completed" => Ok(AgentRunStatus::Completed),
            "failed" => Ok(AgentRunStatus::Failed),
            other => Err(format!("unknown agent run status: {other}")),
        }
    }
}

/// Audit record of one agent execution within one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRun {
    pub id: Uuid,
    pub symbol: String,
    pub agent_name: String,
    pub agent_type: AgentType,
    pub status: AgentRunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub score: Option<f64>,
    pub confidence: Option<f64>,
    pub error: Option<String>,
}

impl AgentRun {
    pub fn start(symbol: &str, agent_name: &str, agent_type: AgentType) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            agent_name: agent_name.to_string(),
            agent_type,
            status: AgentRunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            score: None,
            confidence: None,
            error: None,
        }
    }

    pub fn complete(&mut self, score: f64, confidence: f64, duration_ms: u64) {
        self.status = AgentRunStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.duration_ms = Some(duration_ms);
        self.score = Some(score);
        self.confidence = Some(confidence);
    }

    pub fn fail(&mut self, error: impl fmt::Display, duration_ms: u64) {
        self.status = AgentRunStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.duration_ms = Some(duration_ms);
        self.error = Some(error.to_string());
    }
}
