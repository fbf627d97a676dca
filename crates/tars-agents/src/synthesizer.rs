//! Aggregation of per-agent analyses into one recommendation.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tars_models::account::{Account, Position};
use tars_models::analysis::{normalize_confidence, normalize_score, AgentType, Analysis, EXPECTED_AGENT_COUNT};
use tars_models::config::{AgentWeights, SynthesisConfig, TarsConfig};
use tars_models::recommendation::{Action, MissingAgentInfo, Recommendation, RecommendationStatus};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::account::AccountProvider;
use crate::error::ProviderError;
use crate::sizer::PositionSizer;
use crate::strategy::ActionStrategy;

/// Numbers derived from a set of analyses, before action and sizing.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub final_score: f64,
    pub avg_confidence: f64,
    /// Percent removed from `avg_confidence` for missing agents.
    pub penalty_percent: f64,
    pub adjusted_confidence: f64,
    pub data_completeness: f64,
    pub fundamental_score: f64,
    pub sentiment_score: f64,
    pub technical_score: f64,
}

pub struct Synthesizer {
    weights: AgentWeights,
    synthesis: SynthesisConfig,
    strategy: ActionStrategy,
    sizer: PositionSizer,
    account: Arc<dyn AccountProvider>,
}

impl Synthesizer {
    pub fn new(
        weights: AgentWeights,
        synthesis: SynthesisConfig,
        strategy: ActionStrategy,
        sizer: PositionSizer,
        account: Arc<dyn AccountProvider>,
    ) -> Self {
        Self {
            weights,
            synthesis,
            strategy,
            sizer,
            account,
        }
    }

    pub fn from_config(config: &TarsConfig, account: Arc<dyn AccountProvider>) -> Self {
        Self::new(
            config.weights.clone(),
            config.synthesis.clone(),
            ActionStrategy::from_config(&config.strategy),
            PositionSizer::new(config.sizing.clone()),
            account,
        )
    }

    pub fn strategy(&self) -> &ActionStrategy {
        &self.strategy
    }

    /// Confidence-weighted score, completeness and penalty for `analyses`.
    /// Scores and confidences are clamped before they are weighted.
    pub fn aggregate(&self, analyses: &[Analysis], missing_count: usize) -> Aggregate {
        let mut weighted_score = 0.0;
        let mut total_weight = 0.0;
        let mut confidence_sum = 0.0;
        let mut fundamental_score = 0.0;
        let mut sentiment_score = 0.0;
        let mut technical_score = 0.0;

        for analysis in analyses {
            let score = normalize_score(analysis.score);
            let confidence = normalize_confidence(analysis.confidence);
            let weight = self.weights.weight(analysis.agent_type) * confidence / 100.0;

            weighted_score += score * weight;
            total_weight += weight;
            confidence_sum += confidence;

            match analysis.agent_type {
                AgentType::Fundamental => fundamental_score = score,
                AgentType::News => sentiment_score = score,
                AgentType::Technical => technical_score = score,
            }
        }

        let final_score = if total_weight > 0.0 {
            normalize_score(weighted_score / total_weight)
        } else {
            0.0
        };
        let avg_confidence = if analyses.is_empty() {
            0.0
        } else {
            confidence_sum / analyses.len() as f64
        };
        let penalty_percent = (self.synthesis.missing_penalty_per_agent * missing_count as f64)
            .min(self.synthesis.max_missing_penalty)
            .max(0.0);
        let adjusted_confidence = normalize_confidence(avg_confidence * (1.0 - penalty_percent / 100.0));
        let data_completeness =
            (analyses.len() as f64 / EXPECTED_AGENT_COUNT as f64 * 100.0).clamp(0.0, 100.0);

        Aggregate {
            final_score,
            avg_confidence,
            penalty_percent,
            adjusted_confidence,
            data_completeness,
            fundamental_score,
            sentiment_score,
            technical_score,
        }
    }

    /// Build a recommendation from the analyses that succeeded and the
    /// agents that did not. Account lookups that fail fall back to the
    /// minimum lot instead of failing the recommendation.
    pub async fn synthesize(
        &self,
        symbol: &str,
        analyses: &[Analysis],
        missing: Vec<MissingAgentInfo>,
    ) -> Recommendation {
        let aggregate = self.aggregate(analyses, missing.len());
        let action = self
            .strategy
            .determine_action(aggregate.final_score, aggregate.adjusted_confidence);
        let quantity = self
            .quantity(symbol, action, aggregate.adjusted_confidence)
            .await;
        let reasoning = build_reasoning(analyses, &missing, &aggregate);

        debug!(
            symbol = %symbol,
            strategy = self.strategy.name(),
            score = aggregate.final_score,
            confidence = aggregate.adjusted_confidence,
            action = %action,
            "Synthesized recommendation"
        );

        Recommendation {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            action,
            score: aggregate.final_score,
            confidence: aggregate.adjusted_confidence,
            reasoning,
            fundamental_score: aggregate.fundamental_score,
            sentiment_score: aggregate.sentiment_score,
            technical_score: aggregate.technical_score,
            data_completeness: aggregate.data_completeness,
            missing_agents: missing,
            status: RecommendationStatus::Pending,
            quantity,
            created_at: Utc::now(),
        }
    }

    async fn quantity(&self, symbol: &str, action: Action, confidence: f64) -> Decimal {
        if action == Action::Hold {
            return Decimal::ZERO;
        }
        match self.lookup(symbol).await {
            Ok((account, price, position)) => {
                self.sizer
                    .calculate_quantity(&account, price, action, confidence, position.as_ref())
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Account lookup failed, using minimum lot");
                self.sizer.min_shares()
            }
        }
    }

    async fn lookup(&self, symbol: &str) -> Result<(Account, Decimal, Option<Position>), ProviderError> {
        let account = self.account.get_account().await?;
        let quote = self.account.get_quote(symbol).await?;
        let price = quote
            .price()
            .ok_or_else(|| ProviderError::NoQuote(symbol.to_string()))?;
        let position = self.account.get_position(symbol).await?;
        Ok((account, price, position))
    }
}

/// "a", "a and b", "a, b, and c".
pub fn join_names(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [one] => one.to_string(),
        [a, b] => format!("{a} and {b}"),
        [head @ .., last] => format!("{}, and {last}", head.join(", ")),
    }
}

fn build_reasoning(analyses: &[Analysis], missing: &[MissingAgentInfo], aggregate: &Aggregate) -> String {
    let mut text = format!(
        "Analysis based on {} of {} expected agents",
        analyses.len(),
        EXPECTED_AGENT_COUNT
    );
    if missing.is_empty() {
        text.push('.');
    } else {
        let names: Vec<&str> = missing.iter().map(|m| m.agent_type.as_str()).collect();
        let _ = write!(text, " (missing: {}).", join_names(&names));
    }

    let _ = write!(
        text,
        "\nWeighted score: {:.2}, average confidence: {:.2}.",
        aggregate.final_score, aggregate.avg_confidence
    );
    if aggregate.penalty_percent > 0.0 {
        let _ = write!(
            text,
            "\nConfidence reduced by {:.0}% for {} missing agent(s) to {:.2}.",
            aggregate.penalty_percent,
            missing.len(),
            aggregate.adjusted_confidence
        );
    }
    for analysis in analyses {
        let _ = write!(
            text,
            "\n[{}] {}",
            analysis.agent_type.as_str().to_ascii_uppercase(),
            analysis.reasoning
        );
    }
    text
}
