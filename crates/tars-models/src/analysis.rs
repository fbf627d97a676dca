use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_SCORE: f64 = -100.0;
pub const MAX_SCORE: f64 = 100.0;
pub const MAX_CONFIDENCE: f64 = 100.0;

/// The closed set of analysis categories an agent can cover.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Fundamental,
    /// News/sentiment analysis. Feeds the recommendation's sentiment score.
    News,
    Technical,
}

impl AgentType {
    pub const ALL: [AgentType; 3] = [AgentType::Fundamental, AgentType::News, AgentType::Technical];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Fundamental => "fundamental",
            AgentType::News => "news",
            AgentType::Technical => "technical",
        }
    }
}

/// Number of agent categories a complete analysis expects to hear from.
pub const EXPECTED_AGENT_COUNT: usize = AgentType::ALL.len();

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fundamental" => Ok(AgentType::Fundamental),
            "news" | "sentiment" => Ok(AgentType::News),
            "technical" => Ok(AgentType::Technical),
            other => Err(format!("unknown agent type: {other}")),
        }
    }
}

/// One agent's opinion on one symbol for one request.
///
/// Producers are not required to clamp `score` or `confidence`; the
/// synthesizer normalizes before anything lands on a recommendation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub symbol: String,
    pub agent_type: AgentType,
    /// Intended range -100 (strong sell) to 100 (strong buy).
    pub score: f64,
    /// Intended range 0 to 100.
    pub confidence: f64,
    pub reasoning: String,
    /// Agent-specific auxiliary data (factors, raw metrics, model name, ...).
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Analysis {
    pub fn new(symbol: &str, agent_type: AgentType, score: f64, confidence: f64, reasoning: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            agent_type,
            score,
            confidence,
            reasoning: reasoning.to_string(),
            data: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_data(mut self, key: &str, value: serde_json::Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }
}

/// Decoded upstream model output.
///
/// A response that could not be decoded into structured fields is kept as
/// `Raw` so consumers must decide what to do with it instead of receiving
/// defaulted numbers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisPayload {
    Structured {
        score: f64,
        confidence: f64,
        reasoning: String,
        #[serde(default)]
        factors: Vec<String>,
    },
    Raw {
        text: String,
    },
}

/// Clamp a score into [-100, 100]. NaN maps to 0.
pub fn normalize_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(MIN_SCORE, MAX_SCORE)
}

/// Clamp a confidence into [0, 100]. NaN maps to 0.
pub fn normalize_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        return 0.0;
    }
    confidence.clamp(0.0, MAX_CONFIDENCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn agent_type_parse_and_display() {
        for agent_type in AgentType::ALL {
            let parsed: AgentType = agent_type.to_string().parse().unwrap();
            assert_eq!(parsed, agent_type);
        }
        assert_eq!("Sentiment".parse::<AgentType>().unwrap(), AgentType::News);
        assert!("macro".parse::<AgentType>().is_err());
    }

    #[test]
    fn agent_type_serialization() {
        assert_eq!(serde_json::to_string(&AgentType::News).unwrap(), "\"news\"");
        assert_eq!(EXPECTED_AGENT_COUNT, 3);
    }

    #[test]
    fn payload_tagging() {
        let raw = AnalysisPayload::Raw {
            text: "could not decide".to_string(),
        };
        let json = serde_json::to_value(&raw).unwrap();
        assert_eq!(json["kind"], "raw");

        let structured: AnalysisPayload = serde_json::from_str(
            r#"{"kind": "structured", "score": 40, "confidence": 70, "reasoning": "solid"}"#,
        )
        .unwrap();
        assert!(matches!(
            structured,
            AnalysisPayload::Structured { ref factors, .. } if factors.is_empty()
        ));
    }

    #[test]
    fn analysis_builder_keeps_data() {
        let analysis = Analysis::new("AAPL", AgentType::Technical, 150.0, 80.0, "RSI oversold")
            .with_data("rsi", serde_json::json!(28.5));
        assert_eq!(analysis.data["rsi"], serde_json::json!(28.5));
        // Producers are not clamped.
        assert_eq!(analysis.score, 150.0);
    }

    #[test]
    fn normalize_handles_nan() {
        assert_eq!(normalize_score(f64::NAN), 0.0);
        assert_eq!(normalize_confidence(f64::NAN), 0.0);
        assert_eq!(normalize_score(f64::INFINITY), 100.0);
        assert_eq!(normalize_confidence(f64::NEG_INFINITY), 0.0);
    }

    proptest! {
        #[test]
        fn score_always_in_range(x in proptest::num::f64::ANY) {
            let s = normalize_score(x);
            prop_assert!((MIN_SCORE..=MAX_SCORE).contains(&s));
        }

        #[test]
        fn confidence_always_in_range(x in proptest::num::f64::ANY) {
            let c = normalize_confidence(x);
            prop_assert!((0.0..=MAX_CONFIDENCE).contains(&c));
        }

        #[test]
        fn normalize_is_identity_in_range(x in -100.0f64..=100.0) {
            prop_assert_eq!(normalize_score(x), x);
            if x >= 0.0 {
                prop_assert_eq!(normalize_confidence(x), x);
            }
        }
    }
}
