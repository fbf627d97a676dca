//! Score/confidence to action policies.

use tars_models::config::StrategyConfig;
use tars_models::recommendation::Action;

const DEFAULT_THRESHOLD: f64 = 25.0;
const CONSERVATIVE_THRESHOLD: f64 = 35.0;
const CONSERVATIVE_MIN_CONFIDENCE: f64 = 60.0;
const AGGRESSIVE_THRESHOLD: f64 = 15.0;

/// Maps an aggregate (score, confidence) to Buy/Hold/Sell.
///
/// Every variant is stateless and uses strict inequality, so a score exactly
/// on a threshold is Hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ActionStrategy {
    /// Buy above +25, sell below -25.
    #[default]
    Default,
    /// Buy above +35, sell below -35, Hold whenever confidence is below the gate.
    Conservative { min_confidence: f64 },
    /// Buy above +15, sell below -15.
    Aggressive,
    /// Caller-supplied thresholds. A `min_confidence` of 0 disables the gate.
    Custom {
        buy_threshold: f64,
        sell_threshold: f64,
        min_confidence: f64,
    },
}

impl ActionStrategy {
    pub fn conservative() -> Self {
        ActionStrategy::Conservative {
            min_confidence: CONSERVATIVE_MIN_CONFIDENCE,
        }
    }

    /// Look up a built-in strategy by name. Unknown names fall back to Default.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "conservative" => Self::conservative(),
            "aggressive" => ActionStrategy::Aggressive,
            _ => ActionStrategy::Default,
        }
    }

    /// Like [`from_name`](Self::from_name), plus `custom` with thresholds from config.
    pub fn from_config(config: &StrategyConfig) -> Self {
        match config.name.trim().to_ascii_lowercase().as_str() {
            "custom" => ActionStrategy::Custom {
                buy_threshold: config.buy_threshold,
                sell_threshold: config.sell_threshold,
                min_confidence: config.min_confidence,
            },
            "conservative" if config.min_confidence > 0.0 => ActionStrategy::Conservative {
                min_confidence: config.min_confidence,
            },
            other => Self::from_name(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ActionStrategy::Default => "default",
            ActionStrategy::Conservative { .. } => "conservative",
            ActionStrategy::Aggressive => "aggressive",
            ActionStrategy::Custom { .. } => "custom",
        }
    }

    pub fn determine_action(&self, score: f64, confidence: f64) -> Action {
        let (buy, sell, gate) = match *self {
            ActionStrategy::Default => (DEFAULT_THRESHOLD, -DEFAULT_THRESHOLD, 0.0),
            ActionStrategy::Conservative { min_confidence } => {
                (CONSERVATIVE_THRESHOLD, -CONSERVATIVE_THRESHOLD, min_confidence)
            }
            ActionStrategy::Aggressive => (AGGRESSIVE_THRESHOLD, -AGGRESSIVE_THRESHOLD, 0.0),
            ActionStrategy::Custom {
                buy_threshold,
                sell_threshold,
                min_confidence,
            } => (buy_threshold, sell_threshold, min_confidence),
        };

        if gate > 0.0 && confidence < gate {
            return Action::Hold;
        }
        if score > buy {
            Action::Buy
        } else if score < sell {
            Action::Sell
        } else {
            Action::Hold
        }
    }
}
