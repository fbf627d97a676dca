use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Brokerage account snapshot used for position sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub equity: Decimal,
    pub portfolio_value: Decimal,
    pub buying_power: Decimal,
    pub cash: Decimal,
}

/// An open position in one symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub avg_entry_price: Decimal,
    #[serde(default)]
    pub market_value: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub last_price: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Last trade price, or the bid/ask midpoint when no trade price is set.
    pub fn price(&self) -> Option<Decimal> {
        if self.last_price > Decimal::ZERO {
            return Some(self.last_price);
        }
        if self.bid > Decimal::ZERO && self.ask > Decimal::ZERO {
            return Some((self.bid + self.ask) / Decimal::TWO);
        }
        None
    }
}
