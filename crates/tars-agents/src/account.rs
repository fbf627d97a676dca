use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tars_models::account::{Account, Position, Quote};
use tars_models::config::AccountConfig;

use crate::error::ProviderError;

/// Brokerage-side lookups needed to size an order.
#[async_trait]
pub trait AccountProvider: Send + Sync {
    async fn get_account(&self) -> Result<Account, ProviderError>;

    /// The open position in `symbol`, if any.
    async fn get_position(&self, symbol: &str) -> Result<Option<Position>, ProviderError>;

    async fn get_quote(&self, symbol: &str) -> Result<Quote, ProviderError>;
}

/// Serves a fixed account snapshot, positions and prices.
pub struct StaticAccountProvider {
    account: Account,
    positions: HashMap<String, Position>,
    prices: HashMap<String, Decimal>,
}

impl StaticAccountProvider {
    pub fn new(account: Account) -> Self {
        Self {
            account,
            positions: HashMap::new(),
            prices: HashMap::new(),
        }
    }

    pub fn from_config(config: &AccountConfig) -> Self {
        let mut provider = Self::new(config.account.clone());
        for position in &config.positions {
            provider
                .positions
                .insert(position.symbol.clone(), position.clone());
        }
        for (symbol, price) in &config.prices {
            provider.prices.insert(symbol.clone(), *price);
        }
        provider
    }

    pub fn with_position(mut self, symbol: &str, quantity: Decimal) -> Self {
        self.positions.insert(
            symbol.to_string(),
            Position {
                symbol: symbol.to_string(),
                quantity,
                avg_entry_price: Decimal::ZERO,
                market_value: Decimal::ZERO,
            },
        );
        self
    }

    pub fn with_price(mut self, symbol: &str, price: Decimal) -> Self {
        self.prices.insert(symbol.to_string(), price);
        self
    }
}

#[async_trait]
impl AccountProvider for StaticAccountProvider {
    async fn get_account(&self) -> Result<Account, ProviderError> {
        Ok(self.account.clone())
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<Position>, ProviderError> {
        Ok(self.positions.get(symbol).cloned())
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        let price = self
            .prices
            .get(symbol)
            .ok_or_else(|| ProviderError::NoQuote(symbol.to_string()))?;
        Ok(Quote {
            symbol: symbol.to_string(),
            last_price: *price,
            bid: *price,
            ask: *price,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn serves_configured_snapshot() {
        let mut config = AccountConfig::default();
        config.prices.insert("AAPL".to_string(), dec!(190.25));
        config.positions.push(Position {
            symbol: "AAPL".to_string(),
            quantity: dec!(50),
            avg_entry_price: dec!(170),
            market_value: dec!(9512.50),
        });

        let provider = StaticAccountProvider::from_config(&config);
        assert_eq!(provider.get_account().await.unwrap().equity, dec!(100000));
        assert_eq!(
            provider.get_position("AAPL").await.unwrap().unwrap().quantity,
            dec!(50)
        );
        assert!(provider.get_position("TSLA").await.unwrap().is_none());
        assert_eq!(
            provider.get_quote("AAPL").await.unwrap().price(),
            Some(dec!(190.25))
        );
    }

    #[tokio::test]
    async fn missing_quote_is_an_error() {
        let provider = StaticAccountProvider::from_config(&AccountConfig::default());
        let err = provider.get_quote("ZZZZ").await.unwrap_err();
        assert!(matches!(err, ProviderError::NoQuote(ref s) if s == "ZZZZ"));
    }
}
