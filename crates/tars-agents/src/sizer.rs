use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tars_models::account::{Account, Position};
use tars_models::analysis::normalize_confidence;
use tars_models::config::SizingConfig;
use tars_models::recommendation::Action;

/// Converts an action into an order quantity for one symbol.
#[derive(Debug, Clone, Default)]
pub struct PositionSizer {
    config: SizingConfig,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    /// Minimum lot, returned whenever the sizing inputs are unusable.
    pub fn min_shares(&self) -> Decimal {
        self.config.min_shares
    }

    /// Order quantity for `action`.
    ///
    /// Hold is always zero. Sell liquidates an existing long position in full.
    /// Buy sizes off portfolio value (or equity), scaled by confidence when
    /// enabled, capped by buying power and clamped to `[min_shares, max_shares]`.
    pub fn calculate_quantity(
        &self,
        account: &Account,
        price: Decimal,
        action: Action,
        confidence: f64,
        position: Option<&Position>,
    ) -> Decimal {
        match action {
            Action::Hold => Decimal::ZERO,
            _ if price <= Decimal::ZERO => self.config.min_shares,
            Action::Sell => match position {
                Some(p) if p.quantity > Decimal::ZERO => p.quantity,
                _ => self.config.min_shares,
            },
            Action::Buy => self.buy_quantity(account, price, confidence),
        }
    }

    fn buy_quantity(&self, account: &Account, price: Decimal, confidence: f64) -> Decimal {
        let base = if account.portfolio_value > Decimal::ZERO {
            account.portfolio_value
        } else {
            account.equity
        };
        if base <= Decimal::ZERO {
            return self.config.min_shares;
        }

        let mut max_value = base * self.config.max_position_percent;
        if self.config.scale_by_confidence {
            max_value *= confidence_multiplier(confidence);
        }
        max_value = max_value.min(account.buying_power);

        let mut shares = (max_value / price).floor();
        if shares < self.config.min_shares {
            shares = self.config.min_shares;
        }
        if self.config.max_shares > Decimal::ZERO && shares > self.config.max_shares {
            shares = self.config.max_shares;
        }
        shares
    }
}

/// `0.5 + confidence / 200`: confidence 0..=100 maps onto 0.5..=1.0.
fn confidence_multiplier(confidence: f64) -> Decimal {
    let confidence = Decimal::from_f64(normalize_confidence(confidence))
        .unwrap_or(Decimal::ZERO)
        .round_dp(4);
    Decimal::new(5, 1) + confidence / Decimal::from(200)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account() -> Account {
        Account {
            equity: dec!(100000),
            portfolio_value: dec!(100000),
            buying_power: dec!(100000),
            cash: dec!(100000),
        }
    }

    fn position(quantity: Decimal) -> Position {
        Position {
            symbol: "AAPL".to_string(),
            quantity,
            avg_entry_price: dec!(150),
            market_value: dec!(0),
        }
    }

    #[test]
    fn hold_is_always_zero() {
        let sizer = PositionSizer::default();
        let p = position(dec!(50));
        assert_eq!(sizer.calculate_quantity(&account(), dec!(100), Action::Hold, 90.0, Some(&p)), dec!(0));
        assert_eq!(sizer.calculate_quantity(&account(), dec!(-1), Action::Hold, 90.0, None), dec!(0));
    }

    #[test]
    fn sell_liquidates_existing_position() {
        let sizer = PositionSizer::default();
        let p = position(dec!(50));
        assert_eq!(sizer.calculate_quantity(&account(), dec!(100), Action::Sell, 80.0, Some(&p)), dec!(50));

        let fractional = position(dec!(12.5));
        assert_eq!(
            sizer.calculate_quantity(&account(), dec!(100), Action::Sell, 80.0, Some(&fractional)),
            dec!(12.5)
        );
    }

    #[test]
    fn sell_without_position_is_min_lot() {
        let sizer = PositionSizer::default();
        assert_eq!(sizer.calculate_quantity(&account(), dec!(100), Action::Sell, 80.0, None), dec!(1));
        let empty = position(dec!(0));
        assert_eq!(sizer.calculate_quantity(&account(), dec!(100), Action::Sell, 80.0, Some(&empty)), dec!(1));
    }

    #[test]
    fn invalid_price_is_min_lot() {
        let sizer = PositionSizer::new(SizingConfig {
            min_shares: dec!(5),
            ..SizingConfig::default()
        });
        assert_eq!(sizer.calculate_quantity(&account(), dec!(0), Action::Buy, 80.0, None), dec!(5));
        assert_eq!(sizer.calculate_quantity(&account(), dec!(-3), Action::Sell, 80.0, None), dec!(5));
    }

    #[test]
    fn buy_scales_with_confidence() {
        let sizer = PositionSizer::default();
        // 100000 * 0.10 * (0.5 + 56/200) = 7800 -> 78 shares at 100.
        assert_eq!(sizer.calculate_quantity(&account(), dec!(100), Action::Buy, 56.0, None), dec!(78));
        // Full confidence -> 10000 -> 100 shares.
        assert_eq!(sizer.calculate_quantity(&account(), dec!(100), Action::Buy, 100.0, None), dec!(100));
        // Zero confidence -> 5000 -> 50 shares.
        assert_eq!(sizer.calculate_quantity(&account(), dec!(100), Action::Buy, 0.0, None), dec!(50));
    }

    #[test]
    fn buy_without_scaling_floors_shares() {
        let sizer = PositionSizer::new(SizingConfig {
            scale_by_confidence: false,
            ..SizingConfig::default()
        });
        // 10000 / 333 = 30.03 -> 30.
        assert_eq!(sizer.calculate_quantity(&account(), dec!(333), Action::Buy, 10.0, None), dec!(30));
    }

    #[test]
    fn buy_falls_back_to_equity_then_min_lot() {
        let sizer = PositionSizer::new(SizingConfig {
            scale_by_confidence: false,
            ..SizingConfig::default()
        });
        let mut acct = account();
        acct.portfolio_value = dec!(0);
        acct.equity = dec!(50000);
        assert_eq!(sizer.calculate_quantity(&acct, dec!(100), Action::Buy, 80.0, None), dec!(50));

        acct.equity = dec!(-10);
        assert_eq!(sizer.calculate_quantity(&acct, dec!(100), Action::Buy, 80.0, None), dec!(1));
    }

    #[test]
    fn buy_is_capped_by_buying_power() {
        let sizer = PositionSizer::new(SizingConfig {
            scale_by_confidence: false,
            ..SizingConfig::default()
        });
        let mut acct = account();
        acct.buying_power = dec!(2500);
        assert_eq!(sizer.calculate_quantity(&acct, dec!(100), Action::Buy, 80.0, None), dec!(25));

        acct.buying_power = dec!(0);
        assert_eq!(sizer.calculate_quantity(&acct, dec!(100), Action::Buy, 80.0, None), dec!(1));
    }

    #[test]
    fn buy_clamps_to_max_shares() {
        let sizer = PositionSizer::new(SizingConfig {
            max_shares: dec!(20),
            scale_by_confidence: false,
            ..SizingConfig::default()
        });
        assert_eq!(sizer.calculate_quantity(&account(), dec!(10), Action::Buy, 80.0, None), dec!(20));
    }

    #[test]
    fn multiplier_endpoints() {
        assert_eq!(confidence_multiplier(0.0), dec!(0.5));
        assert_eq!(confidence_multiplier(100.0), dec!(1.0));
        assert_eq!(confidence_multiplier(250.0), dec!(1.0));
        assert_eq!(confidence_multiplier(f64::NAN), dec!(0.5));
    }
}
