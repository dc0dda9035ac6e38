use chrono::{DateTime, NaiveDate, Utc};
use paper_trade_core::domain::ClosedTrade;
use paper_trade_core::error::EngineError;
use paper_trade_core::RiskConfig;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Risk-based position sizing plus the portfolio-level circuit breaker.
///
/// Sizing: `size = risk_fraction * cash_balance / risk_per_unit`.
///
/// Circuit breaker: realized pnl is accumulated per UTC day; once the day's
/// loss exceeds `daily_loss_limit_fraction * initial_capital`, new entries
/// are vetoed until the date changes. An open position is unaffected.
pub struct RiskManager {
    risk_fraction: Decimal,
    daily_loss_limit: Decimal,
    initial_capital: Decimal,
    guard_day: Option<NaiveDate>,
    guard_realized: Decimal,
}

impl RiskManager {
    /// # Panics
    ///
    /// Panics if the f64 fractions cannot be converted to `Decimal`.
    #[must_use]
    pub fn new(
        initial_capital: Decimal,
        risk_fraction_per_trade: f64,
        daily_loss_limit_fraction: f64,
    ) -> Self {
        Self {
            risk_fraction: Decimal::from_str(&risk_fraction_per_trade.to_string()).unwrap(),
            daily_loss_limit: Decimal::from_str(&daily_loss_limit_fraction.to_string()).unwrap(),
            initial_capital,
            guard_day: None,
            guard_realized: Decimal::ZERO,
        }
    }

    #[must_use]
    pub fn from_config(config: &RiskConfig) -> Self {
        Self::new(
            config.initial_capital,
            config.risk_fraction_per_trade,
            config.daily_loss_limit_fraction,
        )
    }

    /// Converts a stop distance and current cash into a quantity.
    ///
    /// # Errors
    ///
    /// `Validation` if `risk_per_unit` is not strictly positive.
    pub fn size_position(
        &self,
        cash_balance: Decimal,
        risk_per_unit: Decimal,
    ) -> Result<Decimal, EngineError> {
        if risk_per_unit <= Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "cannot size position with non-positive risk per unit {risk_per_unit}"
            )));
        }
        Ok(self.risk_fraction * cash_balance / risk_per_unit)
    }

    /// Records a completed trade against the daily loss guard.
    pub fn record_close(&mut self, trade: &ClosedTrade) {
        self.roll_day(trade.exit_time.date_naive());
        self.guard_realized += trade.realized_pnl;
    }

    /// Whether a new entry is currently allowed. Checking rolls the guard
    /// window forward, so the veto clears on the first check of a new UTC
    /// day.
    ///
    /// # Errors
    ///
    /// `GuardTripped` while the day's realized loss exceeds the limit.
    pub fn entry_allowed(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.roll_day(now.date_naive());
        let daily_loss = -self.guard_realized;
        let limit = self.daily_loss_limit * self.initial_capital;
        if daily_loss > limit {
            return Err(EngineError::GuardTripped(format!(
                "daily realized loss {daily_loss} exceeds limit {limit}"
            )));
        }
        Ok(())
    }

    fn roll_day(&mut self, day: NaiveDate) {
        if self.guard_day != Some(day) {
            self.guard_day = Some(day);
            self.guard_realized = Decimal::ZERO;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use paper_trade_core::domain::{ExitReason, Side, StrategyVersion};
    use rust_decimal_macros::dec;

    fn manager() -> RiskManager {
        RiskManager::new(dec!(500), 0.02, 0.10)
    }

    fn losing_trade(pnl: Decimal, exit_time: DateTime<Utc>) -> ClosedTrade {
        ClosedTrade {
            side: Side::Long,
            entry_price: dec!(100),
            entry_time: exit_time,
            quantity: dec!(1),
            initial_stop_loss: dec!(90),
            stop_loss: dec!(90),
            take_profit: dec!(200),
            strategy_version: StrategyVersion::V2,
            exit_price: dec!(100) + pnl,
            exit_time,
            exit_reason: ExitReason::StopLoss,
            realized_pnl: pnl,
        }
    }

    #[test]
    fn sizes_by_risk_fraction_over_stop_distance() {
        // 2% of 500 = 10 at risk; 5 per unit -> 2 units
        assert_eq!(manager().size_position(dec!(500), dec!(5)).unwrap(), dec!(2));
    }

    #[test]
    fn rejects_non_positive_risk() {
        let err = manager().size_position(dec!(500), dec!(0)).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        let err = manager().size_position(dec!(500), dec!(-3)).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn guard_trips_when_daily_loss_exceeds_limit() {
        let mut manager = manager();
        let noon = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        // Limit is 10% of 500 = 50. A 40 loss leaves entries allowed.
        manager.record_close(&losing_trade(dec!(-40), noon));
        assert!(manager.entry_allowed(noon).is_ok());

        // Another 20 loss pushes the day to -60: tripped.
        manager.record_close(&losing_trade(dec!(-20), noon));
        let err = manager.entry_allowed(noon).unwrap_err();
        assert!(matches!(err, EngineError::GuardTripped(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn guard_resets_on_new_utc_day() {
        let mut manager = manager();
        let noon = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        manager.record_close(&losing_trade(dec!(-60), noon));
        assert!(manager.entry_allowed(noon).is_err());

        let next_morning = Utc.with_ymd_and_hms(2025, 6, 2, 0, 5, 0).unwrap();
        assert!(manager.entry_allowed(next_morning).is_ok());
    }

    #[test]
    fn wins_offset_losses_within_the_day() {
        let mut manager = manager();
        let noon = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        manager.record_close(&losing_trade(dec!(-60), noon));
        manager.record_close(&losing_trade(dec!(30), noon));
        assert!(manager.entry_allowed(noon).is_ok());
    }
}
