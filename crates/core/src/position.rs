use crate::domain::{
    Candle, ClosedTrade, ExitReason, Portfolio, Position, Side, Signal, StrategyVersion,
};
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Single-slot position state machine: FLAT ⇄ OPEN(side).
///
/// Owns the only mutable trading state in the system — the open position
/// (if any), the portfolio, and the closed-trade history. At most one
/// position exists at any time; a second `open` is an invariant violation,
/// not a recoverable error.
pub struct PositionManager {
    position: Option<Position>,
    portfolio: Portfolio,
    closed_trades: Vec<ClosedTrade>,
}

impl PositionManager {
    #[must_use]
    pub const fn new(initial_capital: Decimal) -> Self {
        Self {
            position: None,
            portfolio: Portfolio::new(initial_capital),
            closed_trades: Vec::new(),
        }
    }

    #[must_use]
    pub const fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    #[must_use]
    pub const fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    #[must_use]
    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed_trades
    }

    #[must_use]
    pub const fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    /// Fills the slot from an accepted signal. Mark-to-market accounting:
    /// nothing is deducted from cash at open.
    ///
    /// # Errors
    ///
    /// `Invariant` if a position is already open.
    pub fn open(
        &mut self,
        signal: &Signal,
        strategy_version: StrategyVersion,
        entry_time: DateTime<Utc>,
    ) -> Result<&Position, EngineError> {
        if self.position.is_some() {
            return Err(EngineError::Invariant(
                "attempted to open a position while one is already open".to_string(),
            ));
        }

        Ok(&*self.position.insert(Position {
            side: signal.side,
            entry_price: signal.entry_price,
            entry_time,
            quantity: signal.size,
            stop_loss: signal.stop_loss,
            initial_stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            strategy_version,
        }))
    }

    /// Applies a proposed trailing stop. The stop only ever tightens
    /// (up for LONG, down for SHORT); a proposal in the unfavorable
    /// direction is ignored. Returns the `(old, new)` pair when it moved.
    ///
    /// # Errors
    ///
    /// `Invariant` if no position is open.
    pub fn trail_stop(&mut self, proposed: Decimal) -> Result<Option<(Decimal, Decimal)>, EngineError> {
        let Some(position) = self.position.as_mut() else {
            return Err(EngineError::Invariant(
                "trailing update with no open position".to_string(),
            ));
        };

        let tightened = match position.side {
            Side::Long => proposed > position.stop_loss,
            Side::Short => proposed < position.stop_loss,
        };

        if tightened {
            let old = position.stop_loss;
            position.stop_loss = proposed;
            Ok(Some((old, proposed)))
        } else {
            Ok(None)
        }
    }

    /// Checks the open position against a live price. The exit price is the
    /// level crossed — stop or target — never the observed tick, and the
    /// stop is checked first.
    #[must_use]
    pub fn exit_on_tick(&self, price: Decimal) -> Option<(Decimal, ExitReason)> {
        let position = self.position.as_ref()?;
        match position.side {
            Side::Long => {
                if price <= position.stop_loss {
                    Some((position.stop_loss, ExitReason::StopLoss))
                } else if price >= position.take_profit {
                    Some((position.take_profit, ExitReason::TakeProfit))
                } else {
                    None
                }
            }
            Side::Short => {
                if price >= position.stop_loss {
                    Some((position.stop_loss, ExitReason::StopLoss))
                } else if price <= position.take_profit {
                    Some((position.take_profit, ExitReason::TakeProfit))
                } else {
                    None
                }
            }
        }
    }

    /// Checks the open position against a closed candle's high-low range.
    /// When the range crosses both levels, STOP_LOSS takes precedence
    /// (conservative fill assumption).
    #[must_use]
    pub fn exit_on_candle(&self, candle: &Candle) -> Option<(Decimal, ExitReason)> {
        let position = self.position.as_ref()?;
        match position.side {
            Side::Long => {
                if candle.low <= position.stop_loss {
                    Some((position.stop_loss, ExitReason::StopLoss))
                } else if candle.high >= position.take_profit {
                    Some((position.take_profit, ExitReason::TakeProfit))
                } else {
                    None
                }
            }
            Side::Short => {
                if candle.high >= position.stop_loss {
                    Some((position.stop_loss, ExitReason::StopLoss))
                } else if candle.low <= position.take_profit {
                    Some((position.take_profit, ExitReason::TakeProfit))
                } else {
                    None
                }
            }
        }
    }

    /// Empties the slot, realizing pnl into the portfolio and appending the
    /// trade to history.
    ///
    /// # Errors
    ///
    /// `Invariant` if no position is open.
    pub fn close(
        &mut self,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
        exit_reason: ExitReason,
    ) -> Result<ClosedTrade, EngineError> {
        let Some(position) = self.position.take() else {
            return Err(EngineError::Invariant(
                "attempted to close with no open position".to_string(),
            ));
        };

        let realized_pnl = position.unrealized_pnl(exit_price);
        self.portfolio.cash_balance += realized_pnl;
        self.portfolio.realized_pnl_total += realized_pnl;
        self.portfolio.unrealized_pnl = Decimal::ZERO;

        let trade = ClosedTrade {
            side: position.side,
            entry_price: position.entry_price,
            entry_time: position.entry_time,
            quantity: position.quantity,
            initial_stop_loss: position.initial_stop_loss,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            strategy_version: position.strategy_version,
            exit_price,
            exit_time,
            exit_reason,
            realized_pnl,
        };
        self.closed_trades.push(trade.clone());
        Ok(trade)
    }

    /// Recomputes the derived unrealized pnl; zero when flat.
    pub fn mark_to_market(&mut self, price: Decimal) -> &Portfolio {
        self.portfolio.unrealized_pnl = self
            .position
            .as_ref()
            .map_or(Decimal::ZERO, |p| p.unrealized_pnl(price));
        &self.portfolio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long_signal() -> Signal {
        Signal {
            side: Side::Long,
            entry_price: dec!(120),
            stop_loss: dec!(100),
            take_profit: dec!(320),
            size: dec!(0.5),
            detected_at: Utc::now(),
            ema_short: dec!(104),
            ema_long: dec!(102),
            atr: dec!(1.5),
            swing_low: dec!(100.75),
            swing_high: dec!(121),
        }
    }

    fn short_signal() -> Signal {
        Signal {
            side: Side::Short,
            entry_price: dec!(120),
            stop_loss: dec!(130),
            take_profit: dec!(20),
            size: dec!(1),
            detected_at: Utc::now(),
            ema_short: dec!(118),
            ema_long: dec!(119),
            atr: dec!(2),
            swing_low: dec!(115),
            swing_high: dec!(129),
        }
    }

    fn candle(high: Decimal, low: Decimal) -> Candle {
        Candle {
            open_time: Utc::now(),
            open: (high + low) / dec!(2),
            high,
            low,
            close: (high + low) / dec!(2),
            volume: dec!(1),
        }
    }

    #[test]
    fn at_most_one_position_exists() {
        let mut manager = PositionManager::new(dec!(500));
        manager
            .open(&long_signal(), StrategyVersion::V2, Utc::now())
            .unwrap();

        let err = manager
            .open(&long_signal(), StrategyVersion::V2, Utc::now())
            .unwrap_err();
        assert!(matches!(err, EngineError::Invariant(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn long_stop_is_non_decreasing() {
        let mut manager = PositionManager::new(dec!(500));
        manager
            .open(&long_signal(), StrategyVersion::V2, Utc::now())
            .unwrap();

        assert_eq!(manager.trail_stop(dec!(105)).unwrap(), Some((dec!(100), dec!(105))));
        // A looser proposal never relaxes risk
        assert_eq!(manager.trail_stop(dec!(101)).unwrap(), None);
        assert_eq!(manager.position().unwrap().stop_loss, dec!(105));
        assert_eq!(manager.trail_stop(dec!(110)).unwrap(), Some((dec!(105), dec!(110))));
    }

    #[test]
    fn short_stop_is_non_increasing() {
        let mut manager = PositionManager::new(dec!(500));
        manager
            .open(&short_signal(), StrategyVersion::V2, Utc::now())
            .unwrap();

        assert_eq!(manager.trail_stop(dec!(125)).unwrap(), Some((dec!(130), dec!(125))));
        assert_eq!(manager.trail_stop(dec!(128)).unwrap(), None);
        assert_eq!(manager.position().unwrap().stop_loss, dec!(125));
    }

    #[test]
    fn tick_below_long_stop_exits_at_stop_level() {
        let mut manager = PositionManager::new(dec!(500));
        manager
            .open(&long_signal(), StrategyVersion::V2, Utc::now())
            .unwrap();

        // Tick at 99 crosses the 100 stop; the fill is the stop level.
        let (exit_price, reason) = manager.exit_on_tick(dec!(99)).unwrap();
        assert_eq!(exit_price, dec!(100));
        assert_eq!(reason, ExitReason::StopLoss);
    }

    #[test]
    fn tick_inside_range_does_not_exit() {
        let mut manager = PositionManager::new(dec!(500));
        manager
            .open(&long_signal(), StrategyVersion::V2, Utc::now())
            .unwrap();
        assert!(manager.exit_on_tick(dec!(150)).is_none());
    }

    #[test]
    fn candle_crossing_both_levels_prefers_stop() {
        let mut manager = PositionManager::new(dec!(500));
        manager
            .open(&long_signal(), StrategyVersion::V2, Utc::now())
            .unwrap();

        // Range covers both the 100 stop and the 320 target.
        let (exit_price, reason) = manager.exit_on_candle(&candle(dec!(400), dec!(50))).unwrap();
        assert_eq!(exit_price, dec!(100));
        assert_eq!(reason, ExitReason::StopLoss);
    }

    #[test]
    fn short_candle_exit_checks_high_against_stop() {
        let mut manager = PositionManager::new(dec!(500));
        manager
            .open(&short_signal(), StrategyVersion::V2, Utc::now())
            .unwrap();

        let (exit_price, reason) = manager.exit_on_candle(&candle(dec!(131), dec!(119))).unwrap();
        assert_eq!(exit_price, dec!(130));
        assert_eq!(reason, ExitReason::StopLoss);
    }

    #[test]
    fn close_realizes_pnl_into_cash() {
        let mut manager = PositionManager::new(dec!(500));
        manager
            .open(&long_signal(), StrategyVersion::V2, Utc::now())
            .unwrap();

        // 0.5 quantity, entry 120, exit at the 100 stop: pnl = -10
        let trade = manager
            .close(dec!(100), Utc::now(), ExitReason::StopLoss)
            .unwrap();
        assert_eq!(trade.realized_pnl, dec!(-10));
        assert_eq!(manager.portfolio().cash_balance, dec!(490));
        assert_eq!(manager.portfolio().realized_pnl_total, dec!(-10));
        assert_eq!(manager.portfolio().unrealized_pnl, dec!(0));
        assert!(manager.is_flat());
        assert_eq!(manager.closed_trades().len(), 1);
    }

    #[test]
    fn close_when_flat_is_fatal() {
        let mut manager = PositionManager::new(dec!(500));
        let err = manager
            .close(dec!(100), Utc::now(), ExitReason::StopLoss)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn mark_to_market_is_derived_only() {
        let mut manager = PositionManager::new(dec!(500));
        manager
            .open(&long_signal(), StrategyVersion::V2, Utc::now())
            .unwrap();

        let portfolio = manager.mark_to_market(dec!(130));
        assert_eq!(portfolio.unrealized_pnl, dec!(5));
        // Cash is untouched by marks
        assert_eq!(portfolio.cash_balance, dec!(500));

        manager.close(dec!(130), Utc::now(), ExitReason::TakeProfit).unwrap();
        let portfolio = manager.mark_to_market(dec!(200));
        assert_eq!(portfolio.unrealized_pnl, dec!(0));
    }
}
