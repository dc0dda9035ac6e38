use crate::risk::RiskManager;
use paper_trade_core::domain::{Candle, IndicatorSnapshot, Side, Signal};
use paper_trade_core::error::EngineError;
use paper_trade_core::StrategyConfig;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Detects entry conditions on newly closed candles.
///
/// Only a true crossover triggers: the prior bar's EMAs must sit on the
/// opposite side (or be equal) for the current bar's alignment to count.
/// A trend that is merely "already above" never re-triggers while flat,
/// which prevents duplicate entries long after the cross event.
pub struct SignalDetector {
    atr_multiplier: Decimal,
    risk_reward_ratio: Decimal,
}

impl SignalDetector {
    /// # Panics
    ///
    /// Panics if the f64 parameters cannot be converted to `Decimal`.
    #[must_use]
    pub fn new(atr_multiplier: f64, risk_reward_ratio: f64) -> Self {
        Self {
            atr_multiplier: Decimal::from_str(&atr_multiplier.to_string()).unwrap(),
            risk_reward_ratio: Decimal::from_str(&risk_reward_ratio.to_string()).unwrap(),
        }
    }

    #[must_use]
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(config.atr_multiplier, config.risk_reward_ratio)
    }

    /// Evaluates the two most recent snapshots against the newly closed
    /// candle. Must only be called while flat.
    ///
    /// Returns `Ok(None)` when no crossover fired or indicators are still
    /// warming up.
    ///
    /// # Errors
    ///
    /// `Validation` when a crossover fired but the computed risk was not
    /// strictly positive (the caller discards the signal — no trade).
    /// Sizing errors from the risk manager propagate unchanged.
    pub fn evaluate(
        &self,
        prior: &IndicatorSnapshot,
        current: &IndicatorSnapshot,
        candle: &Candle,
        risk_manager: &RiskManager,
        cash_balance: Decimal,
    ) -> Result<Option<Signal>, EngineError> {
        let (Some(short_now), Some(long_now), Some(short_prev), Some(long_prev)) = (
            current.ema_short,
            current.ema_long,
            prior.ema_short,
            prior.ema_long,
        ) else {
            return Ok(None);
        };
        let (Some(atr), Some(swing_low), Some(swing_high)) =
            (current.atr, current.swing_low, current.swing_high)
        else {
            return Ok(None);
        };

        let crossed_up = short_prev <= long_prev && short_now > long_now;
        let crossed_down = short_prev >= long_prev && short_now < long_now;

        let side = if crossed_up && candle.close > short_now {
            Side::Long
        } else if crossed_down && candle.close < short_now {
            Side::Short
        } else {
            return Ok(None);
        };

        let entry_price = candle.close;
        let (stop_loss, risk_per_unit) = match side {
            Side::Long => {
                let stop = swing_low - self.atr_multiplier * atr;
                (stop, entry_price - stop)
            }
            Side::Short => {
                let stop = swing_high + self.atr_multiplier * atr;
                (stop, stop - entry_price)
            }
        };

        if risk_per_unit <= Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "non-positive risk {risk_per_unit} for {side:?} entry at {entry_price}"
            )));
        }

        let take_profit = match side {
            Side::Long => entry_price + risk_per_unit * self.risk_reward_ratio,
            Side::Short => entry_price - risk_per_unit * self.risk_reward_ratio,
        };
        let size = risk_manager.size_position(cash_balance, risk_per_unit)?;

        Ok(Some(Signal {
            side,
            entry_price,
            stop_loss,
            take_profit,
            size,
            detected_at: candle.open_time,
            ema_short: short_now,
            ema_long: long_now,
            atr,
            swing_low,
            swing_high,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn detector() -> SignalDetector {
        SignalDetector::new(0.5, 10.0)
    }

    fn risk_manager() -> RiskManager {
        RiskManager::new(dec!(500), 0.02, 0.10)
    }

    fn candle(close: Decimal) -> Candle {
        Candle {
            open_time: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
        }
    }

    fn snapshot(
        ema_short: Decimal,
        ema_long: Decimal,
        atr: Decimal,
        swing_low: Decimal,
        swing_high: Decimal,
    ) -> IndicatorSnapshot {
        IndicatorSnapshot {
            ema_short: Some(ema_short),
            ema_long: Some(ema_long),
            atr: Some(atr),
            swing_low: Some(swing_low),
            swing_high: Some(swing_high),
        }
    }

    #[test]
    fn upward_cross_with_close_above_ema_is_long() {
        // Prior bar: EMA9 below EMA20. Current bar: crossed above, close above EMA9.
        let prior = snapshot(dec!(99), dec!(100), dec!(2), dec!(96), dec!(104));
        let current = snapshot(dec!(102), dec!(101), dec!(2), dec!(97), dec!(106));
        let signal = detector()
            .evaluate(&prior, &current, &candle(dec!(105)), &risk_manager(), dec!(500))
            .unwrap()
            .unwrap();

        assert_eq!(signal.side, Side::Long);
        assert_eq!(signal.entry_price, dec!(105));
        // stop = swing_low - 0.5 * atr = 97 - 1 = 96
        assert_eq!(signal.stop_loss, dec!(96));
        // tp = entry + 10 * (entry - stop) = 105 + 90 = 195
        assert_eq!(signal.take_profit, dec!(195));
        // size = 0.02 * 500 / 9
        assert_eq!(signal.size, dec!(10) / dec!(9));
        assert_eq!(signal.atr, dec!(2));
        assert_eq!(signal.swing_low, dec!(97));
    }

    #[test]
    fn already_above_does_not_retrigger() {
        // Both bars above: no state change, no signal, even though the
        // static "EMA9 > EMA20 and close > EMA9" condition holds.
        let prior = snapshot(dec!(102), dec!(100), dec!(2), dec!(96), dec!(104));
        let current = snapshot(dec!(103), dec!(101), dec!(2), dec!(97), dec!(106));
        let result = detector()
            .evaluate(&prior, &current, &candle(dec!(105)), &risk_manager(), dec!(500))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn cross_without_close_confirmation_is_ignored() {
        let prior = snapshot(dec!(99), dec!(100), dec!(2), dec!(96), dec!(104));
        let current = snapshot(dec!(102), dec!(101), dec!(2), dec!(97), dec!(106));
        // Close below EMA9: alignment incomplete.
        let result = detector()
            .evaluate(&prior, &current, &candle(dec!(101)), &risk_manager(), dec!(500))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn downward_cross_is_short_with_mirrored_levels() {
        let prior = snapshot(dec!(101), dec!(100), dec!(2), dec!(96), dec!(104));
        let current = snapshot(dec!(99), dec!(100), dec!(2), dec!(94), dec!(102));
        let signal = detector()
            .evaluate(&prior, &current, &candle(dec!(97)), &risk_manager(), dec!(500))
            .unwrap()
            .unwrap();

        assert_eq!(signal.side, Side::Short);
        // stop = swing_high + 0.5 * atr = 102 + 1 = 103
        assert_eq!(signal.stop_loss, dec!(103));
        // tp = entry - 10 * (stop - entry) = 97 - 60 = 37
        assert_eq!(signal.take_profit, dec!(37));
    }

    #[test]
    fn non_positive_risk_is_a_validation_error() {
        // Swing low far above the close makes the long stop sit above entry.
        let prior = snapshot(dec!(99), dec!(100), dec!(2), dec!(96), dec!(104));
        let current = snapshot(dec!(102), dec!(101), dec!(2), dec!(120), dec!(130));
        let err = detector()
            .evaluate(&prior, &current, &candle(dec!(105)), &risk_manager(), dec!(500))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn undefined_atr_means_no_signal() {
        let prior = snapshot(dec!(99), dec!(100), dec!(2), dec!(96), dec!(104));
        let mut current = snapshot(dec!(102), dec!(101), dec!(2), dec!(97), dec!(106));
        current.atr = None;
        let result = detector()
            .evaluate(&prior, &current, &candle(dec!(105)), &risk_manager(), dec!(500))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn warmup_prior_snapshot_means_no_signal() {
        let prior = IndicatorSnapshot::default();
        let current = snapshot(dec!(102), dec!(101), dec!(2), dec!(97), dec!(106));
        let result = detector()
            .evaluate(&prior, &current, &candle(dec!(105)), &risk_manager(), dec!(500))
            .unwrap();
        assert!(result.is_none());
    }
}
