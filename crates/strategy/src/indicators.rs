use paper_trade_core::domain::{Candle, IndicatorSnapshot};
use paper_trade_core::StrategyConfig;
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Computes EMA(short), EMA(long), ATR, and swing high/low from an ordered
/// candle sequence. Pure function of the input history; one snapshot per
/// candle, computed in a single incremental pass.
///
/// Warm-up behavior (documented, consistent):
/// - EMA is `None` until `period` candles exist; the seed value is the SMA
///   of the first `period` closes, then the standard recursion
///   `ema = alpha * close + (1 - alpha) * prev` with `alpha = 2 / (period + 1)`.
/// - ATR is the rolling mean of the last `atr_period` true ranges. True
///   range needs a previous close, so ATR is `None` until `atr_period + 1`
///   candles exist.
/// - Swing low/high are the min low / max high over the last
///   `swing_lookback` candles (current candle inclusive); `None` until the
///   window fills.
pub struct IndicatorCalculator {
    ema_short_period: usize,
    ema_long_period: usize,
    atr_period: usize,
    swing_lookback: usize,
}

impl IndicatorCalculator {
    /// # Panics
    ///
    /// Panics if any period is zero.
    #[must_use]
    pub fn new(
        ema_short_period: usize,
        ema_long_period: usize,
        atr_period: usize,
        swing_lookback: usize,
    ) -> Self {
        assert!(ema_short_period >= 1, "EMA short period must be >= 1");
        assert!(ema_long_period >= 1, "EMA long period must be >= 1");
        assert!(atr_period >= 1, "ATR period must be >= 1");
        assert!(swing_lookback >= 1, "swing lookback must be >= 1");
        Self {
            ema_short_period,
            ema_long_period,
            atr_period,
            swing_lookback,
        }
    }

    #[must_use]
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(
            config.ema_short_period,
            config.ema_long_period,
            config.atr_period,
            config.swing_lookback,
        )
    }

    /// Candles required before the two most recent snapshots are both fully
    /// defined — the minimum history for signal evaluation.
    #[must_use]
    pub fn min_history(&self) -> usize {
        self.ema_long_period
            .max(self.ema_short_period)
            .max(self.atr_period + 1)
            .max(self.swing_lookback)
            + 1
    }

    /// One snapshot per input candle, in order.
    #[must_use]
    pub fn compute(&self, candles: &[Candle]) -> Vec<IndicatorSnapshot> {
        let mut snapshots = Vec::with_capacity(candles.len());
        let mut ema_short = EmaState::new(self.ema_short_period);
        let mut ema_long = EmaState::new(self.ema_long_period);
        let mut true_ranges: VecDeque<Decimal> = VecDeque::with_capacity(self.atr_period + 1);

        for (i, candle) in candles.iter().enumerate() {
            let short = ema_short.update(candle.close);
            let long = ema_long.update(candle.close);

            if i > 0 {
                let prev_close = candles[i - 1].close;
                let tr = (candle.high - candle.low)
                    .max((candle.high - prev_close).abs())
                    .max((candle.low - prev_close).abs());
                true_ranges.push_back(tr);
                if true_ranges.len() > self.atr_period {
                    true_ranges.pop_front();
                }
            }
            let atr = (true_ranges.len() == self.atr_period).then(|| {
                true_ranges.iter().copied().sum::<Decimal>() / Decimal::from(self.atr_period as u64)
            });

            let (swing_low, swing_high) = if i + 1 >= self.swing_lookback {
                let window = &candles[i + 1 - self.swing_lookback..=i];
                (
                    window.iter().map(|c| c.low).min(),
                    window.iter().map(|c| c.high).max(),
                )
            } else {
                (None, None)
            };

            snapshots.push(IndicatorSnapshot {
                ema_short: short,
                ema_long: long,
                atr,
                swing_low,
                swing_high,
            });
        }

        snapshots
    }
}

/// Recursive EMA seeded with the SMA of the first `period` closes.
struct EmaState {
    period: usize,
    seen: usize,
    seed_sum: Decimal,
    alpha: Decimal,
    value: Option<Decimal>,
}

impl EmaState {
    fn new(period: usize) -> Self {
        Self {
            period,
            seen: 0,
            seed_sum: Decimal::ZERO,
            alpha: Decimal::from(2) / Decimal::from(period as u64 + 1),
            value: None,
        }
    }

    fn update(&mut self, close: Decimal) -> Option<Decimal> {
        self.seen += 1;
        match self.value {
            None => {
                self.seed_sum += close;
                if self.seen == self.period {
                    self.value = Some(self.seed_sum / Decimal::from(self.period as u64));
                }
            }
            Some(prev) => {
                self.value = Some(self.alpha * close + (Decimal::ONE - self.alpha) * prev);
            }
        }
        self.value
    }
}
