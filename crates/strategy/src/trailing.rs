use paper_trade_core::domain::{Side, StrategyVersion};
use rust_decimal::Decimal;

/// Computes the updated trailing stop on each candle close while a position
/// is open. Never applied on live ticks — trailing reacts to the candle
/// time frame, not tick noise.
///
/// One controller, parameterized by `StrategyVersion`; the versions differ
/// only in which EMA anchors the stop per side:
///
/// | Version | LONG anchor | SHORT anchor |
/// |---------|-------------|--------------|
/// | v1      | EMA long    | EMA long     |
/// | v2      | EMA long    | EMA short    |
/// | v3      | EMA short   | EMA long     |
#[derive(Debug, Clone, Copy)]
pub struct TrailingStopController {
    version: StrategyVersion,
}

impl TrailingStopController {
    #[must_use]
    pub const fn new(version: StrategyVersion) -> Self {
        Self { version }
    }

    const fn anchor(self, side: Side, ema_short: Decimal, ema_long: Decimal) -> Decimal {
        match (self.version, side) {
            (StrategyVersion::V1 | StrategyVersion::V2, Side::Long)
            | (StrategyVersion::V1 | StrategyVersion::V3, Side::Short) => ema_long,
            (StrategyVersion::V3, Side::Long) | (StrategyVersion::V2, Side::Short) => ema_short,
        }
    }

    /// Proposed stop after a candle close. Monotonic: `max(old, anchor)`
    /// for LONG, `min(old, anchor)` for SHORT — risk is never relaxed.
    /// Undefined EMAs leave the stop unchanged.
    #[must_use]
    pub fn proposed_stop(
        &self,
        side: Side,
        old_stop: Decimal,
        ema_short: Option<Decimal>,
        ema_long: Option<Decimal>,
    ) -> Decimal {
        let (Some(short), Some(long)) = (ema_short, ema_long) else {
            return old_stop;
        };
        let anchor = self.anchor(side, short, long);
        match side {
            Side::Long => old_stop.max(anchor),
            Side::Short => old_stop.min(anchor),
        }
    }
}
