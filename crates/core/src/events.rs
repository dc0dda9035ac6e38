use crate::domain::{ClosedTrade, Portfolio, Position, Side, Signal};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Observable output of the engine. One event per occurrence, emitted in
/// execution order; the sink receives every one of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// An entry condition became true on a candle close.
    SignalDetected(Signal),

    /// The signal was accepted and the position slot filled.
    PositionOpened(Position),

    /// The trailing stop moved in the favorable direction.
    StopTrailed {
        side: Side,
        old_stop: Decimal,
        new_stop: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// The position hit its stop or target.
    PositionClosed(ClosedTrade),

    /// Periodic account snapshot; at least once per live-price cycle while
    /// a position is open, and once at shutdown.
    PortfolioUpdate {
        portfolio: Portfolio,
        timestamp: DateTime<Utc>,
    },

    /// A market-data fetch failed; the cycle was skipped without touching
    /// state.
    DataWarning {
        context: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}
