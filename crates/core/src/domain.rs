use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a signal or position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

/// A single OHLCV candle. Immutable once received; ordered and deduplicated
/// by `open_time` at the feed boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Latest traded price from the live ticker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Indicator values for one candle close. `None` means the value is still
/// warming up; consumers must treat an undefined value as "no signal
/// possible".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub ema_short: Option<Decimal>,
    pub ema_long: Option<Decimal>,
    pub atr: Option<Decimal>,
    pub swing_low: Option<Decimal>,
    pub swing_high: Option<Decimal>,
}

/// Trailing-stop policy selector. The variants differ only in which EMA
/// anchors the trailing stop per side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyVersion {
    V1,
    #[default]
    V2,
    V3,
}

/// An accepted entry decision, carrying the market state that produced it so
/// the sink can record every decision with full context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub side: Side,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub size: Decimal,
    pub detected_at: DateTime<Utc>,
    pub ema_short: Decimal,
    pub ema_long: Decimal,
    pub atr: Decimal,
    pub swing_low: Decimal,
    pub swing_high: Decimal,
}

/// The single mutable entity of the system. `stop_loss` is the trailing
/// stop and only ever moves in the favorable direction;
/// `initial_stop_loss` is kept for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub quantity: Decimal,
    pub stop_loss: Decimal,
    pub initial_stop_loss: Decimal,
    pub take_profit: Decimal,
    pub strategy_version: StrategyVersion,
}

impl Position {
    /// Mark-to-market pnl at `price`.
    #[must_use]
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        match self.side {
            Side::Long => (price - self.entry_price) * self.quantity,
            Side::Short => (self.entry_price - price) * self.quantity,
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
}

/// A completed round trip. Immutable once created; appended to trade
/// history, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub side: Side,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub quantity: Decimal,
    pub initial_stop_loss: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub strategy_version: StrategyVersion,
    pub exit_price: Decimal,
    pub exit_time: DateTime<Utc>,
    pub exit_reason: ExitReason,
    pub realized_pnl: Decimal,
}

/// Account state. `cash_balance` moves only when a trade closes;
/// `unrealized_pnl` is derived and recomputed on every live tick while a
/// position is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub initial_capital: Decimal,
    pub cash_balance: Decimal,
    pub realized_pnl_total: Decimal,
    pub unrealized_pnl: Decimal,
}

impl Portfolio {
    #[must_use]
    pub const fn new(initial_capital: Decimal) -> Self {
        Self {
            initial_capital,
            cash_balance: initial_capital,
            realized_pnl_total: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
        }
    }

    /// Cash plus open-position mark-to-market.
    #[must_use]
    pub fn equity(&self) -> Decimal {
        self.cash_balance + self.unrealized_pnl
    }
}
