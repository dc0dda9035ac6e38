use chrono::{DateTime, Utc};
use paper_trade_core::domain::{Candle, Portfolio, Position, PriceTick};
use paper_trade_core::error::EngineError;
use serde::Serialize;
use tokio::sync::oneshot;

/// Everything that enters the engine actor's mailbox. The mailbox is the
/// single mutual-exclusion boundary around trading state: candle cycles,
/// price checks, and control messages are serialized here and can never
/// interleave partially.
#[derive(Debug)]
pub enum EngineMessage {
    /// Fresh candle history from the candle poller.
    Candles(Vec<Candle>),

    /// Live price from the price poller.
    PriceTick(PriceTick),

    /// A poller's fetch failed; the cycle is skipped without touching state.
    FetchFailed {
        context: &'static str,
        error: EngineError,
    },

    /// Snapshot request from a handle.
    GetStatus(oneshot::Sender<EngineStatus>),

    /// Graceful stop: finish the in-flight cycle, flush, exit.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Running,
    Halted,
    Stopped,
}

/// Point-in-time view of the engine for dashboards and the CLI summary.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub portfolio: Portfolio,
    pub position: Option<Position>,
    pub closed_trades: usize,
    pub last_candle_time: Option<DateTime<Utc>>,
    pub last_heartbeat: DateTime<Utc>,
}

impl EngineStatus {
    #[must_use]
    pub fn initial(portfolio: Portfolio) -> Self {
        Self {
            state: EngineState::Running,
            portfolio,
            position: None,
            closed_trades: 0,
            last_candle_time: None,
            last_heartbeat: Utc::now(),
        }
    }
}
