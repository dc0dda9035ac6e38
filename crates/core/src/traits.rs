use crate::domain::{Candle, PriceTick};
use crate::error::EngineError;
use crate::events::EngineEvent;
use async_trait::async_trait;

/// Source of candles and live prices. Implementations must return candles
/// ordered by open time and deduplicated; the engine never retries, a
/// failed fetch simply skips that cycle.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn fetch_candles(&self, count: usize) -> Result<Vec<Candle>, EngineError>;
    async fn fetch_live_price(&self) -> Result<PriceTick, EngineError>;
}

/// Destination for engine events (file, database, message queue). Called
/// once per event, in execution order.
#[async_trait]
pub trait EventSink: Send {
    async fn publish(&mut self, event: &EngineEvent) -> Result<(), EngineError>;

    async fn flush(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}
