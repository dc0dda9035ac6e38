use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paper_trade_core::domain::ClosedTrade;
use paper_trade_core::error::EngineError;
use paper_trade_core::events::EngineEvent;
use paper_trade_core::traits::EventSink;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// File-based persistence sink: every event as a JSON line, plus one CSV
/// row per closed trade. Files are stamped with the session start so
/// successive runs never clobber each other.
pub struct TradeLogSink {
    events: BufWriter<File>,
    trades: csv::Writer<File>,
}

impl TradeLogSink {
    /// Creates `events_<session>.jsonl` and `trades_<session>.csv` under
    /// `dir`, writing the CSV header row immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be created.
    pub fn create(dir: &Path, session_started: DateTime<Utc>) -> anyhow::Result<Self> {
        let session = session_started.format("%Y%m%d_%H%M%S");

        let events_path = dir.join(format!("events_{session}.jsonl"));
        let events = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&events_path)?,
        );

        let trades_path = dir.join(format!("trades_{session}.csv"));
        let mut trades = csv::Writer::from_writer(File::create(&trades_path)?);
        trades.write_record([
            "side",
            "entry_time",
            "entry_price",
            "quantity",
            "initial_stop_loss",
            "final_stop_loss",
            "take_profit",
            "exit_time",
            "exit_price",
            "exit_reason",
            "realized_pnl",
            "strategy_version",
        ])?;
        trades.flush()?;

        tracing::info!(events = %events_path.display(), trades = %trades_path.display(), "trade log opened");
        Ok(Self { events, trades })
    }

    fn write_trade(&mut self, trade: &ClosedTrade) -> Result<(), EngineError> {
        self.trades
            .write_record([
                format!("{:?}", trade.side),
                trade.entry_time.to_rfc3339(),
                trade.entry_price.to_string(),
                trade.quantity.to_string(),
                trade.initial_stop_loss.to_string(),
                trade.stop_loss.to_string(),
                trade.take_profit.to_string(),
                trade.exit_time.to_rfc3339(),
                trade.exit_price.to_string(),
                format!("{:?}", trade.exit_reason),
                trade.realized_pnl.to_string(),
                format!("{:?}", trade.strategy_version).to_lowercase(),
            ])
            .map_err(|e| EngineError::Data(format!("failed to write trade row: {e}")))
    }
}

#[async_trait]
impl EventSink for TradeLogSink {
    async fn publish(&mut self, event: &EngineEvent) -> Result<(), EngineError> {
        let line = serde_json::to_string(event)
            .map_err(|e| EngineError::Data(format!("failed to serialize event: {e}")))?;
        writeln!(self.events, "{line}")
            .map_err(|e| EngineError::Data(format!("failed to write event: {e}")))?;

        if let EngineEvent::PositionClosed(trade) = event {
            self.write_trade(trade)?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), EngineError> {
        self.events
            .flush()
            .map_err(|e| EngineError::Data(format!("failed to flush events: {e}")))?;
        self.trades
            .flush()
            .map_err(|e| EngineError::Data(format!("failed to flush trades: {e}")))
    }
}

/// Discards everything. For tests and dry runs.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn publish(&mut self, _event: &EngineEvent) -> Result<(), EngineError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paper_trade_core::domain::{ExitReason, Portfolio, Side, StrategyVersion};
    use rust_decimal_macros::dec;

    fn sample_trade() -> ClosedTrade {
        ClosedTrade {
            side: Side::Long,
            entry_price: dec!(120),
            entry_time: Utc::now(),
            quantity: dec!(0.5),
            initial_stop_loss: dec!(100),
            stop_loss: dec!(104),
            take_profit: dec!(320),
            strategy_version: StrategyVersion::V2,
            exit_price: dec!(104),
            exit_time: Utc::now(),
            exit_reason: ExitReason::StopLoss,
            realized_pnl: dec!(-8),
        }
    }

    #[tokio::test]
    async fn events_and_trades_land_in_files() {
        let dir = tempfile::tempdir().unwrap();
        let started = Utc::now();
        let mut sink = TradeLogSink::create(dir.path(), started).unwrap();

        sink.publish(&EngineEvent::PortfolioUpdate {
            portfolio: Portfolio::new(dec!(500)),
            timestamp: Utc::now(),
        })
        .await
        .unwrap();
        sink.publish(&EngineEvent::PositionClosed(sample_trade()))
            .await
            .unwrap();
        sink.flush().await.unwrap();

        let session = started.format("%Y%m%d_%H%M%S");
        let events =
            std::fs::read_to_string(dir.path().join(format!("events_{session}.jsonl"))).unwrap();
        assert_eq!(events.lines().count(), 2);
        assert!(events.contains("\"event\":\"portfolio_update\""));

        let trades =
            std::fs::read_to_string(dir.path().join(format!("trades_{session}.csv"))).unwrap();
        let mut lines = trades.lines();
        assert!(lines.next().unwrap().starts_with("side,entry_time"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("Long,"));
        assert!(row.contains("StopLoss"));
        assert!(row.contains("-8"));
        assert!(row.ends_with("v2"));
    }
}
