use crate::client::{CandleRecord, DeltaClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paper_trade_core::domain::{Candle, PriceTick};
use paper_trade_core::error::EngineError;
use paper_trade_core::traits::MarketData;
use rust_decimal::Decimal;

/// `MarketData` implementation over the Delta REST client. Returns candles
/// ordered by open time and deduplicated, with prices validated before they
/// reach the engine.
pub struct DeltaMarketData {
    client: DeltaClient,
    symbol: String,
    resolution: String,
}

impl DeltaMarketData {
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // String cannot be used in const fn
    pub fn new(client: DeltaClient, symbol: String, resolution: String) -> Self {
        Self {
            client,
            symbol,
            resolution,
        }
    }

    /// Parse a resolution string (e.g. "1m", "1h", "1d") to seconds.
    fn resolution_secs(&self) -> Result<i64, EngineError> {
        let resolution = &self.resolution;
        let parse = |suffix: char, scale: i64| -> Result<i64, EngineError> {
            resolution
                .trim_end_matches(suffix)
                .parse::<i64>()
                .map(|n| n * scale)
                .map_err(|_| {
                    EngineError::Data(format!(
                        "invalid resolution format: {resolution}. Expected format: 1m, 5m, 1h, 1d"
                    ))
                })
        };
        if resolution.ends_with('m') {
            parse('m', 60)
        } else if resolution.ends_with('h') {
            parse('h', 3600)
        } else if resolution.ends_with('d') {
            parse('d', 86400)
        } else {
            Err(EngineError::Data(format!(
                "invalid resolution format: {resolution}. Expected format: 1m, 5m, 1h, 1d"
            )))
        }
    }
}

#[async_trait]
impl MarketData for DeltaMarketData {
    async fn fetch_candles(&self, count: usize) -> Result<Vec<Candle>, EngineError> {
        let end = Utc::now().timestamp();
        let span = i64::try_from(count)
            .map_err(|_| EngineError::Data(format!("candle count {count} too large")))?
            * self.resolution_secs()?;
        let start = end - span;

        let records = self
            .client
            .history_candles(&self.symbol, &self.resolution, start, end)
            .await?;

        let mut candles = records
            .into_iter()
            .map(record_to_candle)
            .collect::<Result<Vec<_>, _>>()?;
        candles.sort_by_key(|c| c.open_time);
        candles.dedup_by_key(|c| c.open_time);
        tracing::debug!(
            symbol = %self.symbol,
            count = candles.len(),
            "fetched candle history"
        );
        Ok(candles)
    }

    async fn fetch_live_price(&self) -> Result<PriceTick, EngineError> {
        let ticker = self.client.ticker(&self.symbol).await?;
        let price = decimal_from_f64(ticker.close, "ticker close")?;
        if price <= Decimal::ZERO {
            return Err(EngineError::Data(format!(
                "ticker for {} returned non-positive price {price}",
                self.symbol
            )));
        }
        Ok(PriceTick {
            price,
            timestamp: Utc::now(),
        })
    }
}

fn record_to_candle(record: CandleRecord) -> Result<Candle, EngineError> {
    let open_time = DateTime::from_timestamp(record.time, 0).ok_or_else(|| {
        EngineError::Data(format!("candle has invalid timestamp {}", record.time))
    })?;

    let candle = Candle {
        open_time,
        open: decimal_from_f64(record.open, "open")?,
        high: decimal_from_f64(record.high, "high")?,
        low: decimal_from_f64(record.low, "low")?,
        close: decimal_from_f64(record.close, "close")?,
        volume: decimal_from_f64(record.volume, "volume")?,
    };

    if candle.open <= Decimal::ZERO
        || candle.high <= Decimal::ZERO
        || candle.low <= Decimal::ZERO
        || candle.close <= Decimal::ZERO
    {
        return Err(EngineError::Data(format!(
            "candle at {open_time} has non-positive prices"
        )));
    }
    Ok(candle)
}

fn decimal_from_f64(value: f64, field: &str) -> Result<Decimal, EngineError> {
    Decimal::try_from(value)
        .map_err(|_| EngineError::Data(format!("candle field {field} has non-finite value {value}")))
}
