use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use paper_trade_core::error::EngineError;
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Raw candle row from `/v2/history/candles`. Timestamps are epoch seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct CandleRecord {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

#[derive(Debug, Deserialize)]
struct CandleHistoryResponse {
    result: Vec<CandleRecord>,
}

/// Raw ticker from `/v2/tickers/{symbol}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerRecord {
    pub symbol: String,
    pub close: f64,
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    result: TickerRecord,
}

/// Thin REST wrapper for the Delta Exchange public endpoints the engine
/// needs. Requests share one HTTP client with a hard timeout and a local
/// rate limiter; every failure maps to `EngineError::Data` so a bad cycle
/// is skipped, never fatal.
pub struct DeltaClient {
    http_client: Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter<governor::state::direct::NotKeyed, InMemoryState, DefaultClock>>,
}

impl DeltaClient {
    /// # Errors
    ///
    /// Returns `Data` if the HTTP client cannot be constructed.
    ///
    /// # Panics
    ///
    /// Never — the rate-limiter quota is a non-zero constant.
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, EngineError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Data(format!("failed to build HTTP client: {e}")))?;

        // Delta allows 10k requests per 5 minutes; 10/s keeps us far under it.
        let quota = Quota::per_second(NonZeroU32::new(10).unwrap());
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            http_client,
            base_url,
            rate_limiter,
        })
    }

    /// Fetches candle history for `[start, end]` (epoch seconds).
    ///
    /// # Errors
    ///
    /// `Data` on transport failure, non-2xx status, or a malformed body.
    pub async fn history_candles(
        &self,
        symbol: &str,
        resolution: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<CandleRecord>, EngineError> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}/v2/history/candles", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("symbol", symbol),
                ("resolution", resolution),
                ("start", &start.to_string()),
                ("end", &end.to_string()),
            ])
            .send()
            .await
            .map_err(|e| EngineError::Data(format!("candle request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Data(format!(
                "candle request returned HTTP {status}: {body}"
            )));
        }

        let payload: CandleHistoryResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Data(format!("malformed candle response: {e}")))?;
        Ok(payload.result)
    }

    /// Fetches the live ticker for `symbol`.
    ///
    /// # Errors
    ///
    /// `Data` on transport failure, non-2xx status, or a malformed body.
    pub async fn ticker(&self, symbol: &str) -> Result<TickerRecord, EngineError> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}/v2/tickers/{symbol}", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Data(format!("ticker request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Data(format!(
                "ticker request returned HTTP {status}: {body}"
            )));
        }

        let payload: TickerResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Data(format!("malformed ticker response: {e}")))?;
        Ok(payload.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candle_history_payload_parses() {
        let body = r#"{
            "success": true,
            "result": [
                {"time": 1755100800, "open": 118000.5, "high": 118500.0,
                 "low": 117800.25, "close": 118200.0, "volume": 1234.5},
                {"time": 1755104400, "open": 118200.0, "high": 118900.0,
                 "low": 118100.0, "close": 118750.5, "volume": 987.0}
            ]
        }"#;
        let payload: CandleHistoryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(payload.result.len(), 2);
        assert_eq!(payload.result[0].time, 1_755_100_800);
        assert!((payload.result[1].close - 118_750.5).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_volume_defaults_to_zero() {
        let body = r#"{"result": [{"time": 1, "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5}]}"#;
        let payload: CandleHistoryResponse = serde_json::from_str(body).unwrap();
        assert!((payload.result[0].volume - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ticker_payload_parses() {
        let body = r#"{"success": true, "result": {"symbol": "BTCUSD", "close": 118432.5, "bid": 118430.0, "ask": 118435.0}}"#;
        let payload: TickerResponse = serde_json::from_str(body).unwrap();
        assert_eq!(payload.result.symbol, "BTCUSD");
        assert!((payload.result.close - 118_432.5).abs() < f64::EPSILON);
    }
}
