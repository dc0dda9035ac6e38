use crate::domain::StrategyVersion;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub api_url: String,
    pub symbol: String,
    /// Candle resolution the strategy trades, e.g. "1h".
    pub resolution: String,
    /// How many candles each history fetch requests.
    pub candle_history: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub ema_short_period: usize,
    pub ema_long_period: usize,
    pub atr_period: usize,
    pub swing_lookback: usize,
    pub atr_multiplier: f64,
    pub risk_reward_ratio: f64,
    pub strategy_version: StrategyVersion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub initial_capital: Decimal,
    /// Fraction of cash risked per trade (0.02 = 2%).
    pub risk_fraction_per_trade: f64,
    /// Daily realized-loss fraction of starting capital that vetoes new
    /// entries for the rest of the UTC day.
    pub daily_loss_limit_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub candle_check_interval_secs: u64,
    pub price_check_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub report_dir: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.india.delta.exchange".to_string(),
            symbol: "BTCUSD".to_string(),
            resolution: "1h".to_string(),
            candle_history: 100,
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            ema_short_period: 9,
            ema_long_period: 20,
            atr_period: 14,
            swing_lookback: 10,
            atr_multiplier: 0.5,
            risk_reward_ratio: 10.0,
            strategy_version: StrategyVersion::V2,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            initial_capital: Decimal::from(500),
            risk_fraction_per_trade: 0.02,
            daily_loss_limit_fraction: 0.10,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            candle_check_interval_secs: 60,
            price_check_interval_secs: 5,
            fetch_timeout_secs: 10,
            report_dir: "reports".to_string(),
        }
    }
}
