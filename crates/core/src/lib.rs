pub mod config;
pub mod config_loader;
pub mod domain;
pub mod error;
pub mod events;
pub mod position;
pub mod traits;

pub use config::{AppConfig, ExchangeConfig, MonitorConfig, RiskConfig, StrategyConfig};
pub use config_loader::ConfigLoader;
pub use domain::{
    Candle, ClosedTrade, ExitReason, IndicatorSnapshot, Portfolio, Position, PriceTick, Side,
    Signal, StrategyVersion,
};
pub use error::EngineError;
pub use events::EngineEvent;
pub use position::PositionManager;
pub use traits::{EventSink, MarketData};
