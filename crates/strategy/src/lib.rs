pub mod indicators;
pub mod risk;
pub mod signal;
pub mod trailing;

pub use indicators::IndicatorCalculator;
pub use risk::RiskManager;
pub use signal::SignalDetector;
pub use trailing::TrailingStopController;
