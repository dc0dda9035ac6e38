pub mod client;
pub mod data_feed;

pub use client::{CandleRecord, DeltaClient, TickerRecord};
pub use data_feed::DeltaMarketData;
