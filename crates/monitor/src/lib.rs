pub mod handle;
pub mod messages;
pub mod scheduler;
pub mod sink;

pub use handle::MonitorHandle;
pub use messages::{EngineMessage, EngineState, EngineStatus};
pub use scheduler::MonitoringScheduler;
pub use sink::{NullSink, TradeLogSink};
