use thiserror::Error;

/// Engine error taxonomy. Everything except `Invariant` is recoverable:
/// a `Data` error skips the cycle, `Validation` discards the signal,
/// `GuardTripped` vetoes new entries. `Invariant` means trading state can
/// no longer be trusted and the scheduler must halt.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("market data error: {0}")]
    Data(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("risk guard tripped: {0}")]
    GuardTripped(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl EngineError {
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}
