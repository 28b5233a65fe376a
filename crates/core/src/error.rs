//! Error types for the signal-backtest system.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the signal-backtest system.
///
/// Every variant aborts a run: simulation state is cumulative, so there is no
/// recovery path once a tick has been corrupted.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (bad inputs, out-of-range signal, empty overlap).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Arithmetic error (zero or negative divisor price).
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    /// Broker ledger invariant violated.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Data error (invalid or missing data).
    #[error("Data error: {0}")]
    Data(String),

    /// Execution error (order not valid for the current bar).
    #[error("Execution error: {0}")]
    Execution(String),

    /// Failure raised by a user strategy.
    #[error("Strategy error: {0}")]
    Strategy(#[from] anyhow::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an arithmetic error.
    pub fn arithmetic(msg: impl Into<String>) -> Self {
        Error::Arithmetic(msg.into())
    }

    /// Create an invariant violation.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Error::Invariant(msg.into())
    }

    /// Create a data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    /// Create an execution error.
    pub fn execution(msg: impl Into<String>) -> Self {
        Error::Execution(msg.into())
    }
}
