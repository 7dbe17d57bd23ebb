// src/backtest/error.rs
// Error taxonomy for the backtest engine (spec §7)

use thiserror::Error;

/// Errors that can fail a backtest request before or during the day loop.
///
/// `NumericNull`, `NegativeOrNullPrice` and `CostExceedsEquity` are not part of
/// this taxonomy: they are silent, local degradations (null propagation, a
/// zero-contribution ticker, a clamped return) rather than request failures.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid payload in node {node_id}: {message}")]
    InvalidPayload { node_id: String, message: String },

    #[error("failed to parse strategy payload: {0}")]
    PayloadParse(#[from] serde_json::Error),
}

pub type BacktestResult<T> = Result<T, BacktestError>;
