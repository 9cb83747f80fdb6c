//! Error taxonomy for the decision engine
//!
//! Recoverable conditions (insufficient history, unmeasurable objectives)
//! are distinct variants so callers can continue past them; configuration
//! errors are fatal for that configuration and are never clamped away.

use thiserror::Error;

/// Errors produced by the decision engine core.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The input series is shorter than the minimum window a computation
    /// requires. Recoverable: widen the window or skip the evaluation.
    #[error("insufficient data for {context}: need {required} points, have {actual}")]
    InsufficientData {
        context: &'static str,
        required: usize,
        actual: usize,
    },

    /// A configuration value violates its domain constraints. Fatal for
    /// that configuration.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// A backtest trial produced no usable performance figure (e.g. zero
    /// completed trades). The optimizer maps this to a floor score.
    #[error("objective unmeasurable: {0}")]
    UnmeasurableObjective(String),

    /// Failure reported by the market-data collaborator.
    #[error("data source error: {0}")]
    DataSource(String),

    /// Failure reported by the order-execution collaborator.
    #[error("execution sink error: {0}")]
    ExecutionSink(String),
}

impl EngineError {
    /// Shorthand for an invalid-parameter error.
    pub fn invalid_param(name: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
