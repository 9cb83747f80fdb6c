//! Core data types used across the decision engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Validation errors for candle data
#[derive(Debug, Error)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

impl From<CandleValidationError> for crate::error::EngineError {
    fn from(err: CandleValidationError) -> Self {
        crate::error::EngineError::DataSource(err.to_string())
    }
}

/// One OHLCV price point. Series are ordered by strictly increasing
/// timestamp and immutable once produced by the data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        };
        candle.validate()?;
        Ok(candle)
    }

    /// Validate the candle data
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }

        if self.open < self.low || self.open > self.high {
            return Err(CandleValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Trading pair symbol.
///
/// Symbols are cloned into every signal evaluation and anomaly check, so
/// they wrap `Arc<str>` to keep clones allocation-free.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Symbol::new(s)
    }
}

impl From<Symbol> for String {
    fn from(s: Symbol) -> Self {
        s.0.to_string()
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The decision produced by one evaluation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

/// A trading signal: the action plus an optional human-readable reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub action: SignalAction,
    pub reason: Option<String>,
}

impl Signal {
    pub fn buy(reason: impl Into<String>) -> Self {
        Signal {
            action: SignalAction::Buy,
            reason: Some(reason.into()),
        }
    }

    pub fn sell(reason: impl Into<String>) -> Self {
        Signal {
            action: SignalAction::Sell,
            reason: Some(reason.into()),
        }
    }

    pub fn hold() -> Self {
        Signal {
            action: SignalAction::Hold,
            reason: None,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.action == SignalAction::Buy
    }

    pub fn is_sell(&self) -> bool {
        self.action == SignalAction::Sell
    }

    pub fn is_hold(&self) -> bool {
        self.action == SignalAction::Hold
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

/// One executed fill. `realized_profit` is set on sells only and accounts
/// for the fees on both sides of the round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: DateTime<Utc>,
    pub side: Side,
    pub price: f64,
    pub amount: f64,
    pub fee: f64,
    pub realized_profit: Option<f64>,
}

/// Append-only, time-ordered sequence of trades produced by one backtest
/// run (or accumulated from live fills).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeLedger(Vec<Trade>);

impl TradeLedger {
    pub fn new() -> Self {
        TradeLedger(Vec::new())
    }

    pub fn push(&mut self, trade: Trade) {
        self.0.push(trade);
    }

    pub fn trades(&self) -> &[Trade] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trade> {
        self.0.iter()
    }

    /// Completed round trips (sell fills).
    pub fn sells(&self) -> impl Iterator<Item = &Trade> {
        self.0.iter().filter(|t| t.side == Side::Sell)
    }

    /// Realized profit of each completed round trip, in ledger order.
    pub fn realized_profits(&self) -> Vec<f64> {
        self.sells().filter_map(|t| t.realized_profit).collect()
    }
}

/// Per-symbol position state carried across successive evaluations.
///
/// Owned by the caller, one instance per (strategy, symbol) pair; the
/// engine mutates it on BUY/SELL transitions and while tracking the
/// trailing-stop high-water mark. Never share one instance across symbols.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    pub is_holding: bool,
    pub entry_price: f64,
    pub highest_price_since_entry: f64,
    pub entry_timestamp: Option<DateTime<Utc>>,
}

impl PositionState {
    /// Record a filled buy.
    pub fn open(&mut self, price: f64, timestamp: DateTime<Utc>) {
        self.is_holding = true;
        self.entry_price = price;
        self.highest_price_since_entry = price;
        self.entry_timestamp = Some(timestamp);
    }

    /// Record a filled sell.
    pub fn close(&mut self) {
        *self = PositionState::default();
    }

    /// Update the high-water mark with the latest observed price.
    pub fn observe(&mut self, price: f64) {
        if self.is_holding && price > self.highest_price_since_entry {
            self.highest_price_since_entry = price;
        }
    }

    /// Unrealized return of the open position, in percent.
    pub fn unrealized_return_pct(&self, current_price: f64) -> f64 {
        if !self.is_holding || self.entry_price == 0.0 {
            return 0.0;
        }
        (current_price - self.entry_price) / self.entry_price * 100.0
    }
}

/// Performance metrics derived from a trade ledger and equity curve.
///
/// `num_trades` counts completed round trips. A run with no trades yields
/// the all-zero default rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_return_pct: f64,
    pub win_rate_pct: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
    pub num_trades: usize,
}
