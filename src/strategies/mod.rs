//! Trading strategies
//!
//! One module per strategy kind, all behind the `Strategy` trait. A
//! strategy's `evaluate` looks only at the supplied history and position
//! state and returns the raw mathematical signal; the position-alternation
//! invariant (no BUY while holding, no SELL while flat) is enforced by
//! [`gate`] regardless of what the math says.
//!
//! Crossover strategies fire only on the bar where the cross occurs — the
//! relative order of the two lines on the previous bar differs from the
//! current bar — never merely while one line sits above the other.
//! Threshold strategies apply the same anti-repeat rule to zone entries.

pub mod bollinger;
pub mod composite;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod stochastic;

pub use bollinger::BollingerStrategy;
pub use composite::CompositeStrategy;
pub use macd::MacdStrategy;
pub use moving_average::MovingAverageStrategy;
pub use rsi::RsiStrategy;
pub use stochastic::StochasticStrategy;

use crate::config::{StrategyConfig, StrategyParams};
use crate::error::Result;
use crate::types::{Candle, PositionState, Signal, SignalAction};

/// Trading strategy trait
pub trait Strategy: Send + Sync {
    /// Strategy identifier used in logs and reports
    fn name(&self) -> &'static str;

    /// Minimum number of candles required before a signal can be computed.
    /// Shorter histories evaluate to HOLD ("not yet computable").
    fn min_history(&self) -> usize;

    /// Raw signal for the latest bar of `candles`. Does not apply the
    /// position gate; callers go through [`gate`] (or the signal engine).
    fn evaluate(&self, candles: &[Candle], state: &PositionState) -> Signal;
}

/// Build a boxed strategy from a validated configuration.
pub fn build(config: &StrategyConfig) -> Result<Box<dyn Strategy>> {
    config.validate()?;
    Ok(build_params(&config.params))
}

fn build_params(params: &StrategyParams) -> Box<dyn Strategy> {
    match params {
        StrategyParams::MovingAverage {
            short_period,
            long_period,
        } => Box::new(MovingAverageStrategy::new(*short_period, *long_period)),
        StrategyParams::Rsi {
            period,
            oversold,
            overbought,
        } => Box::new(RsiStrategy::new(*period, *oversold, *overbought)),
        StrategyParams::Bollinger { period, std_dev } => {
            Box::new(BollingerStrategy::new(*period, *std_dev))
        }
        StrategyParams::Macd {
            fast_period,
            slow_period,
            signal_period,
        } => Box::new(MacdStrategy::new(*fast_period, *slow_period, *signal_period)),
        StrategyParams::Stochastic {
            k_period,
            d_period,
            oversold,
            overbought,
        } => Box::new(StochasticStrategy::new(
            *k_period,
            *d_period,
            *oversold,
            *overbought,
        )),
        StrategyParams::Composite {
            members,
            min_confirmations,
        } => Box::new(CompositeStrategy::new(
            members.iter().map(build_params).collect(),
            *min_confirmations,
        )),
    }
}

/// Enforce the position-alternation invariant: a BUY while already holding
/// or a SELL while flat collapses to HOLD.
pub fn gate(raw: Signal, state: &PositionState) -> Signal {
    match raw.action {
        SignalAction::Buy if state.is_holding => Signal::hold(),
        SignalAction::Sell if !state.is_holding => Signal::hold(),
        _ => raw,
    }
}

/// Closing prices of a candle slice
pub(crate) fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// The last two values of an aligned indicator series, if both are present.
/// Crossover detection needs the previous bar and the current bar.
pub(crate) fn last_two(series: &[Option<f64>]) -> Option<(f64, f64)> {
    if series.len() < 2 {
        return None;
    }
    match (series[series.len() - 2], series[series.len() - 1]) {
        (Some(prev), Some(current)) => Some((prev, current)),
        _ => None,
    }
}
