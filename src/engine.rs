//! Signal engine
//!
//! Combines one strategy with the risk overlay into the single per-bar
//! evaluation the scheduler (or the backtester) drives. Each call is a pure
//! function of the supplied history and the caller-owned position state;
//! exclusivity of that state per (strategy, symbol) pair is the caller's
//! obligation.

use crate::config::StrategyConfig;
use crate::error::Result;
use crate::risk::RiskOverlay;
use crate::strategies::{self, Strategy};
use crate::types::{Candle, PositionState, Signal};

pub struct SignalEngine {
    strategy: Box<dyn Strategy>,
    overlay: RiskOverlay,
}

impl SignalEngine {
    /// Build the engine from a configuration, validating it first.
    pub fn from_config(config: &StrategyConfig) -> Result<Self> {
        let strategy = strategies::build(config)?;
        Ok(SignalEngine {
            strategy,
            overlay: RiskOverlay::new(&config.risk),
        })
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Minimum history the underlying strategy needs.
    pub fn min_history(&self) -> usize {
        self.strategy.min_history()
    }

    /// Evaluate the latest bar of `candles`.
    ///
    /// Order of precedence: forced risk exits first (they override HOLD and
    /// BUY), then the strategy's own signal filtered through the position
    /// gate. The caller applies fills by transitioning `state` via
    /// `open`/`close`.
    pub fn evaluate(&self, candles: &[Candle], state: &mut PositionState) -> Signal {
        let Some(last) = candles.last() else {
            return Signal::hold();
        };

        if let Some(exit) = self.overlay.check_exit(state, last.close) {
            return exit;
        }

        if candles.len() < self.strategy.min_history() {
            return Signal::hold();
        }

        strategies::gate(self.strategy.evaluate(candles, state), state)
    }
}
