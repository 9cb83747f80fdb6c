//! Risk overlay
//!
//! Profit-target, stop-loss, and trailing-stop exits applied on top of any
//! strategy. The overlay runs before the underlying strategy is consulted
//! and takes precedence over a HOLD or BUY; a SELL the strategy produces on
//! its own is left untouched.

use crate::config::RiskParams;
use crate::types::{PositionState, Signal};

#[derive(Debug, Clone)]
pub struct RiskOverlay {
    profit_target_pct: f64,
    stop_loss_pct: f64,
    trailing_stop_pct: Option<f64>,
}

impl RiskOverlay {
    pub fn new(params: &RiskParams) -> Self {
        RiskOverlay {
            profit_target_pct: params.profit_target_pct,
            stop_loss_pct: params.stop_loss_pct,
            trailing_stop_pct: params.trailing_stop_pct,
        }
    }

    /// Forced-exit check for the latest price. Returns a SELL signal when an
    /// exit rule fires, `None` otherwise. Also advances the trailing-stop
    /// high-water mark on the position state.
    pub fn check_exit(&self, state: &mut PositionState, price: f64) -> Option<Signal> {
        if !state.is_holding {
            return None;
        }

        // New highs move the trailing floor up before the checks run.
        state.observe(price);
        let entry = state.entry_price;

        let target = entry * (1.0 + self.profit_target_pct / 100.0);
        if price >= target {
            tracing::info!(
                entry,
                price,
                target,
                "profit target reached, forcing exit"
            );
            return Some(Signal::sell(format!(
                "profit target hit: {price:.2} >= {target:.2} (+{:.1}% from entry)",
                self.profit_target_pct
            )));
        }

        let stop = entry * (1.0 - self.stop_loss_pct / 100.0);
        if price <= stop {
            tracing::info!(entry, price, stop, "stop loss triggered, forcing exit");
            return Some(Signal::sell(format!(
                "stop loss hit: {price:.2} <= {stop:.2} (-{:.1}% from entry)",
                self.stop_loss_pct
            )));
        }

        if let Some(trailing_pct) = self.trailing_stop_pct {
            let floor = state.highest_price_since_entry * (1.0 - trailing_pct / 100.0);
            if price < floor {
                tracing::info!(
                    entry,
                    price,
                    floor,
                    high = state.highest_price_since_entry,
                    "trailing stop triggered, forcing exit"
                );
                return Some(Signal::sell(format!(
                    "trailing stop hit: {price:.2} < {floor:.2} ({:.1}% below high of {:.2})",
                    trailing_pct, state.highest_price_since_entry
                )));
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn overlay(profit: f64, stop: f64, trailing: Option<f64>) -> RiskOverlay {
        RiskOverlay::new(&RiskParams {
            profit_target_pct: profit,
            stop_loss_pct: stop,
            trailing_stop_pct: trailing,
        })
    }

    fn holding_at(entry: f64) -> PositionState {
        let mut state = PositionState::default();
        state.open(entry, Utc.timestamp_opt(0, 0).unwrap());
        state
    }

    #[test]
    fn no_exit_while_flat() {
        let mut state = PositionState::default();
        assert!(overlay(5.0, 3.0, None).check_exit(&mut state, 50.0).is_none());
    }

    #[test]
    fn profit_target_forces_sell() {
        let mut state = holding_at(100.0);
        let overlay = overlay(5.0, 3.0, None);

        assert!(overlay.check_exit(&mut state, 104.9).is_none());
        let signal = overlay.check_exit(&mut state, 105.0).unwrap();
        assert!(signal.is_sell());
        assert!(signal.reason.unwrap().contains("profit target"));
    }

    #[test]
    fn stop_loss_forces_sell() {
        let mut state = holding_at(100.0);
        let overlay = overlay(5.0, 3.0, None);

        assert!(overlay.check_exit(&mut state, 97.1).is_none());
        let signal = overlay.check_exit(&mut state, 97.0).unwrap();
        assert!(signal.is_sell());
        assert!(signal.reason.unwrap().contains("stop loss"));
    }

    #[test]
    fn trailing_stop_tracks_the_high_water_mark() {
        let mut state = holding_at(100.0);
        let overlay = overlay(50.0, 50.0, Some(2.0));

        // Ride up to 110; the floor follows to 107.8.
        assert!(overlay.check_exit(&mut state, 104.0).is_none());
        assert!(overlay.check_exit(&mut state, 110.0).is_none());
        assert_eq!(state.highest_price_since_entry, 110.0);

        assert!(overlay.check_exit(&mut state, 108.0).is_none());
        let signal = overlay.check_exit(&mut state, 107.0).unwrap();
        assert!(signal.is_sell());
        assert!(signal.reason.unwrap().contains("trailing stop"));
    }

    #[test]
    fn new_high_never_triggers_the_trailing_stop() {
        let mut state = holding_at(100.0);
        let overlay = overlay(50.0, 50.0, Some(2.0));

        for price in [101.0, 102.0, 103.0, 104.0] {
            assert!(overlay.check_exit(&mut state, price).is_none());
        }
    }
}
