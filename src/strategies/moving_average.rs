//! Moving average crossover strategy
//!
//! BUY on the golden cross (short SMA crossing above the long SMA), SELL on
//! the death cross.

use super::{closes, last_two, Strategy};
use crate::indicators;
use crate::types::{Candle, PositionState, Signal};

pub struct MovingAverageStrategy {
    short_period: usize,
    long_period: usize,
}

impl MovingAverageStrategy {
    pub fn new(short_period: usize, long_period: usize) -> Self {
        MovingAverageStrategy {
            short_period,
            long_period,
        }
    }
}

impl Strategy for MovingAverageStrategy {
    fn name(&self) -> &'static str {
        "moving_average"
    }

    fn min_history(&self) -> usize {
        // One bar past the long window so the previous bar's averages exist.
        self.long_period + 1
    }

    fn evaluate(&self, candles: &[Candle], _state: &PositionState) -> Signal {
        let closes = closes(candles);
        let short = match indicators::sma(&closes, self.short_period) {
            Ok(series) => series,
            Err(_) => return Signal::hold(),
        };
        let long = match indicators::sma(&closes, self.long_period) {
            Ok(series) => series,
            Err(_) => return Signal::hold(),
        };

        let (Some((prev_short, short_ma)), Some((prev_long, long_ma))) =
            (last_two(&short), last_two(&long))
        else {
            return Signal::hold();
        };

        if prev_short <= prev_long && short_ma > long_ma {
            Signal::buy(format!(
                "golden cross: SMA{} ({short_ma:.2}) crossed above SMA{} ({long_ma:.2})",
                self.short_period, self.long_period
            ))
        } else if prev_short >= prev_long && short_ma < long_ma {
            Signal::sell(format!(
                "death cross: SMA{} ({short_ma:.2}) crossed below SMA{} ({long_ma:.2})",
                self.short_period, self.long_period
            ))
        } else {
            Signal::hold()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: start + Duration::days(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn fires_buy_only_on_the_crossover_bar() {
        // Decline pulls the short SMA below the long one, then a rally
        // crosses it back above exactly once.
        let mut closes: Vec<f64> = (0..10).map(|i| 100.0 - i as f64).collect();
        closes.extend((0..15).map(|i| 91.0 + 2.0 * i as f64));

        let strategy = MovingAverageStrategy::new(3, 8);
        let state = PositionState::default();

        let mut buy_bars = Vec::new();
        for i in strategy.min_history()..=closes.len() {
            let candles = candles_from_closes(&closes[..i]);
            if strategy.evaluate(&candles, &state).is_buy() {
                buy_bars.push(i);
            }
        }

        assert_eq!(buy_bars.len(), 1, "expected a single golden cross");
    }

    #[test]
    fn holds_on_insufficient_history() {
        let closes: Vec<f64> = (0..5).map(|i| 100.0 + i as f64).collect();
        let strategy = MovingAverageStrategy::new(3, 8);
        let state = PositionState::default();

        let signal = strategy.evaluate(&candles_from_closes(&closes), &state);
        assert!(signal.is_hold());
    }

    #[test]
    fn holds_while_already_crossed() {
        // Steady uptrend from the start: the short SMA never crosses from
        // below, so no signal may fire.
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let strategy = MovingAverageStrategy::new(3, 8);
        let state = PositionState::default();

        for i in strategy.min_history()..=closes.len() {
            let candles = candles_from_closes(&closes[..i]);
            assert!(strategy.evaluate(&candles, &state).is_hold());
        }
    }
}
