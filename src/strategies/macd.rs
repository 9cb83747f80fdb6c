//! MACD signal-line crossover strategy
//!
//! BUY on the bullish crossover (MACD line crossing above its signal line),
//! SELL on the bearish crossover.

use super::{closes, last_two, Strategy};
use crate::indicators;
use crate::types::{Candle, PositionState, Signal};

pub struct MacdStrategy {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl MacdStrategy {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        MacdStrategy {
            fast_period,
            slow_period,
            signal_period,
        }
    }
}

impl Strategy for MacdStrategy {
    fn name(&self) -> &'static str {
        "macd"
    }

    fn min_history(&self) -> usize {
        self.slow_period + self.signal_period
    }

    fn evaluate(&self, candles: &[Candle], _state: &PositionState) -> Signal {
        let closes = closes(candles);
        let (macd_line, signal_line, _) = match indicators::macd(
            &closes,
            self.fast_period,
            self.slow_period,
            self.signal_period,
        ) {
            Ok(series) => series,
            Err(_) => return Signal::hold(),
        };

        let (Some((prev_macd, macd)), Some((prev_signal, signal))) =
            (last_two(&macd_line), last_two(&signal_line))
        else {
            return Signal::hold();
        };

        if prev_macd <= prev_signal && macd > signal {
            Signal::buy(format!(
                "bullish MACD crossover: {macd:.4} crossed above {signal:.4}"
            ))
        } else if prev_macd >= prev_signal && macd < signal {
            Signal::sell(format!(
                "bearish MACD crossover: {macd:.4} crossed below {signal:.4}"
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
    fn signals_once_per_crossover() {
        // Down leg then up leg: the MACD line crosses its signal line from
        // below exactly once on the turn.
        let mut closes: Vec<f64> = (0..40).map(|i| 200.0 - i as f64).collect();
        closes.extend((0..40).map(|i| 161.0 + 2.0 * i as f64));

        let strategy = MacdStrategy::new(12, 26, 9);
        let state = PositionState::default();

        let mut buys = 0;
        for i in strategy.min_history()..=closes.len() {
            let candles = candles_from_closes(&closes[..i]);
            if strategy.evaluate(&candles, &state).is_buy() {
                buys += 1;
            }
        }
        assert_eq!(buys, 1);
    }

    #[test]
    fn holds_with_short_history() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let strategy = MacdStrategy::new(12, 26, 9);
        let state = PositionState::default();

        assert!(strategy
            .evaluate(&candles_from_closes(&closes), &state)
            .is_hold());
    }
}
