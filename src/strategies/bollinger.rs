//! Bollinger band re-entry strategy
//!
//! BUY when the close crosses back above the lower band after closing below
//! it, SELL when it crosses back below the upper band after closing above
//! it. The band excursion itself does not signal; only the re-entry bar
//! does.

use super::{closes, Strategy};
use crate::indicators;
use crate::types::{Candle, PositionState, Signal};

pub struct BollingerStrategy {
    period: usize,
    std_dev: f64,
}

impl BollingerStrategy {
    pub fn new(period: usize, std_dev: f64) -> Self {
        BollingerStrategy { period, std_dev }
    }
}

impl Strategy for BollingerStrategy {
    fn name(&self) -> &'static str {
        "bollinger"
    }

    fn min_history(&self) -> usize {
        self.period + 1
    }

    fn evaluate(&self, candles: &[Candle], _state: &PositionState) -> Signal {
        let closes = closes(candles);
        let (upper, _, lower) = match indicators::bollinger_bands(&closes, self.period, self.std_dev)
        {
            Ok(bands) => bands,
            Err(_) => return Signal::hold(),
        };

        let n = closes.len();
        if n < 2 {
            return Signal::hold();
        }
        let (Some(prev_upper), Some(prev_lower), Some(cur_upper), Some(cur_lower)) =
            (upper[n - 2], lower[n - 2], upper[n - 1], lower[n - 1])
        else {
            return Signal::hold();
        };

        let prev_close = closes[n - 2];
        let close = closes[n - 1];

        if prev_close < prev_lower && close >= cur_lower {
            Signal::buy(format!(
                "close {close:.2} recovered above the lower band ({cur_lower:.2})"
            ))
        } else if prev_close > prev_upper && close <= cur_upper {
            Signal::sell(format!(
                "close {close:.2} fell back below the upper band ({cur_upper:.2})"
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
                high: close + 5.0,
                low: close - 5.0,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn buys_on_recovery_above_lower_band() {
        // Mild oscillation, a sharp dip through the lower band, then a
        // recovery bar back inside the bands.
        let mut closes: Vec<f64> = (0..20)
            .map(|i| 100.0 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        closes.push(80.0); // well below the lower band
        closes.push(99.0); // back inside

        let strategy = BollingerStrategy::new(20, 2.0);
        let state = PositionState::default();

        let dip = strategy.evaluate(&candles_from_closes(&closes[..21]), &state);
        assert!(dip.is_hold(), "the excursion itself must not signal");

        let recovery = strategy.evaluate(&candles_from_closes(&closes), &state);
        assert!(recovery.is_buy());
    }

    #[test]
    fn no_breakout_signals_on_flat_series() {
        let closes = vec![100.0; 40];
        let strategy = BollingerStrategy::new(20, 2.0);
        let state = PositionState::default();

        for i in strategy.min_history()..=closes.len() {
            let signal = strategy.evaluate(&candles_from_closes(&closes[..i]), &state);
            assert!(signal.is_hold());
        }
    }
}
