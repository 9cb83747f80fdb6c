//! Stochastic oscillator strategy
//!
//! BUY when %K crosses above %D while in the oversold region, SELL when %K
//! crosses below %D while in the overbought region. Crossovers outside the
//! regions are ignored.

use super::{last_two, Strategy};
use crate::indicators;
use crate::types::{Candle, PositionState, Signal};

pub struct StochasticStrategy {
    k_period: usize,
    d_period: usize,
    oversold: f64,
    overbought: f64,
}

impl StochasticStrategy {
    pub fn new(k_period: usize, d_period: usize, oversold: f64, overbought: f64) -> Self {
        StochasticStrategy {
            k_period,
            d_period,
            oversold,
            overbought,
        }
    }
}

impl Strategy for StochasticStrategy {
    fn name(&self) -> &'static str {
        "stochastic"
    }

    fn min_history(&self) -> usize {
        self.k_period + self.d_period
    }

    fn evaluate(&self, candles: &[Candle], _state: &PositionState) -> Signal {
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let (k_series, d_series) =
            match indicators::stochastic(&high, &low, &close, self.k_period, self.d_period) {
                Ok(series) => series,
                Err(_) => return Signal::hold(),
            };

        let (Some((prev_k, k)), Some((prev_d, d))) = (last_two(&k_series), last_two(&d_series))
        else {
            return Signal::hold();
        };

        let bullish_cross = prev_k <= prev_d && k > d;
        let bearish_cross = prev_k >= prev_d && k < d;

        if k < self.oversold && bullish_cross {
            Signal::buy(format!(
                "%K ({k:.1}) crossed above %D ({d:.1}) in oversold territory"
            ))
        } else if k > self.overbought && bearish_cross {
            Signal::sell(format!(
                "%K ({k:.1}) crossed below %D ({d:.1}) in overbought territory"
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

    fn candles_from_ohlc(rows: &[(f64, f64, f64)]) -> Vec<Candle> {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        rows.iter()
            .enumerate()
            .map(|(i, &(high, low, close))| Candle {
                timestamp: start + Duration::days(i as i64),
                open: close,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn crossover_outside_regions_is_ignored() {
        // Mid-range chop: %K and %D cross repeatedly around 50, far away
        // from both regions, so nothing may fire.
        let rows: Vec<(f64, f64, f64)> = (0..30)
            .map(|i| {
                let close = 100.0 + if i % 2 == 0 { 2.0 } else { -2.0 };
                (110.0, 90.0, close)
            })
            .collect();

        let strategy = StochasticStrategy::new(14, 3, 20.0, 80.0);
        let state = PositionState::default();

        for i in strategy.min_history()..=rows.len() {
            let signal = strategy.evaluate(&candles_from_ohlc(&rows[..i]), &state);
            assert!(signal.is_hold());
        }
    }

    #[test]
    fn buys_on_bullish_cross_in_oversold_region() {
        // A slide to the bottom of the range pins %K low, then a small
        // bounce lifts %K through %D while still oversold.
        let mut rows: Vec<(f64, f64, f64)> = (0..20)
            .map(|i| {
                let close = 120.0 - 2.0 * i as f64;
                (close + 2.0, close - 2.0, close)
            })
            .collect();
        rows.push((86.0, 82.0, 85.5));

        let strategy = StochasticStrategy::new(14, 3, 20.0, 80.0);
        let state = PositionState::default();

        let signal = strategy.evaluate(&candles_from_ohlc(&rows), &state);
        assert!(signal.is_buy(), "got {:?}", signal);
    }
}
