//! RSI zone-entry strategy
//!
//! BUY on the bar the RSI enters the oversold zone, SELL on the bar it
//! enters the overbought zone. Staying inside a zone does not re-signal.

use super::{closes, last_two, Strategy};
use crate::indicators;
use crate::types::{Candle, PositionState, Signal};

pub struct RsiStrategy {
    period: usize,
    oversold: f64,
    overbought: f64,
}

impl RsiStrategy {
    pub fn new(period: usize, oversold: f64, overbought: f64) -> Self {
        RsiStrategy {
            period,
            oversold,
            overbought,
        }
    }
}

impl Strategy for RsiStrategy {
    fn name(&self) -> &'static str {
        "rsi"
    }

    fn min_history(&self) -> usize {
        // RSI itself needs period + 1 points; zone-entry detection needs the
        // previous bar's value as well.
        self.period + 2
    }

    fn evaluate(&self, candles: &[Candle], _state: &PositionState) -> Signal {
        let closes = closes(candles);
        let series = match indicators::rsi(&closes, self.period) {
            Ok(series) => series,
            Err(_) => return Signal::hold(),
        };

        let Some((prev, current)) = last_two(&series) else {
            return Signal::hold();
        };

        if prev >= self.oversold && current < self.oversold {
            Signal::buy(format!(
                "RSI({}) entered oversold: {current:.1} < {:.1}",
                self.period, self.oversold
            ))
        } else if prev <= self.overbought && current > self.overbought {
            Signal::sell(format!(
                "RSI({}) entered overbought: {current:.1} > {:.1}",
                self.period, self.overbought
            ))
        } else {
            Signal::hold()
        }
    }
}
