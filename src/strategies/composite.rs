//! Composite voting strategy
//!
//! Evaluates every member strategy and tallies BUY and SELL votes
//! separately. A side wins only when its tally reaches `min_confirmations`;
//! if both sides reach it on the same bar the result is HOLD (ambiguous).

use super::Strategy;
use crate::types::{Candle, PositionState, Signal};

pub struct CompositeStrategy {
    members: Vec<Box<dyn Strategy>>,
    min_confirmations: usize,
}

impl CompositeStrategy {
    pub fn new(members: Vec<Box<dyn Strategy>>, min_confirmations: usize) -> Self {
        CompositeStrategy {
            members,
            min_confirmations,
        }
    }
}

impl Strategy for CompositeStrategy {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn min_history(&self) -> usize {
        self.members
            .iter()
            .map(|m| m.min_history())
            .max()
            .unwrap_or(1)
    }

    fn evaluate(&self, candles: &[Candle], state: &PositionState) -> Signal {
        let mut buys = 0usize;
        let mut sells = 0usize;

        for member in &self.members {
            let signal = member.evaluate(candles, state);
            if signal.is_buy() {
                buys += 1;
            } else if signal.is_sell() {
                sells += 1;
            }
        }

        let buy_confirmed = buys >= self.min_confirmations;
        let sell_confirmed = sells >= self.min_confirmations;

        match (buy_confirmed, sell_confirmed) {
            (true, true) => Signal::hold(),
            (true, false) => Signal::buy(format!(
                "{buys} of {} members agree on buy",
                self.members.len()
            )),
            (false, true) => Signal::sell(format!(
                "{sells} of {} members agree on sell",
                self.members.len()
            )),
            (false, false) => Signal::hold(),
        }
    }
}
