//! Backtesting engine
//!
//! Replays a historical candle series bar by bar through a signal engine,
//! simulating full-balance fills at the bar close with a proportional fee
//! on both sides. The run is a pure function of its inputs: the same
//! configuration, series, balance, and fee rate always produce the same
//! ledger and report.

use chrono::{DateTime, Utc};
use statrs::statistics::Statistics;

use crate::config::StrategyConfig;
use crate::engine::SignalEngine;
use crate::error::{EngineError, Result};
use crate::types::{
    Candle, PerformanceReport, PositionState, Side, SignalAction, Trade, TradeLedger,
};

/// Trading days per year, used to annualize the Sharpe ratio of daily bars.
const ANNUALIZATION_PERIODS: f64 = 252.0;

/// Everything one backtest run produces.
#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub ledger: TradeLedger,
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
    pub report: PerformanceReport,
    pub final_balance: f64,
}

/// Open holding local to one run: the position quantity and the entry fee
/// still to be charged against the round trip.
struct Holding {
    amount: f64,
    entry_fee: f64,
}

pub struct Backtester {
    engine: SignalEngine,
    initial_balance: f64,
    fee_rate: f64,
}

impl Backtester {
    pub fn new(config: &StrategyConfig, initial_balance: f64, fee_rate: f64) -> Result<Self> {
        if initial_balance <= 0.0 {
            return Err(EngineError::invalid_param(
                "initial_balance",
                format!("must be > 0, got {initial_balance}"),
            ));
        }
        if !(0.0..1.0).contains(&fee_rate) {
            return Err(EngineError::invalid_param(
                "fee_rate",
                format!("must lie in [0, 1), got {fee_rate}"),
            ));
        }

        Ok(Backtester {
            engine: SignalEngine::from_config(config)?,
            initial_balance,
            fee_rate,
        })
    }

    /// Replay `candles` through the configured strategy and overlay.
    pub fn run(&self, candles: &[Candle]) -> Result<BacktestResult> {
        let required = self.engine.min_history();
        if candles.len() < required {
            return Err(EngineError::InsufficientData {
                context: "backtest",
                required,
                actual: candles.len(),
            });
        }

        tracing::debug!(
            strategy = self.engine.strategy_name(),
            bars = candles.len(),
            balance = self.initial_balance,
            fee_rate = self.fee_rate,
            "starting backtest"
        );

        let mut state = PositionState::default();
        let mut holding: Option<Holding> = None;
        let mut balance = self.initial_balance;
        let mut ledger = TradeLedger::new();
        let mut equity_curve = Vec::with_capacity(candles.len());

        for i in 0..candles.len() {
            let window = &candles[..=i];
            let bar = &candles[i];
            let price = bar.close;

            let signal = self.engine.evaluate(window, &mut state);
            match signal.action {
                SignalAction::Buy => {
                    if holding.is_none() && balance > 0.0 {
                        let fee = balance * self.fee_rate;
                        let amount = (balance - fee) / price;

                        tracing::debug!(
                            ts = %bar.timestamp,
                            price,
                            amount,
                            reason = signal.reason.as_deref().unwrap_or(""),
                            "buy fill"
                        );

                        ledger.push(Trade {
                            timestamp: bar.timestamp,
                            side: Side::Buy,
                            price,
                            amount,
                            fee,
                            realized_profit: None,
                        });
                        holding = Some(Holding { amount, entry_fee: fee });
                        balance = 0.0;
                        state.open(price, bar.timestamp);
                    }
                }
                SignalAction::Sell => {
                    if let Some(position) = holding.take() {
                        let gross = position.amount * price;
                        let fee = gross * self.fee_rate;
                        let profit = (price - state.entry_price) * position.amount
                            - position.entry_fee
                            - fee;
                        balance += gross - fee;

                        tracing::debug!(
                            ts = %bar.timestamp,
                            price,
                            amount = position.amount,
                            profit,
                            reason = signal.reason.as_deref().unwrap_or(""),
                            "sell fill"
                        );

                        ledger.push(Trade {
                            timestamp: bar.timestamp,
                            side: Side::Sell,
                            price,
                            amount: position.amount,
                            fee,
                            realized_profit: Some(profit),
                        });
                        state.close();
                    }
                }
                SignalAction::Hold => {}
            }

            let equity = balance + holding.as_ref().map_or(0.0, |h| h.amount * price);
            equity_curve.push((bar.timestamp, equity));
        }

        // An open position at the end stays open; final equity marks it to
        // the last close.
        let final_balance = equity_curve.last().map_or(balance, |&(_, e)| e);
        let report = compute_report(&ledger, &equity_curve, self.initial_balance);

        tracing::debug!(
            trades = report.num_trades,
            return_pct = report.total_return_pct,
            sharpe = report.sharpe_ratio,
            "backtest complete"
        );

        Ok(BacktestResult {
            ledger,
            equity_curve,
            report,
            final_balance,
        })
    }
}

/// One-shot convenience wrapper around [`Backtester`].
pub fn run_backtest(
    config: &StrategyConfig,
    candles: &[Candle],
    initial_balance: f64,
    fee_rate: f64,
) -> Result<(TradeLedger, PerformanceReport)> {
    let result = Backtester::new(config, initial_balance, fee_rate)?.run(candles)?;
    Ok((result.ledger, result.report))
}

/// Derive the performance report from a ledger and equity curve. A ledger
/// with no completed trades yields the all-zero default.
fn compute_report(
    ledger: &TradeLedger,
    equity_curve: &[(DateTime<Utc>, f64)],
    initial_balance: f64,
) -> PerformanceReport {
    if ledger.is_empty() || equity_curve.is_empty() {
        return PerformanceReport::default();
    }

    let profits = ledger.realized_profits();
    let num_trades = profits.len();
    let win_rate_pct = if num_trades > 0 {
        profits.iter().filter(|&&p| p > 0.0).count() as f64 / num_trades as f64 * 100.0
    } else {
        0.0
    };

    let final_equity = equity_curve[equity_curve.len() - 1].1;
    let total_return_pct = (final_equity - initial_balance) / initial_balance * 100.0;

    PerformanceReport {
        total_return_pct,
        win_rate_pct,
        max_drawdown_pct: max_drawdown_pct(equity_curve),
        sharpe_ratio: sharpe_ratio(equity_curve),
        num_trades,
    }
}

/// Largest peak-to-trough decline of the equity curve, as a percentage of
/// the peak.
fn max_drawdown_pct(equity_curve: &[(DateTime<Utc>, f64)]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0;

    for &(_, equity) in equity_curve {
        if equity > peak {
            peak = equity;
        }
        if peak > 0.0 {
            let dd = (peak - equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }

    max_dd * 100.0
}

/// Annualized Sharpe ratio of per-bar equity returns.
fn sharpe_ratio(equity_curve: &[(DateTime<Utc>, f64)]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .filter(|w| w[0].1 != 0.0)
        .map(|w| (w[1].1 - w[0].1) / w[0].1)
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }

    let mean = returns.iter().mean();
    let std_dev = returns.iter().std_dev();
    if std_dev > 0.0 {
        mean / std_dev * ANNUALIZATION_PERIODS.sqrt()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RiskParams, StrategyKind, StrategyParams};
    use approx::assert_relative_eq;
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

    fn cross_shape() -> Vec<f64> {
        // Down leg, up leg, down leg: one full round trip for MA(3, 8).
        let mut closes: Vec<f64> = (0..12).map(|i| 100.0 - i as f64).collect();
        closes.extend((0..12).map(|i| 89.0 + 2.0 * i as f64));
        closes.extend((0..12).map(|i| 113.0 - 2.0 * i as f64));
        closes
    }

    fn ma_config() -> StrategyConfig {
        StrategyConfig {
            params: StrategyParams::MovingAverage {
                short_period: 3,
                long_period: 8,
            },
            risk: RiskParams {
                profit_target_pct: 500.0,
                stop_loss_pct: 99.0,
                trailing_stop_pct: None,
            },
        }
    }

    #[test]
    fn rejects_series_shorter_than_strategy_window() {
        let backtester = Backtester::new(&ma_config(), 1_000_000.0, 0.0025).unwrap();
        let err = backtester
            .run(&candles_from_closes(&[100.0, 101.0, 102.0]))
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { .. }));
    }

    #[test]
    fn rejects_non_positive_balance() {
        assert!(Backtester::new(&ma_config(), 0.0, 0.0025).is_err());
    }

    #[test]
    fn flat_series_produces_zero_trades_and_zero_report() {
        let config = StrategyConfig::default_for(StrategyKind::Bollinger);
        let candles = candles_from_closes(&vec![100.0; 60]);

        let (ledger, report) = run_backtest(&config, &candles, 1_000_000.0, 0.0025).unwrap();
        assert!(ledger.is_empty());
        assert_eq!(report, PerformanceReport::default());
    }

    #[test]
    fn round_trip_accounting_matches_fees_on_both_sides() {
        let candles = candles_from_closes(&cross_shape());
        let result = Backtester::new(&ma_config(), 1_000_000.0, 0.0025)
            .unwrap()
            .run(&candles)
            .unwrap();

        assert!(result.ledger.len() >= 2);
        let trades = result.ledger.trades();
        let buy = &trades[0];
        let sell = &trades[1];
        assert_eq!(buy.side, Side::Buy);
        assert_eq!(sell.side, Side::Sell);

        // Buy commits the full balance; the fee comes off before sizing.
        assert_relative_eq!(buy.fee, 1_000_000.0 * 0.0025);
        assert_relative_eq!(buy.amount, (1_000_000.0 - buy.fee) / buy.price);

        let expected_profit =
            (sell.price - buy.price) * buy.amount - buy.fee - sell.fee;
        assert_relative_eq!(sell.realized_profit.unwrap(), expected_profit);

        // Round trips are sells only.
        assert_eq!(
            result.report.num_trades,
            result.ledger.sells().count()
        );
    }

    #[test]
    fn backtest_is_deterministic() {
        let candles = candles_from_closes(&cross_shape());

        let first = run_backtest(&ma_config(), &candles, 1_000_000.0, 0.0025).unwrap();
        let second = run_backtest(&ma_config(), &candles, 1_000_000.0, 0.0025).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn equity_curve_covers_every_bar() {
        let candles = candles_from_closes(&cross_shape());
        let result = Backtester::new(&ma_config(), 1_000_000.0, 0.0025)
            .unwrap()
            .run(&candles)
            .unwrap();
        assert_eq!(result.equity_curve.len(), candles.len());
    }

    #[test]
    fn max_drawdown_is_peak_to_trough() {
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let curve: Vec<(DateTime<Utc>, f64)> = [100.0, 120.0, 90.0, 110.0, 80.0]
            .iter()
            .enumerate()
            .map(|(i, &e)| (start + Duration::days(i as i64), e))
            .collect();

        // Peak 120 -> trough 80.
        assert_relative_eq!(max_drawdown_pct(&curve), (120.0 - 80.0) / 120.0 * 100.0);
    }

    #[test]
    fn sharpe_is_zero_without_variance() {
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let curve: Vec<(DateTime<Utc>, f64)> = (0..10)
            .map(|i| (start + Duration::days(i), 100.0))
            .collect();
        assert_eq!(sharpe_ratio(&curve), 0.0);
    }
}
