//! Integration tests for the decision engine
//!
//! These tests exercise the components together: strategies under the
//! position gate, the risk overlay inside the signal engine, backtest
//! accounting, both search strategies, and the anomaly detector.

use chrono::{DateTime, Duration, TimeZone, Utc};

use coin_quant::anomaly::{AnomalyConfig, AnomalyDetector, RiskLevel, Severity};
use coin_quant::backtest::{run_backtest, Backtester};
use coin_quant::engine::SignalEngine;
use coin_quant::indicators;
use coin_quant::optimize::{
    GridSearch, ParamDomain, ParamSpace, SearchJob, SearchStrategy, TpeSearch, UNMEASURABLE_SCORE,
};
use coin_quant::{
    Candle, Config, PerformanceReport, PositionState, RiskParams, StrategyConfig, StrategyKind,
    StrategyParams,
};

// =============================================================================
// Test Utilities
// =============================================================================

fn start_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

/// Build daily candles from a list of closes.
fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: start_time() + Duration::days(i as i64),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0 + (i as f64 * 10.0),
        })
        .collect()
}

/// A declining leg followed by a rising leg and a flat tail: one clean
/// golden cross for short/long moving averages.
fn cross_then_flat() -> Vec<f64> {
    let mut closes: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
    closes.extend((0..15).map(|i| 87.0 + 2.0 * i as f64));
    closes.extend(std::iter::repeat(115.0).take(10));
    closes
}

/// Oscillating series that produces several round trips for MA(3, 8).
fn wavy_closes(count: usize) -> Vec<f64> {
    (0..count)
        .map(|i| 100.0 + (i as f64 * 0.6).sin() * 9.0 + i as f64 * 0.05)
        .collect()
}

fn ma_config(short: usize, long: usize, risk: RiskParams) -> StrategyConfig {
    StrategyConfig {
        params: StrategyParams::MovingAverage {
            short_period: short,
            long_period: long,
        },
        risk,
    }
}

fn wide_risk() -> RiskParams {
    RiskParams {
        profit_target_pct: 500.0,
        stop_loss_pct: 99.0,
        trailing_stop_pct: None,
    }
}

/// Drive the engine over the series bar by bar, applying fills to the
/// position state the way the scheduler or backtester would. Returns the
/// sequence of executed actions.
fn drive(engine: &SignalEngine, candles: &[Candle]) -> Vec<char> {
    let mut state = PositionState::default();
    let mut actions = Vec::new();

    for i in 1..=candles.len() {
        let window = &candles[..i];
        let signal = engine.evaluate(window, &mut state);
        if signal.is_buy() {
            state.open(window[i - 1].close, window[i - 1].timestamp);
            actions.push('B');
        } else if signal.is_sell() {
            state.close();
            actions.push('S');
        }
    }

    actions
}

// =============================================================================
// Strategy + Position Gate Properties
// =============================================================================

#[test]
fn signals_strictly_alternate_for_every_strategy_kind() {
    let closes = wavy_closes(240);
    let candles = candles_from_closes(&closes);

    for kind in [
        StrategyKind::MovingAverage,
        StrategyKind::Rsi,
        StrategyKind::Bollinger,
        StrategyKind::Macd,
        StrategyKind::Stochastic,
        StrategyKind::Composite,
    ] {
        let config = StrategyConfig {
            params: StrategyParams::default_for(kind),
            risk: wide_risk(),
        };
        let engine = SignalEngine::from_config(&config).unwrap();
        let actions = drive(&engine, &candles);

        if let Some(&first) = actions.first() {
            assert_eq!(first, 'B', "{kind}: first action must be a buy");
        }
        for pair in actions.windows(2) {
            assert_ne!(
                pair[0], pair[1],
                "{kind}: buy/sell must alternate, got {actions:?}"
            );
        }
    }
}

#[test]
fn crossover_fires_exactly_once_then_stays_quiet_on_flat_bars() {
    let candles = candles_from_closes(&cross_then_flat());
    let engine = SignalEngine::from_config(&ma_config(3, 8, wide_risk())).unwrap();

    // Raw signal stream without applying fills: exactly one BUY overall,
    // and nothing on the flat tail.
    let mut state = PositionState::default();
    let mut buy_bars = Vec::new();
    for i in 1..=candles.len() {
        let signal = engine.evaluate(&candles[..i], &mut state);
        if signal.is_buy() {
            buy_bars.push(i - 1);
        }
    }

    assert_eq!(buy_bars.len(), 1, "one crossover, one BUY");
    assert!(
        buy_bars[0] < 30,
        "the BUY must come from the rising leg, not the flat tail"
    );
}

// =============================================================================
// Risk Overlay
// =============================================================================

#[test]
fn uptrend_then_single_bar_drop_triggers_stop_loss() {
    // Strict 30-bar uptrend, then one bar 5% down: a 3% stop must fire.
    let mut closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
    let last = *closes.last().unwrap();
    closes.push(last * 0.95);
    let candles = candles_from_closes(&closes);

    let engine = SignalEngine::from_config(&ma_config(
        3,
        8,
        RiskParams {
            profit_target_pct: 500.0,
            stop_loss_pct: 3.0,
            trailing_stop_pct: None,
        },
    ))
    .unwrap();

    // Hold from early in the uptrend.
    let mut state = PositionState::default();
    state.open(closes[28], candles[28].timestamp);

    let signal = engine.evaluate(&candles, &mut state);
    assert!(signal.is_sell());
    assert!(signal.reason.unwrap().contains("stop loss"));
}

#[test]
fn backtest_executes_the_forced_risk_exit() {
    // A golden-cross BUY early in the rally, a long run-up, then a 5%
    // single-bar collapse: the trailing stop forces the sell on that bar.
    let mut closes: Vec<f64> = (0..12).map(|i| 100.0 - i as f64).collect();
    closes.extend((0..30).map(|i| 89.0 + 1.0 * i as f64));
    let last = *closes.last().unwrap();
    closes.push(last * 0.95);
    let candles = candles_from_closes(&closes);

    let config = ma_config(
        3,
        8,
        RiskParams {
            profit_target_pct: 500.0,
            stop_loss_pct: 3.0,
            trailing_stop_pct: Some(3.0),
        },
    );

    let (ledger, report) = run_backtest(&config, &candles, 1_000_000.0, 0.0025).unwrap();
    assert!(report.num_trades >= 1);
    let last_sell = ledger.sells().last().unwrap();
    assert_eq!(last_sell.timestamp, candles.last().unwrap().timestamp);
}

// =============================================================================
// Backtester
// =============================================================================

#[test]
fn backtest_is_idempotent() {
    let candles = candles_from_closes(&wavy_closes(150));
    let config = ma_config(3, 8, wide_risk());

    let first = run_backtest(&config, &candles, 1_000_000.0, 0.0025).unwrap();
    let second = run_backtest(&config, &candles, 1_000_000.0, 0.0025).unwrap();
    assert_eq!(first, second);
}

#[test]
fn zero_trades_yield_a_zero_report() {
    let candles = candles_from_closes(&vec![100.0; 80]);
    let config = StrategyConfig::default_for(StrategyKind::MovingAverage);

    let (ledger, report) = run_backtest(&config, &candles, 1_000_000.0, 0.0025).unwrap();
    assert!(ledger.is_empty());
    assert_eq!(report, PerformanceReport::default());
    assert_eq!(report.num_trades, 0);
}

#[test]
fn flat_market_end_to_end() {
    // No variance: RSI sits at its neutral reading, the bands collapse onto
    // the price, and every strategy stays out of the market.
    let closes = vec![100.0; 90];
    let candles = candles_from_closes(&closes);

    let rsi = indicators::rsi(&closes, 14).unwrap();
    assert_eq!(rsi.last().unwrap().unwrap(), 50.0);

    for kind in [
        StrategyKind::MovingAverage,
        StrategyKind::Rsi,
        StrategyKind::Bollinger,
        StrategyKind::Macd,
        StrategyKind::Stochastic,
    ] {
        let config = StrategyConfig::default_for(kind);
        let (ledger, _) = run_backtest(&config, &candles, 1_000_000.0, 0.0025).unwrap();
        assert!(ledger.is_empty(), "{kind} traded on a flat series");
    }
}

// =============================================================================
// Parameter Optimizer
// =============================================================================

#[test]
fn grid_search_produces_one_trial_per_combination() {
    let candles = candles_from_closes(&wavy_closes(120));
    let space = ParamSpace::new()
        .insert("short_period", ParamDomain::Values(vec![3.0, 5.0, 8.0]))
        .insert("long_period", ParamDomain::Values(vec![13.0, 21.0]))
        .insert("stop_loss", ParamDomain::Values(vec![2.0, 4.0]));

    let mut job = SearchJob::new(StrategyKind::MovingAverage, &candles, space);
    job.min_trades = 0;
    job.n_trials = 3; // ignored by grid search

    let result = GridSearch::new().search(&job).unwrap();
    assert_eq!(result.trials.len(), 12);

    let max = result
        .trials
        .iter()
        .map(|t| t.objective_score)
        .fold(f64::MIN, f64::max);
    assert_eq!(result.best().unwrap().objective_score, max);
}

#[test]
fn tpe_search_runs_exactly_n_trials_and_best_is_max() {
    let candles = candles_from_closes(&wavy_closes(120));
    let space = ParamSpace::default_for(StrategyKind::MovingAverage).unwrap();

    let mut job = SearchJob::new(StrategyKind::MovingAverage, &candles, space);
    job.n_trials = 20;
    job.min_trades = 0;

    let result = TpeSearch::default().search(&job).unwrap();
    assert_eq!(result.trials.len(), 20);

    let best = result.best().unwrap();
    for trial in &result.trials {
        assert!(trial.objective_score <= best.objective_score);
    }
}

#[test]
fn unmeasurable_trials_do_not_abort_the_search() {
    // A window too short for the longest parameter combinations: those
    // trials score the floor, the rest still complete.
    let candles = candles_from_closes(&wavy_closes(40));
    let space = ParamSpace::new()
        .insert("short_period", ParamDomain::Values(vec![3.0]))
        .insert("long_period", ParamDomain::Values(vec![10.0, 60.0]));

    let mut job = SearchJob::new(StrategyKind::MovingAverage, &candles, space);
    job.min_trades = 0;

    let result = GridSearch::new().search(&job).unwrap();
    assert_eq!(result.trials.len(), 2);

    let too_long = result
        .trials
        .iter()
        .find(|t| t.params["long_period"] == 60.0)
        .unwrap();
    assert_eq!(too_long.objective_score, UNMEASURABLE_SCORE);
    assert!(too_long.note.as_deref().unwrap().contains("insufficient data"));
}

// =============================================================================
// Anomaly Detector
// =============================================================================

#[test]
fn injected_ten_sigma_jump_is_flagged_high_or_critical() {
    let mut closes: Vec<f64> = (0..40)
        .map(|i| 100.0 + if i % 2 == 0 { 0.4 } else { -0.4 })
        .collect();
    let last = *closes.last().unwrap();
    closes.push(last * 1.25);

    let detector = AnomalyDetector::new(AnomalyConfig::default());
    let verdict = detector
        .detect_price_anomalies(&candles_from_closes(&closes))
        .unwrap();

    assert!(verdict.is_anomaly);
    assert!(verdict.severity >= Severity::High);
}

#[test]
fn comprehensive_check_pauses_trading_on_a_crash() {
    let mut closes: Vec<f64> = (0..40)
        .map(|i| 100.0 + if i % 2 == 0 { 0.4 } else { -0.4 })
        .collect();
    let last = *closes.last().unwrap();
    closes.push(last * 0.70);

    let detector = AnomalyDetector::new(AnomalyConfig::default());
    let assessment = detector.comprehensive_check(&candles_from_closes(&closes), None);

    assert!(assessment.overall_risk_level >= RiskLevel::High);
    assert!(assessment.should_pause_trading);
}

#[test]
fn performance_anomaly_feeds_from_a_backtest_ledger() {
    // Run a real backtest, then hand its ledger to the detector. A tight
    // performance threshold set forces the check to run even on few trades.
    let candles = candles_from_closes(&wavy_closes(200));
    let config = ma_config(3, 8, wide_risk());
    let (ledger, report) = run_backtest(&config, &candles, 1_000_000.0, 0.0025).unwrap();
    assert!(report.num_trades > 0);

    let detector = AnomalyDetector::new(AnomalyConfig {
        min_trades: 1,
        ..AnomalyConfig::default()
    });
    let verdict = detector
        .detect_performance_anomalies(ledger.trades())
        .unwrap();
    assert_eq!(
        verdict.metrics["num_trades_analyzed"] as usize,
        report.num_trades.min(20)
    );
}

// =============================================================================
// Configuration Surface
// =============================================================================

#[test]
fn config_file_round_trip() {
    let config = Config {
        trading: Default::default(),
        backtest: Default::default(),
        strategy: StrategyConfig::default_for(StrategyKind::Composite),
        anomaly: Default::default(),
        search_space: None,
    };

    let json = serde_json::to_string_pretty(&config).unwrap();
    let parsed: Config = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.strategy, config.strategy);
}

#[test]
fn invalid_strategy_configs_are_rejected_not_clamped() {
    let bad = StrategyConfig {
        params: StrategyParams::Rsi {
            period: 14,
            oversold: 80.0,
            overbought: 20.0,
        },
        risk: RiskParams::default(),
    };
    assert!(Backtester::new(&bad, 1_000_000.0, 0.0025).is_err());
}
