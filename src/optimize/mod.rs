//! Parameter optimization framework
//!
//! Two interchangeable search strategies behind one interface: exhaustive
//! [`GridSearch`] over candidate value lists and the sequential
//! model-based [`TpeSearch`]. Both evaluate candidates by running one
//! backtest per parameter set and score it with the configured objective.
//!
//! A candidate whose backtest is unmeasurable (too few trades, a rejected
//! parameter combination, a non-finite score) is recorded with the
//! [`UNMEASURABLE_SCORE`] floor instead of aborting the search, so a single
//! bad trial never loses the completed ones. Cancellation is checked
//! between trials; trials completed so far stay valid.

pub mod grid;
pub mod tpe;

pub use grid::GridSearch;
pub use tpe::TpeSearch;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backtest;
use crate::config::{StrategyConfig, StrategyKind};
use crate::error::{EngineError, Result};
use crate::types::{Candle, PerformanceReport};

/// Floor score assigned to unmeasurable trials. Low enough that any
/// measurable candidate outranks it, finite so sorting stays total.
pub const UNMEASURABLE_SCORE: f64 = -10.0;

/// The scalar metric a search maximizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    SharpeRatio,
    TotalReturn,
    WinRate,
}

impl Objective {
    pub fn extract(&self, report: &PerformanceReport) -> f64 {
        match self {
            Objective::SharpeRatio => report.sharpe_ratio,
            Objective::TotalReturn => report.total_return_pct,
            Objective::WinRate => report.win_rate_pct,
        }
    }
}

impl Default for Objective {
    fn default() -> Self {
        Objective::SharpeRatio
    }
}

impl FromStr for Objective {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sharpe" | "sharpe_ratio" => Ok(Objective::SharpeRatio),
            "return" | "total_return" => Ok(Objective::TotalReturn),
            "win_rate" => Ok(Objective::WinRate),
            other => Err(EngineError::invalid_param(
                "objective",
                format!("unknown objective `{other}` (expected sharpe, return, or win_rate)"),
            )),
        }
    }
}

/// The domain a single parameter is searched over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamDomain {
    /// Explicit candidate values (the only enumerable domain for grids)
    Values(Vec<f64>),
    /// Inclusive integer range
    IntRange { lo: i64, hi: i64 },
    /// Inclusive continuous range
    FloatRange { lo: f64, hi: f64 },
}

impl ParamDomain {
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            ParamDomain::Values(values) => {
                let lo = values.iter().copied().fold(f64::MAX, f64::min);
                let hi = values.iter().copied().fold(f64::MIN, f64::max);
                (lo, hi)
            }
            ParamDomain::IntRange { lo, hi } => (*lo as f64, *hi as f64),
            ParamDomain::FloatRange { lo, hi } => (*lo, *hi),
        }
    }

    /// Snap an arbitrary proposal back into the domain.
    pub fn project(&self, x: f64) -> f64 {
        match self {
            ParamDomain::Values(values) => values
                .iter()
                .copied()
                .min_by(|a, b| {
                    (a - x).abs()
                        .partial_cmp(&(b - x).abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(x),
            ParamDomain::IntRange { lo, hi } => x.round().clamp(*lo as f64, *hi as f64),
            ParamDomain::FloatRange { lo, hi } => x.clamp(*lo, *hi),
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let ok = match self {
            ParamDomain::Values(values) => !values.is_empty(),
            ParamDomain::IntRange { lo, hi } => lo <= hi,
            ParamDomain::FloatRange { lo, hi } => lo <= hi,
        };
        if ok {
            Ok(())
        } else {
            Err(EngineError::invalid_param(
                name.to_string(),
                "search domain is empty or inverted",
            ))
        }
    }
}

/// Named parameter domains. Keys iterate in sorted order, which makes grid
/// enumeration deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSpace {
    pub domains: BTreeMap<String, ParamDomain>,
}

impl ParamSpace {
    pub fn new() -> Self {
        ParamSpace::default()
    }

    pub fn insert(mut self, name: impl Into<String>, domain: ParamDomain) -> Self {
        self.domains.insert(name.into(), domain);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.domains.is_empty() {
            return Err(EngineError::invalid_param(
                "param_space",
                "search space has no parameters",
            ));
        }
        for (name, domain) in &self.domains {
            domain.validate(name)?;
        }
        Ok(())
    }

    /// Candidate lists keyed by name, built from explicit grid values.
    pub fn from_value_lists(lists: &BTreeMap<String, Vec<f64>>) -> Self {
        let domains = lists
            .iter()
            .map(|(name, values)| (name.clone(), ParamDomain::Values(values.clone())))
            .collect();
        ParamSpace { domains }
    }

    /// The continuous/integer ranges each strategy kind is conventionally
    /// tuned over. Suited to the sequential search.
    pub fn default_for(kind: StrategyKind) -> Result<Self> {
        let with_risk = |space: ParamSpace| {
            space
                .insert("profit_target", ParamDomain::FloatRange { lo: 1.0, hi: 10.0 })
                .insert("stop_loss", ParamDomain::FloatRange { lo: 1.0, hi: 5.0 })
        };

        let space = match kind {
            StrategyKind::MovingAverage => ParamSpace::new()
                .insert("short_period", ParamDomain::IntRange { lo: 3, hi: 15 })
                .insert("long_period", ParamDomain::IntRange { lo: 15, hi: 50 }),
            StrategyKind::Rsi => ParamSpace::new()
                .insert("period", ParamDomain::IntRange { lo: 7, hi: 28 })
                .insert("oversold", ParamDomain::IntRange { lo: 20, hi: 40 })
                .insert("overbought", ParamDomain::IntRange { lo: 60, hi: 80 }),
            StrategyKind::Bollinger => ParamSpace::new()
                .insert("period", ParamDomain::IntRange { lo: 10, hi: 40 })
                .insert("std_dev", ParamDomain::FloatRange { lo: 1.5, hi: 3.0 }),
            StrategyKind::Macd => ParamSpace::new()
                .insert("fast_period", ParamDomain::IntRange { lo: 8, hi: 16 })
                .insert("slow_period", ParamDomain::IntRange { lo: 20, hi: 35 })
                .insert("signal_period", ParamDomain::IntRange { lo: 5, hi: 15 }),
            StrategyKind::Stochastic => ParamSpace::new()
                .insert("k_period", ParamDomain::IntRange { lo: 10, hi: 21 })
                .insert("d_period", ParamDomain::IntRange { lo: 2, hi: 5 })
                .insert("oversold", ParamDomain::IntRange { lo: 15, hi: 30 })
                .insert("overbought", ParamDomain::IntRange { lo: 70, hi: 85 }),
            StrategyKind::Composite => {
                return Err(EngineError::invalid_param(
                    "strategy.kind",
                    "composite strategies have no flat search space; tune the members instead",
                ))
            }
        };

        Ok(with_risk(space))
    }

    /// Compact candidate lists per strategy kind, suited to grid search.
    pub fn default_grid_for(kind: StrategyKind) -> Result<Self> {
        let with_risk = |space: ParamSpace| {
            space
                .insert("profit_target", ParamDomain::Values(vec![3.0, 5.0, 8.0]))
                .insert("stop_loss", ParamDomain::Values(vec![2.0, 3.0]))
        };

        let space = match kind {
            StrategyKind::MovingAverage => ParamSpace::new()
                .insert("short_period", ParamDomain::Values(vec![5.0, 8.0, 13.0]))
                .insert("long_period", ParamDomain::Values(vec![20.0, 34.0, 50.0])),
            StrategyKind::Rsi => ParamSpace::new()
                .insert("period", ParamDomain::Values(vec![7.0, 14.0, 21.0]))
                .insert("oversold", ParamDomain::Values(vec![20.0, 30.0, 40.0]))
                .insert("overbought", ParamDomain::Values(vec![60.0, 70.0, 80.0])),
            StrategyKind::Bollinger => ParamSpace::new()
                .insert("period", ParamDomain::Values(vec![10.0, 20.0, 30.0]))
                .insert("std_dev", ParamDomain::Values(vec![1.5, 2.0, 2.5, 3.0])),
            StrategyKind::Macd => ParamSpace::new()
                .insert("fast_period", ParamDomain::Values(vec![8.0, 12.0, 16.0]))
                .insert("slow_period", ParamDomain::Values(vec![20.0, 26.0, 35.0]))
                .insert("signal_period", ParamDomain::Values(vec![5.0, 9.0, 15.0])),
            StrategyKind::Stochastic => ParamSpace::new()
                .insert("k_period", ParamDomain::Values(vec![10.0, 14.0, 21.0]))
                .insert("d_period", ParamDomain::Values(vec![3.0, 5.0]))
                .insert("oversold", ParamDomain::Values(vec![15.0, 20.0, 30.0]))
                .insert("overbought", ParamDomain::Values(vec![70.0, 80.0, 85.0])),
            StrategyKind::Composite => {
                return Err(EngineError::invalid_param(
                    "strategy.kind",
                    "composite strategies have no flat search space; tune the members instead",
                ))
            }
        };

        Ok(with_risk(space))
    }
}

/// One candidate evaluation: the parameter set, its objective score, and
/// the backtest report it came from. `note` explains unmeasurable scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trial {
    pub params: BTreeMap<String, f64>,
    pub objective_score: f64,
    pub performance: PerformanceReport,
    pub note: Option<String>,
}

/// All trials of one search plus the index of the best one. The best trial
/// has the maximum objective score; ties go to the earliest trial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    pub trials: Vec<Trial>,
    best: Option<usize>,
}

impl OptimizationResult {
    pub fn from_trials(trials: Vec<Trial>) -> Self {
        let mut best: Option<usize> = None;
        for (i, trial) in trials.iter().enumerate() {
            let better = match best {
                // Strict comparison keeps the earliest trial on ties.
                Some(b) => trial.objective_score > trials[b].objective_score,
                None => true,
            };
            if better {
                best = Some(i);
            }
        }
        OptimizationResult { trials, best }
    }

    pub fn best(&self) -> Option<&Trial> {
        self.best.map(|i| &self.trials[i])
    }

    pub fn best_params(&self) -> Option<&BTreeMap<String, f64>> {
        self.best().map(|t| &t.params)
    }
}

/// Everything a search needs: the strategy under test, the historical
/// window, simulation parameters, and the search controls.
pub struct SearchJob<'a> {
    pub kind: StrategyKind,
    pub candles: &'a [Candle],
    pub initial_balance: f64,
    pub fee_rate: f64,
    pub space: ParamSpace,
    /// Trial budget for the sequential search; ignored by grid search.
    pub n_trials: usize,
    pub objective: Objective,
    /// Trials with fewer completed round trips than this are unmeasurable.
    pub min_trades: usize,
    /// Checked between trials; a set flag stops the search with the trials
    /// completed so far.
    pub cancel: Option<Arc<AtomicBool>>,
    /// Thread cap for parallel searches; `None` uses the global pool.
    pub threads: Option<usize>,
    /// Optional progress bar advanced once per finished trial.
    pub progress: Option<indicatif::ProgressBar>,
}

impl<'a> SearchJob<'a> {
    pub fn new(kind: StrategyKind, candles: &'a [Candle], space: ParamSpace) -> Self {
        SearchJob {
            kind,
            candles,
            initial_balance: 1_000_000.0,
            fee_rate: 0.0025,
            space,
            n_trials: 50,
            objective: Objective::default(),
            min_trades: 1,
            cancel: None,
            threads: None,
            progress: None,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

/// A parameter search over backtest objective scores.
pub trait SearchStrategy {
    fn name(&self) -> &'static str;

    fn search(&self, job: &SearchJob<'_>) -> Result<OptimizationResult>;
}

/// Run one candidate through the backtester and score it. Failures fatal
/// only to this candidate (invalid combination, insufficient window,
/// unmeasurable performance) are folded into the trial record.
pub(crate) fn evaluate_candidate(job: &SearchJob<'_>, params: BTreeMap<String, f64>) -> Trial {
    let config = match StrategyConfig::from_search_params(job.kind, &params) {
        Ok(config) => config,
        Err(err) => {
            return Trial {
                params,
                objective_score: UNMEASURABLE_SCORE,
                performance: PerformanceReport::default(),
                note: Some(err.to_string()),
            }
        }
    };

    match backtest::run_backtest(&config, job.candles, job.initial_balance, job.fee_rate) {
        Ok((_, report)) => {
            let score = job.objective.extract(&report);
            if report.num_trades < job.min_trades || !score.is_finite() {
                let note = EngineError::UnmeasurableObjective(format!(
                    "{} completed trades (minimum {}), score {score}",
                    report.num_trades, job.min_trades
                ));
                Trial {
                    params,
                    objective_score: UNMEASURABLE_SCORE,
                    performance: report,
                    note: Some(note.to_string()),
                }
            } else {
                Trial {
                    params,
                    objective_score: score,
                    performance: report,
                    note: None,
                }
            }
        }
        Err(err) => Trial {
            params,
            objective_score: UNMEASURABLE_SCORE,
            performance: PerformanceReport::default(),
            note: Some(err.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(score: f64) -> Trial {
        Trial {
            params: BTreeMap::new(),
            objective_score: score,
            performance: PerformanceReport::default(),
            note: None,
        }
    }

    #[test]
    fn best_is_maximum_score() {
        let result =
            OptimizationResult::from_trials(vec![trial(0.5), trial(2.0), trial(1.0)]);
        assert_eq!(result.best().unwrap().objective_score, 2.0);
    }

    #[test]
    fn ties_resolve_to_the_earliest_trial() {
        let result =
            OptimizationResult::from_trials(vec![trial(1.0), trial(2.0), trial(2.0)]);
        assert_eq!(result.best, Some(1));
    }

    #[test]
    fn empty_result_has_no_best() {
        let result = OptimizationResult::from_trials(vec![]);
        assert!(result.best().is_none());
    }

    #[test]
    fn default_spaces_exist_for_every_searchable_kind() {
        for kind in [
            StrategyKind::MovingAverage,
            StrategyKind::Rsi,
            StrategyKind::Bollinger,
            StrategyKind::Macd,
            StrategyKind::Stochastic,
        ] {
            assert!(ParamSpace::default_for(kind).is_ok());
            assert!(ParamSpace::default_grid_for(kind).is_ok());
        }
        assert!(ParamSpace::default_for(StrategyKind::Composite).is_err());
    }

    #[test]
    fn domain_projection_snaps_to_candidates() {
        let domain = ParamDomain::Values(vec![5.0, 10.0, 20.0]);
        assert_eq!(domain.project(11.0), 10.0);
        assert_eq!(domain.project(100.0), 20.0);

        let ints = ParamDomain::IntRange { lo: 3, hi: 15 };
        assert_eq!(ints.project(7.4), 7.0);
        assert_eq!(ints.project(99.0), 15.0);
    }
}
