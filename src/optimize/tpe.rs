//! Sequential model-based search (tree-structured Parzen estimator)
//!
//! Runs exactly `n_trials` backtests, one at a time. The first trials are
//! drawn from the uniform prior; once enough observations exist, each
//! proposal splits the history into a good set (top `gamma` quantile by
//! objective score) and a bad set, models both with per-dimension Parzen
//! density estimates, and picks the sampled candidate with the highest
//! good/bad density ratio — a proxy for expected improvement. The model
//! update is inherently sequential: every proposal depends on all prior
//! completed observations.

use rand::distributions::Distribution as RandDistribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::{Continuous, Normal};
use std::collections::BTreeMap;

use super::{
    evaluate_candidate, OptimizationResult, ParamDomain, ParamSpace, SearchJob, SearchStrategy,
    Trial,
};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct TpeSearch {
    /// RNG seed; fixed by default so searches are reproducible.
    pub seed: u64,
    /// Trials drawn from the uniform prior before the model kicks in.
    pub n_startup_trials: usize,
    /// Fraction of observations forming the "good" set.
    pub gamma: f64,
    /// Candidates sampled per proposal round.
    pub n_candidates: usize,
}

impl Default for TpeSearch {
    fn default() -> Self {
        TpeSearch {
            seed: 42,
            n_startup_trials: 5,
            gamma: 0.25,
            n_candidates: 24,
        }
    }
}

impl TpeSearch {
    pub fn with_seed(seed: u64) -> Self {
        TpeSearch {
            seed,
            ..TpeSearch::default()
        }
    }

    fn sample_prior(&self, space: &ParamSpace, rng: &mut StdRng) -> BTreeMap<String, f64> {
        space
            .domains
            .iter()
            .map(|(name, domain)| {
                let value = match domain {
                    ParamDomain::Values(values) => values[rng.gen_range(0..values.len())],
                    ParamDomain::IntRange { lo, hi } => rng.gen_range(*lo..=*hi) as f64,
                    ParamDomain::FloatRange { lo, hi } => rng.gen_range(*lo..=*hi),
                };
                (name.clone(), value)
            })
            .collect()
    }

    fn propose(
        &self,
        space: &ParamSpace,
        trials: &[Trial],
        rng: &mut StdRng,
    ) -> BTreeMap<String, f64> {
        let mut order: Vec<usize> = (0..trials.len()).collect();
        order.sort_by(|&a, &b| {
            trials[b]
                .objective_score
                .partial_cmp(&trials[a].objective_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let n_good = ((trials.len() as f64 * self.gamma).ceil() as usize)
            .max(1)
            .min(trials.len());
        let good: Vec<&Trial> = order[..n_good].iter().map(|&i| &trials[i]).collect();
        let bad: Vec<&Trial> = if order.len() > n_good {
            order[n_good..].iter().map(|&i| &trials[i]).collect()
        } else {
            good.clone()
        };

        let mut best: Option<(f64, BTreeMap<String, f64>)> = None;
        for _ in 0..self.n_candidates {
            let candidate: BTreeMap<String, f64> = space
                .domains
                .iter()
                .map(|(name, domain)| {
                    let (lo, hi) = domain.bounds();
                    let span = hi - lo;
                    let anchor = good[rng.gen_range(0..good.len())]
                        .params
                        .get(name)
                        .copied()
                        .unwrap_or((lo + hi) / 2.0);
                    let noisy = gaussian(rng, anchor, bandwidth(span, good.len()));
                    (name.clone(), domain.project(noisy))
                })
                .collect();

            let score = density_ratio(space, &candidate, &good, &bad);
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, candidate));
            }
        }

        match best {
            Some((_, candidate)) => candidate,
            None => self.sample_prior(space, rng),
        }
    }
}

impl SearchStrategy for TpeSearch {
    fn name(&self) -> &'static str {
        "tpe"
    }

    fn search(&self, job: &SearchJob<'_>) -> Result<OptimizationResult> {
        job.space.validate()?;

        tracing::info!(
            strategy = %job.kind,
            n_trials = job.n_trials,
            seed = self.seed,
            "running sequential search"
        );

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut trials: Vec<Trial> = Vec::with_capacity(job.n_trials);

        for t in 0..job.n_trials {
            if job.is_cancelled() {
                tracing::info!(completed = trials.len(), "search cancelled between trials");
                break;
            }

            let params = if trials.len() < self.n_startup_trials.max(1) {
                self.sample_prior(&job.space, &mut rng)
            } else {
                self.propose(&job.space, &trials, &mut rng)
            };

            let trial = evaluate_candidate(job, params);
            if let Some(bar) = &job.progress {
                bar.inc(1);
            }
            tracing::debug!(
                trial = t,
                score = trial.objective_score,
                note = trial.note.as_deref().unwrap_or(""),
                "trial complete"
            );
            trials.push(trial);
        }

        Ok(OptimizationResult::from_trials(trials))
    }
}

/// Sum over dimensions of the log density ratio between the good and bad
/// Parzen estimates at the candidate point.
fn density_ratio(
    space: &ParamSpace,
    candidate: &BTreeMap<String, f64>,
    good: &[&Trial],
    bad: &[&Trial],
) -> f64 {
    let mut total = 0.0;
    for (name, domain) in &space.domains {
        let Some(&x) = candidate.get(name) else {
            continue;
        };
        let (lo, hi) = domain.bounds();
        let span = hi - lo;

        let good_values = values_of(good, name);
        let bad_values = values_of(bad, name);
        let l = parzen(&good_values, x, bandwidth(span, good_values.len()));
        let g = parzen(&bad_values, x, bandwidth(span, bad_values.len()));
        total += l.max(f64::MIN_POSITIVE).ln() - g.max(f64::MIN_POSITIVE).ln();
    }
    total
}

fn values_of(trials: &[&Trial], name: &str) -> Vec<f64> {
    trials
        .iter()
        .filter_map(|t| t.params.get(name).copied())
        .collect()
}

/// Mean of Gaussian kernels centered at the observed points.
fn parzen(points: &[f64], x: f64, bandwidth: f64) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let sum: f64 = points
        .iter()
        .filter_map(|&p| Normal::new(p, bandwidth).ok())
        .map(|kernel| kernel.pdf(x))
        .sum();
    sum / points.len() as f64
}

/// Silverman-style kernel width, floored so degenerate domains stay usable.
fn bandwidth(span: f64, n: usize) -> f64 {
    let n = n.max(1) as f64;
    (span * 1.06 * n.powf(-0.2)).max(span * 1e-3).max(1e-9)
}

fn gaussian(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    match Normal::new(mean, std_dev) {
        Ok(dist) => dist.sample(rng),
        Err(_) => mean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyKind;
    use crate::types::Candle;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn wavy_candles(count: usize) -> Vec<Candle> {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        (0..count)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.5).sin() * 8.0 + i as f64 * 0.05;
                Candle {
                    timestamp: start + Duration::days(i as i64),
                    open: close,
                    high: close + 2.0,
                    low: close - 2.0,
                    close,
                    volume: 1000.0,
                }
            })
            .collect()
    }

    fn job(candles: &[Candle], n_trials: usize) -> SearchJob<'_> {
        let space = ParamSpace::default_for(StrategyKind::MovingAverage).unwrap();
        let mut job = SearchJob::new(StrategyKind::MovingAverage, candles, space);
        job.n_trials = n_trials;
        job.min_trades = 0;
        job
    }

    #[test]
    fn runs_exactly_n_trials() {
        let candles = wavy_candles(100);
        let result = TpeSearch::default().search(&job(&candles, 12)).unwrap();
        assert_eq!(result.trials.len(), 12);
    }

    #[test]
    fn best_matches_exhaustive_maximum_over_trials() {
        let candles = wavy_candles(100);
        let result = TpeSearch::default().search(&job(&candles, 15)).unwrap();

        let max = result
            .trials
            .iter()
            .map(|t| t.objective_score)
            .fold(f64::MIN, f64::max);
        assert_eq!(result.best().unwrap().objective_score, max);
    }

    #[test]
    fn same_seed_reproduces_the_search() {
        let candles = wavy_candles(100);
        let first = TpeSearch::with_seed(7).search(&job(&candles, 10)).unwrap();
        let second = TpeSearch::with_seed(7).search(&job(&candles, 10)).unwrap();
        assert_eq!(first.trials, second.trials);
    }

    #[test]
    fn proposals_stay_inside_their_domains() {
        let candles = wavy_candles(100);
        let job = job(&candles, 20);
        let result = TpeSearch::default().search(&job).unwrap();

        for trial in &result.trials {
            for (name, domain) in &job.space.domains {
                let (lo, hi) = domain.bounds();
                let value = trial.params[name];
                assert!(
                    (lo..=hi).contains(&value),
                    "{name}={value} escaped [{lo}, {hi}]"
                );
            }
        }
    }

    #[test]
    fn cancellation_stops_between_trials() {
        let candles = wavy_candles(100);
        let cancel = Arc::new(AtomicBool::new(true));
        let mut job = job(&candles, 10);
        job.cancel = Some(cancel.clone());

        let result = TpeSearch::default().search(&job).unwrap();
        assert!(result.trials.is_empty());

        cancel.store(false, Ordering::Relaxed);
        let result = TpeSearch::default().search(&job).unwrap();
        assert_eq!(result.trials.len(), 10);
    }
}
