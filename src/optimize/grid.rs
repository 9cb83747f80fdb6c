//! Exhaustive grid search
//!
//! Enumerates the Cartesian product of every parameter's candidate list in
//! deterministic (sorted-key) order and backtests each combination. Trials
//! run in parallel under rayon; the trial budget of the job is ignored —
//! the whole grid always runs.

use itertools::Itertools;
use rayon::prelude::*;
use std::collections::BTreeMap;

use super::{
    evaluate_candidate, OptimizationResult, ParamDomain, SearchJob, SearchStrategy, Trial,
};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct GridSearch;

impl GridSearch {
    pub fn new() -> Self {
        GridSearch
    }

    /// Expand the job's space into every parameter combination.
    fn combinations(job: &SearchJob<'_>) -> Result<Vec<BTreeMap<String, f64>>> {
        job.space.validate()?;

        let names: Vec<&String> = job.space.domains.keys().collect();
        let lists: Vec<Vec<f64>> = job
            .space
            .domains
            .iter()
            .map(|(name, domain)| enumerate_domain(name, domain))
            .collect::<Result<_>>()?;

        let combos = lists
            .iter()
            .map(|values| values.iter().copied())
            .multi_cartesian_product()
            .map(|values| {
                names
                    .iter()
                    .zip(values)
                    .map(|(name, value)| ((*name).clone(), value))
                    .collect::<BTreeMap<String, f64>>()
            })
            .collect();

        Ok(combos)
    }
}

/// Grid search needs a finite candidate list per parameter; continuous
/// ranges have no enumeration and are rejected rather than discretized
/// behind the caller's back.
fn enumerate_domain(name: &str, domain: &ParamDomain) -> Result<Vec<f64>> {
    match domain {
        ParamDomain::Values(values) => Ok(values.clone()),
        ParamDomain::IntRange { lo, hi } => Ok((*lo..=*hi).map(|v| v as f64).collect()),
        ParamDomain::FloatRange { .. } => Err(EngineError::invalid_param(
            name.to_string(),
            "grid search needs explicit candidate values, not a continuous range",
        )),
    }
}

impl SearchStrategy for GridSearch {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn search(&self, job: &SearchJob<'_>) -> Result<OptimizationResult> {
        let combos = Self::combinations(job)?;
        tracing::info!(
            strategy = %job.kind,
            combinations = combos.len(),
            "running grid search"
        );

        let run = |params: BTreeMap<String, f64>| -> Option<Trial> {
            if job.is_cancelled() {
                return None;
            }
            let trial = evaluate_candidate(job, params);
            if let Some(bar) = &job.progress {
                bar.inc(1);
            }
            Some(trial)
        };

        // Cancellation leaves holes; completed trials keep their order.
        let outcomes: Vec<Option<Trial>> = match job.threads {
            Some(threads) => match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => pool.install(|| combos.into_par_iter().map(run).collect()),
                Err(err) => {
                    tracing::warn!(%err, "thread pool setup failed, using the global pool");
                    combos.into_par_iter().map(run).collect()
                }
            },
            None => combos.into_par_iter().map(run).collect(),
        };

        let trials: Vec<Trial> = outcomes.into_iter().flatten().collect();
        Ok(OptimizationResult::from_trials(trials))
    }
}
