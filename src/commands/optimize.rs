//! Optimize command implementation

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::str::FromStr;
use tracing::info;

use coin_quant::data::{CsvDataSource, MarketData};
use coin_quant::optimize::{
    GridSearch, Objective, ParamDomain, ParamSpace, SearchJob, SearchStrategy, TpeSearch, Trial,
};
use coin_quant::{Config, StrategyKind, Symbol};

#[allow(clippy::too_many_arguments)]
pub fn run(
    config_path: String,
    symbol: String,
    strategy_override: Option<String>,
    method: String,
    trials: usize,
    objective: String,
    top: usize,
    min_trades: usize,
    threads: Option<usize>,
    seed: u64,
) -> Result<()> {
    info!("Starting parameter optimization");

    let config = Config::from_file(&config_path)?;
    let kind = match strategy_override {
        Some(name) => StrategyKind::from_str(&name)?,
        None => config.strategy.kind(),
    };
    let objective = Objective::from_str(&objective)?;

    let symbol = Symbol::new(&symbol);
    let source = CsvDataSource::new(&config.backtest.data_dir);
    let candles = source
        .history(&symbol, config.backtest.lookback_days)
        .with_context(|| format!("Failed to load history for {symbol}"))?;

    let searcher: Box<dyn SearchStrategy> = match method.as_str() {
        "grid" => Box::new(GridSearch::new()),
        "tpe" | "bayesian" => Box::new(TpeSearch::with_seed(seed)),
        other => bail!("unknown search method `{other}` (expected grid or tpe)"),
    };

    // Config-supplied candidate lists win; otherwise each method gets its
    // conventional default space.
    let space = match &config.search_space {
        Some(lists) => ParamSpace::from_value_lists(lists),
        None if searcher.name() == "grid" => ParamSpace::default_grid_for(kind)?,
        None => ParamSpace::default_for(kind)?,
    };

    let mut job = SearchJob::new(kind, &candles, space);
    job.initial_balance = config.trading.initial_balance;
    job.fee_rate = config.trading.fee_rate;
    job.n_trials = trials;
    job.objective = objective;
    job.min_trades = min_trades;
    job.threads = threads;

    // Grid search runs the whole grid regardless of the trial budget.
    let planned = if searcher.name() == "grid" {
        job.space
            .domains
            .values()
            .map(|d| match d {
                ParamDomain::Values(v) => v.len() as u64,
                ParamDomain::IntRange { lo, hi } => (hi - lo + 1).max(0) as u64,
                ParamDomain::FloatRange { .. } => 1,
            })
            .product()
    } else {
        trials as u64
    };

    let bar = ProgressBar::new(planned);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} trials",
        )?
        .progress_chars("#>-"),
    );
    job.progress = Some(bar.clone());

    info!(
        strategy = %kind,
        symbol = %symbol,
        method = searcher.name(),
        bars = candles.len(),
        "search configured"
    );

    let result = searcher.search(&job)?;
    bar.finish_and_clear();

    let mut ranked: Vec<&Trial> = result.trials.iter().collect();
    ranked.sort_by_key(|t| Reverse(OrderedFloat(t.objective_score)));

    println!("\n{}", "=".repeat(72));
    println!(
        "OPTIMIZATION RESULTS - {} on {} ({} trials)",
        kind,
        symbol,
        result.trials.len()
    );
    println!("{}", "=".repeat(72));

    for (rank, trial) in ranked.iter().take(top).enumerate() {
        println!(
            "#{:<2} score={:<9.4} return={:>7.2}%  win={:>6.2}%  dd={:>6.2}%  trades={:<3} {}",
            rank + 1,
            trial.objective_score,
            trial.performance.total_return_pct,
            trial.performance.win_rate_pct,
            trial.performance.max_drawdown_pct,
            trial.performance.num_trades,
            format_params(trial),
        );
    }

    match result.best() {
        Some(best) => {
            println!("{}", "-".repeat(72));
            println!("Best parameters: {}", format_params(best));
            println!("Best score:      {:.4}", best.objective_score);
            if let Some(note) = &best.note {
                println!("Note:            {note}");
            }
        }
        None => println!("No trials completed."),
    }
    println!("{}", "=".repeat(72));

    info!("Optimization completed");
    Ok(())
}

fn format_params(trial: &Trial) -> String {
    trial
        .params
        .iter()
        .map(|(name, value)| {
            if value.fract() == 0.0 && value.abs() < 1000.0 {
                format!("{name}={}", *value as i64)
            } else {
                format!("{name}={value:.2}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
