//! Coin Quant - main entry point
//!
//! This binary provides three subcommands:
//! - backtest: Replay a strategy over historical data
//! - optimize: Search strategy parameters (grid or sequential)
//! - check: Run the anomaly/risk assessment

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "coin-quant")]
#[command(about = "Quantitative trading decision engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a strategy over historical data
    Backtest {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Symbol to backtest
        #[arg(short, long, default_value = "BTC")]
        symbol: String,

        /// Initial balance (overrides config)
        #[arg(long)]
        balance: Option<f64>,

        /// Fee rate (overrides config)
        #[arg(long)]
        fee: Option<f64>,
    },

    /// Search strategy parameters against a performance objective
    Optimize {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Symbol to optimize for
        #[arg(short, long, default_value = "BTC")]
        symbol: String,

        /// Strategy kind to tune (overrides config)
        #[arg(long)]
        strategy: Option<String>,

        /// Search method (grid or tpe)
        #[arg(short, long, default_value = "grid")]
        method: String,

        /// Trial budget for the sequential search
        #[arg(short = 'n', long, default_value = "50")]
        trials: usize,

        /// Objective to maximize (sharpe, return, win_rate)
        #[arg(long, default_value = "sharpe")]
        objective: String,

        /// Number of top results to show
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Minimum completed trades for a measurable trial
        #[arg(long, default_value = "5")]
        min_trades: usize,

        /// Thread cap for parallel grid trials
        #[arg(long)]
        threads: Option<usize>,

        /// RNG seed for the sequential search
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Run the anomaly/risk assessment for a symbol
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Symbol to check
        #[arg(short, long, default_value = "BTC")]
        symbol: String,

        /// Optional JSON file with recent trades for the performance check
        #[arg(long)]
        trades: Option<String>,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!("{command_name}.log");
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::daily("logs", &log_filename);

    if file_only {
        // Keep the console clean for the optimizer's progress bar.
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_ansi(true);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Backtest { .. } => ("backtest", false),
        Commands::Optimize { .. } => ("optimize", true), // File-only for a clean progress bar
        Commands::Check { .. } => ("check", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Backtest {
            config,
            symbol,
            balance,
            fee,
        } => commands::backtest::run(config, symbol, balance, fee),

        Commands::Optimize {
            config,
            symbol,
            strategy,
            method,
            trials,
            objective,
            top,
            min_trades,
            threads,
            seed,
        } => commands::optimize::run(
            config, symbol, strategy, method, trials, objective, top, min_trades, threads, seed,
        ),

        Commands::Check {
            config,
            symbol,
            trades,
        } => commands::check::run(config, symbol, trades),
    }
}
