//! Backtest command implementation

use anyhow::{Context, Result};
use tracing::info;

use coin_quant::backtest::Backtester;
use coin_quant::data::{CsvDataSource, MarketData};
use coin_quant::{Config, Symbol};

pub fn run(
    config_path: String,
    symbol: String,
    balance_override: Option<f64>,
    fee_override: Option<f64>,
) -> Result<()> {
    info!("Starting backtest");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(balance) = balance_override {
        info!("Overriding initial balance to: {:.2}", balance);
        config.trading.initial_balance = balance;
    }
    if let Some(fee) = fee_override {
        info!("Overriding fee rate to: {:.4}", fee);
        config.trading.fee_rate = fee;
    }

    let symbol = Symbol::new(&symbol);
    let source = CsvDataSource::new(&config.backtest.data_dir);
    let candles = source
        .history(&symbol, config.backtest.lookback_days)
        .with_context(|| format!("Failed to load history for {symbol}"))?;

    let backtester = Backtester::new(
        &config.strategy,
        config.trading.initial_balance,
        config.trading.fee_rate,
    )?;
    let result = backtester.run(&candles)?;

    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS - {symbol}");
    println!("{}", "=".repeat(60));
    println!("Strategy:           {}", config.strategy.kind());
    println!("Bars:               {}", candles.len());
    println!(
        "Initial Balance:    {:.2}",
        config.trading.initial_balance
    );
    println!("Final Balance:      {:.2}", result.final_balance);
    println!("Total Return:       {:.2}%", result.report.total_return_pct);
    println!("Win Rate:           {:.2}%", result.report.win_rate_pct);
    println!("Max Drawdown:       {:.2}%", result.report.max_drawdown_pct);
    println!("Sharpe Ratio:       {:.2}", result.report.sharpe_ratio);
    println!("Round Trips:        {}", result.report.num_trades);
    println!("Ledger Entries:     {}", result.ledger.len());
    println!("{}", "=".repeat(60));

    info!("Backtest completed successfully");
    Ok(())
}
