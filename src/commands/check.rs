//! Check command implementation

use anyhow::{Context, Result};
use tracing::info;

use coin_quant::anomaly::{AnomalyDetector, AnomalyVerdict};
use coin_quant::data::{CsvDataSource, MarketData};
use coin_quant::{Config, Symbol, Trade};

pub fn run(config_path: String, symbol: String, trades_path: Option<String>) -> Result<()> {
    info!("Running risk assessment");

    let config = Config::from_file(&config_path)?;
    let symbol = Symbol::new(&symbol);

    let source = CsvDataSource::new(&config.backtest.data_dir);
    let candles = source
        .history(&symbol, config.backtest.lookback_days)
        .with_context(|| format!("Failed to load history for {symbol}"))?;

    let trades: Option<Vec<Trade>> = match trades_path {
        Some(path) => {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read trades file {path}"))?;
            Some(serde_json::from_str(&contents).context("Failed to parse trades JSON")?)
        }
        None => None,
    };

    let detector = AnomalyDetector::new(config.anomaly.clone());
    let assessment = detector.comprehensive_check(&candles, trades.as_deref());

    println!("\n{}", "=".repeat(60));
    println!("RISK ASSESSMENT - {symbol}");
    println!("{}", "=".repeat(60));
    print_verdict("Price", assessment.price.as_ref());
    print_verdict("Volume", assessment.volume.as_ref());
    print_verdict("Performance", assessment.performance.as_ref());
    println!("{}", "-".repeat(60));
    println!("Overall risk level: {}", assessment.overall_risk_level);
    println!(
        "Pause trading:      {}",
        if assessment.should_pause_trading {
            "YES"
        } else {
            "no"
        }
    );
    println!("{}", "=".repeat(60));

    info!("Risk assessment completed");
    Ok(())
}

fn print_verdict(label: &str, verdict: Option<&AnomalyVerdict>) {
    match verdict {
        Some(v) => {
            println!(
                "{label:<12} {}  severity={}",
                if v.is_anomaly { "ANOMALY" } else { "normal " },
                v.severity
            );
            println!("{:<12} {}", "", v.recommendation);
        }
        None => println!("{label:<12} unknown (insufficient data)"),
    }
}
