//! Candle data loading and validation
//!
//! CSV-backed loading for backtests plus the `MarketData` boundary the
//! engine consumes candles through. Series validation (strictly increasing
//! timestamps, no duplicates, well-formed candles) happens here, at the
//! data-source boundary, and surfaces as `DataSource` errors.

use anyhow::{Context, Result as AnyResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::types::{Candle, Symbol};

/// Abstract market-data source: time-ordered candle history per symbol.
///
/// Implementations guarantee monotonically increasing timestamps with no
/// duplicates; a history shorter than `lookback` is returned as-is and the
/// caller decides whether that is enough.
pub trait MarketData {
    fn history(&self, symbol: &Symbol, lookback: usize) -> Result<Vec<Candle>>;
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Load an OHLCV series from a CSV file with a
/// `timestamp,open,high,low,close,volume` header.
pub fn load_csv(path: impl AsRef<Path>) -> AnyResult<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path.as_ref())
        .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;

    let mut candles = Vec::new();
    for (idx, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row.with_context(|| format!("Failed to read row {}", idx + 1))?;
        let timestamp = parse_timestamp(&row.timestamp)
            .with_context(|| format!("Failed to parse timestamp `{}`", row.timestamp))?;
        let candle = Candle::new(timestamp, row.open, row.high, row.low, row.close, row.volume)
            .with_context(|| format!("Invalid candle in row {}", idx + 1))?;
        candles.push(candle);
    }

    Ok(candles)
}

fn parse_timestamp(raw: &str) -> AnyResult<DateTime<Utc>> {
    if let Ok(ts) = raw.parse::<DateTime<Utc>>() {
        return Ok(ts);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")?;
    let naive = date
        .and_hms_opt(0, 0, 0)
        .context("invalid midnight timestamp")?;
    Ok(DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Enforce the series contract: strictly increasing timestamps, no
/// duplicates.
pub fn validate_series(candles: &[Candle]) -> Result<()> {
    for (i, pair) in candles.windows(2).enumerate() {
        if pair[1].timestamp == pair[0].timestamp {
            return Err(EngineError::DataSource(format!(
                "duplicate timestamp {} at rows {}/{}",
                pair[0].timestamp,
                i + 1,
                i + 2
            )));
        }
        if pair[1].timestamp < pair[0].timestamp {
            return Err(EngineError::DataSource(format!(
                "out-of-order timestamp {} after {} at row {}",
                pair[1].timestamp,
                pair[0].timestamp,
                i + 2
            )));
        }
    }
    Ok(())
}

/// CSV-file data source rooted at a directory of `<SYMBOL>.csv` files.
pub struct CsvDataSource {
    data_dir: PathBuf,
}

impl CsvDataSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        CsvDataSource {
            data_dir: data_dir.into(),
        }
    }

    fn path_for(&self, symbol: &Symbol) -> PathBuf {
        self.data_dir.join(format!("{}.csv", symbol.as_str()))
    }
}

impl MarketData for CsvDataSource {
    fn history(&self, symbol: &Symbol, lookback: usize) -> Result<Vec<Candle>> {
        let path = self.path_for(symbol);
        let candles =
            load_csv(&path).map_err(|err| EngineError::DataSource(format!("{err:#}")))?;
        validate_series(&candles)?;

        let start = candles.len().saturating_sub(lookback);
        let window = candles[start..].to_vec();
        info!(
            symbol = %symbol,
            bars = window.len(),
            path = %path.display(),
            "loaded candle history"
        );
        Ok(window)
    }
}
