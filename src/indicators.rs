//! Technical indicators
//!
//! Stateless functions over ordered price series. Every output vector is
//! aligned to its input: position `i` is computed from inputs `..=i` only
//! (no look-ahead), with `None` during the warm-up window. A series shorter
//! than the minimum window fails with `EngineError::InsufficientData`, which
//! callers treat as "not yet computable" rather than fatal.

use crate::error::{EngineError, Result};

/// Aligned indicator series with `None` during warm-up
pub type Series = Vec<Option<f64>>;

/// (upper, middle, lower) band triple
pub type BandSeries = (Series, Series, Series);

/// (macd, signal, histogram) triple
pub type MacdSeries = (Series, Series, Series);

/// (%K, %D) pair
pub type StochasticSeries = (Series, Series);

fn check_window(context: &'static str, len: usize, required: usize) -> Result<()> {
    if len < required {
        return Err(EngineError::InsufficientData {
            context,
            required,
            actual: len,
        });
    }
    Ok(())
}

fn check_period(name: &'static str, period: usize) -> Result<()> {
    if period == 0 {
        return Err(EngineError::invalid_param(name, "period must be >= 1"));
    }
    Ok(())
}

/// Simple Moving Average: arithmetic mean over the trailing window.
pub fn sma(values: &[f64], period: usize) -> Result<Series> {
    check_period("sma.period", period)?;
    check_window("sma", values.len(), period)?;

    let mut result = Vec::with_capacity(values.len());
    let mut window_sum = 0.0;

    for (i, &value) in values.iter().enumerate() {
        window_sum += value;
        if i + 1 < period {
            result.push(None);
        } else {
            if i + 1 > period {
                window_sum -= values[i - period];
            }
            result.push(Some(window_sum / period as f64));
        }
    }

    Ok(result)
}

/// Exponential Moving Average with multiplier 2/(N+1), seeded with the SMA
/// of the first N values.
pub fn ema(values: &[f64], period: usize) -> Result<Series> {
    check_period("ema.period", period)?;
    check_window("ema", values.len(), period)?;

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut result = Vec::with_capacity(values.len());
    let mut current: Option<f64> = None;

    for (i, &value) in values.iter().enumerate() {
        match current {
            None if i + 1 < period => result.push(None),
            None => {
                let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
                current = Some(seed);
                result.push(current);
            }
            Some(prev) => {
                let next = (value - prev) * multiplier + prev;
                current = Some(next);
                result.push(current);
            }
        }
    }

    Ok(result)
}

/// Relative Strength Index using Wilder's smoothing of average gain/loss.
///
/// Needs `period + 1` points (gains start at the second value). With no
/// movement at all the index reads 50 (neutral); with zero average loss it
/// saturates at 100.
pub fn rsi(values: &[f64], period: usize) -> Result<Series> {
    check_period("rsi.period", period)?;
    check_window("rsi", values.len(), period + 1)?;

    let mut gains = vec![0.0];
    let mut losses = vec![0.0];
    for pair in values.windows(2) {
        let change = pair[1] - pair[0];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut result = vec![None; values.len()];
    // Seed with the simple mean of the first `period` gains/losses,
    // then Wilder's recursion: avg = (prev * (period - 1) + current) / period.
    let mut avg_gain: f64 = gains[1..=period].iter().sum::<f64>() / period as f64;
    let mut avg_loss: f64 = losses[1..=period].iter().sum::<f64>() / period as f64;
    result[period] = Some(rsi_value(avg_gain, avg_loss));

    for i in period + 1..values.len() {
        avg_gain = (avg_gain * (period as f64 - 1.0) + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + losses[i]) / period as f64;
        result[i] = Some(rsi_value(avg_gain, avg_loss));
    }

    Ok(result)
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - (100.0 / (1.0 + rs))
    }
}

/// Bollinger Bands: SMA middle band, bands at `num_std` population standard
/// deviations over the window.
pub fn bollinger_bands(values: &[f64], period: usize, num_std: f64) -> Result<BandSeries> {
    check_period("bollinger.period", period)?;
    if num_std <= 0.0 {
        return Err(EngineError::invalid_param(
            "bollinger.num_std",
            "standard deviation multiplier must be > 0",
        ));
    }
    check_window("bollinger", values.len(), period)?;

    let middle = sma(values, period)?;
    let mut upper = Vec::with_capacity(values.len());
    let mut lower = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        match middle[i] {
            Some(mid) => {
                let window = &values[i + 1 - period..=i];
                let variance = window
                    .iter()
                    .map(|&x| {
                        let diff = x - mid;
                        diff * diff
                    })
                    .sum::<f64>()
                    / period as f64;
                let std_dev = variance.sqrt();
                upper.push(Some(mid + num_std * std_dev));
                lower.push(Some(mid - num_std * std_dev));
            }
            None => {
                upper.push(None);
                lower.push(None);
            }
        }
    }

    Ok((upper, middle, lower))
}

/// MACD: fast EMA minus slow EMA, with an EMA signal line and histogram.
///
/// Needs `slow_period + signal_period` points so the signal line has at
/// least two values for crossover detection.
pub fn macd(
    values: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Result<MacdSeries> {
    check_period("macd.fast_period", fast_period)?;
    check_period("macd.slow_period", slow_period)?;
    check_period("macd.signal_period", signal_period)?;
    if fast_period >= slow_period {
        return Err(EngineError::invalid_param(
            "macd.fast_period",
            format!("fast period ({fast_period}) must be < slow period ({slow_period})"),
        ));
    }
    check_window("macd", values.len(), slow_period + signal_period)?;

    let fast = ema(values, fast_period)?;
    let slow = ema(values, slow_period)?;

    let mut macd_line: Series = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        macd_line.push(match (fast[i], slow[i]) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        });
    }

    // The signal line is an EMA over the dense part of the MACD line,
    // re-aligned to the input offsets afterwards.
    let offset = slow_period - 1;
    let dense: Vec<f64> = macd_line[offset..].iter().filter_map(|&x| x).collect();
    let dense_signal = ema(&dense, signal_period)?;

    let mut signal: Series = vec![None; values.len()];
    for (j, value) in dense_signal.into_iter().enumerate() {
        signal[offset + j] = value;
    }

    let histogram: Series = macd_line
        .iter()
        .zip(signal.iter())
        .map(|(m, s)| match (m, s) {
            (Some(m), Some(s)) => Some(m - s),
            _ => None,
        })
        .collect();

    Ok((macd_line, signal, histogram))
}

/// Stochastic oscillator.
///
/// %K = (close - lowest_low) / (highest_high - lowest_low) * 100 over
/// `k_period`; %D = SMA(%K, `d_period`). A zero high-low range reads as a
/// neutral 50.
pub fn stochastic(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    k_period: usize,
    d_period: usize,
) -> Result<StochasticSeries> {
    check_period("stochastic.k_period", k_period)?;
    check_period("stochastic.d_period", d_period)?;
    check_window("stochastic", close.len(), k_period + d_period - 1)?;
    if high.len() != close.len() || low.len() != close.len() {
        return Err(EngineError::invalid_param(
            "stochastic.series",
            "high/low/close series must have equal length",
        ));
    }

    let mut k: Series = Vec::with_capacity(close.len());
    for i in 0..close.len() {
        if i + 1 < k_period {
            k.push(None);
            continue;
        }
        let window = i + 1 - k_period..=i;
        let highest = high[window.clone()].iter().copied().fold(f64::MIN, f64::max);
        let lowest = low[window].iter().copied().fold(f64::MAX, f64::min);
        let range = highest - lowest;
        if range == 0.0 {
            k.push(Some(50.0));
        } else {
            k.push(Some((close[i] - lowest) / range * 100.0));
        }
    }

    let offset = k_period - 1;
    let dense: Vec<f64> = k[offset..].iter().filter_map(|&x| x).collect();
    let dense_d = sma(&dense, d_period)?;

    let mut d: Series = vec![None; close.len()];
    for (j, value) in dense_d.into_iter().enumerate() {
        d[offset + j] = value;
    }

    Ok((k, d))
}
