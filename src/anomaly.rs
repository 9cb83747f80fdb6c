//! Statistical anomaly detection
//!
//! Z-score monitors over daily price changes and traded volume, plus a
//! trade-outcome monitor over a bounded recent window. Each check produces
//! an [`AnomalyVerdict`]; the comprehensive check aggregates them into a
//! [`RiskAssessment`] whose overall level is the maximum severity among the
//! anomalous verdicts. Threshold values and severity bands are
//! configuration, not constants — operators tune them per deployment.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

use crate::error::{EngineError, Result};
use crate::types::{Candle, Trade};

/// Severity of a single verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Aggregated risk level across all verdicts. `Minimal` means no check
/// flagged an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl From<Severity> for RiskLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => RiskLevel::Low,
            Severity::Medium => RiskLevel::Medium,
            Severity::High => RiskLevel::High,
            Severity::Critical => RiskLevel::Critical,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Minimal => "minimal",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// |z-score| boundaries mapping a reading to a severity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityBands {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for SeverityBands {
    fn default() -> Self {
        SeverityBands {
            medium: 2.0,
            high: 3.0,
            critical: 4.0,
        }
    }
}

impl SeverityBands {
    pub fn classify(&self, z_score: f64) -> Severity {
        let z = z_score.abs();
        if z >= self.critical {
            Severity::Critical
        } else if z >= self.high {
            Severity::High
        } else if z >= self.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// Detector thresholds. Every value here is an operational tuning knob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// |z-score| at which a price move counts as anomalous.
    pub price_z_threshold: f64,
    /// |z-score| at which a volume reading counts as anomalous.
    pub volume_z_threshold: f64,
    /// Rolling window, in bars, for the price and volume statistics.
    pub lookback_days: usize,
    pub bands: SeverityBands,
    /// Completed round trips required before the performance check runs.
    pub min_trades: usize,
    /// Recent round trips the performance check looks at.
    pub lookback_trades: usize,
    /// Win rate below this percentage flags the strategy.
    pub win_rate_floor_pct: f64,
    /// Current consecutive-loss run at or above this flags the strategy.
    pub consecutive_loss_cap: usize,
    /// Current drawdown beyond this multiple of the mean per-trade profit
    /// flags the strategy.
    pub drawdown_cap_multiple: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        AnomalyConfig {
            price_z_threshold: 3.0,
            volume_z_threshold: 2.5,
            lookback_days: 30,
            bands: SeverityBands::default(),
            min_trades: 10,
            lookback_trades: 20,
            win_rate_floor_pct: 30.0,
            consecutive_loss_cap: 5,
            drawdown_cap_multiple: 10.0,
        }
    }
}

/// Outcome of one anomaly check.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyVerdict {
    pub is_anomaly: bool,
    pub severity: Severity,
    /// Named metric readings backing the verdict.
    pub metrics: BTreeMap<String, f64>,
    /// Suggested operator action.
    pub recommendation: String,
}

/// Aggregate of the individual checks. A sub-verdict is `None` when its
/// check lacked enough data — unknown rather than failing the whole
/// assessment.
#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub price: Option<AnomalyVerdict>,
    pub volume: Option<AnomalyVerdict>,
    pub performance: Option<AnomalyVerdict>,
    pub overall_risk_level: RiskLevel,
    pub should_pause_trading: bool,
}

pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        AnomalyDetector { config }
    }

    /// Flag the latest day-over-day price change when its z-score against
    /// the rolling window exceeds the threshold.
    pub fn detect_price_anomalies(&self, candles: &[Candle]) -> Result<AnomalyVerdict> {
        let window = self.window(candles, "price anomaly check")?;
        let changes: Vec<f64> = window
            .windows(2)
            .filter(|w| w[0].close != 0.0)
            .map(|w| (w[1].close - w[0].close) / w[0].close * 100.0)
            .collect();
        if changes.len() < 2 {
            return Err(EngineError::InsufficientData {
                context: "price anomaly check",
                required: 3,
                actual: changes.len() + 1,
            });
        }

        let mean = changes.iter().mean();
        let std_dev = changes.iter().std_dev();
        let current_change = changes[changes.len() - 1];
        let z_score = if std_dev > 0.0 {
            (current_change - mean) / std_dev
        } else {
            0.0
        };
        let historical = changes
            .iter()
            .filter(|&&c| std_dev > 0.0 && ((c - mean) / std_dev).abs() >= self.config.price_z_threshold)
            .count();

        let is_anomaly = z_score.abs() >= self.config.price_z_threshold;
        let severity = self.config.bands.classify(z_score);
        if is_anomaly {
            tracing::warn!(
                change_pct = current_change,
                z_score,
                %severity,
                "price anomaly detected"
            );
        }

        let mut metrics = BTreeMap::new();
        metrics.insert("current_price".into(), window[window.len() - 1].close);
        metrics.insert("current_change_pct".into(), current_change);
        metrics.insert("z_score".into(), z_score);
        metrics.insert("mean_change_pct".into(), mean);
        metrics.insert("std_change_pct".into(), std_dev);
        metrics.insert("historical_anomalies".into(), historical as f64);

        Ok(AnomalyVerdict {
            is_anomaly,
            severity,
            metrics,
            recommendation: price_recommendation(z_score, self.config.price_z_threshold),
        })
    }

    /// Same z-score technique applied to traded volume.
    pub fn detect_volume_anomalies(&self, candles: &[Candle]) -> Result<AnomalyVerdict> {
        let window = self.window(candles, "volume anomaly check")?;
        let volumes: Vec<f64> = window.iter().map(|c| c.volume).collect();

        let mean = volumes.iter().mean();
        let std_dev = volumes.iter().std_dev();
        let current = volumes[volumes.len() - 1];
        let z_score = if std_dev > 0.0 { (current - mean) / std_dev } else { 0.0 };

        let is_anomaly = z_score.abs() >= self.config.volume_z_threshold;
        let severity = self.config.bands.classify(z_score);
        if is_anomaly {
            tracing::warn!(volume = current, mean_volume = mean, z_score, %severity, "volume anomaly detected");
        }

        let mut metrics = BTreeMap::new();
        metrics.insert("current_volume".into(), current);
        metrics.insert("mean_volume".into(), mean);
        metrics.insert("z_score".into(), z_score);
        metrics.insert(
            "volume_ratio".into(),
            if mean > 0.0 { current / mean } else { 0.0 },
        );

        let recommendation = if !is_anomaly {
            "Volume within normal range. Continue with strategy.".to_string()
        } else if z_score > 0.0 {
            "WARNING: Unusually high volume. Expect elevated volatility; verify liquidity before sizing up.".to_string()
        } else {
            "WARNING: Unusually low volume. Fills may slip; consider reducing order sizes.".to_string()
        };

        Ok(AnomalyVerdict {
            is_anomaly,
            severity,
            metrics,
            recommendation,
        })
    }

    /// Inspect the recent round trips for degrading performance: a win rate
    /// under the floor, a consecutive-loss run at the cap, or a drawdown
    /// out of proportion to the mean trade.
    pub fn detect_performance_anomalies(&self, trades: &[Trade]) -> Result<AnomalyVerdict> {
        let profits: Vec<f64> = trades
            .iter()
            .filter_map(|t| t.realized_profit)
            .collect();
        if profits.len() < self.config.min_trades {
            return Err(EngineError::InsufficientData {
                context: "performance anomaly check",
                required: self.config.min_trades,
                actual: profits.len(),
            });
        }

        let recent =
            &profits[profits.len().saturating_sub(self.config.lookback_trades)..];
        let wins = recent.iter().filter(|&&p| p > 0.0).count();
        let win_rate = wins as f64 / recent.len() as f64 * 100.0;
        let mean_profit = recent.iter().mean();

        let current_losses = recent.iter().rev().take_while(|&&p| p < 0.0).count();
        let longest_losses = longest_loss_run(recent);

        // Running equity over the window: drawdown from its peak.
        let mut cumulative = 0.0;
        let mut peak = 0.0;
        let mut current_drawdown = 0.0;
        let mut max_drawdown = 0.0;
        for &p in recent {
            cumulative += p;
            if cumulative > peak {
                peak = cumulative;
            }
            current_drawdown = cumulative - peak;
            if current_drawdown < max_drawdown {
                max_drawdown = current_drawdown;
            }
        }

        let drawdown_cap = mean_profit.abs() * self.config.drawdown_cap_multiple;
        let is_anomaly = current_losses >= self.config.consecutive_loss_cap
            || win_rate < self.config.win_rate_floor_pct
            || current_drawdown.abs() > drawdown_cap;

        let severity = performance_severity(
            &self.config,
            current_losses,
            win_rate,
            current_drawdown.abs(),
            drawdown_cap,
        );
        if is_anomaly {
            tracing::warn!(
                win_rate,
                consecutive_losses = current_losses,
                drawdown = current_drawdown,
                %severity,
                "strategy performance anomaly detected"
            );
        }

        let mut metrics = BTreeMap::new();
        metrics.insert("num_trades_analyzed".into(), recent.len() as f64);
        metrics.insert("win_rate_pct".into(), win_rate);
        metrics.insert("mean_profit".into(), mean_profit);
        metrics.insert("consecutive_losses".into(), current_losses as f64);
        metrics.insert("longest_loss_run".into(), longest_losses as f64);
        metrics.insert("current_drawdown".into(), current_drawdown);
        metrics.insert("max_drawdown".into(), max_drawdown);

        Ok(AnomalyVerdict {
            is_anomaly,
            severity,
            metrics,
            recommendation: performance_recommendation(&self.config, is_anomaly, severity),
        })
    }

    /// Run every applicable check and aggregate. Sub-checks without enough
    /// data degrade to unknown verdicts; the overall level is the maximum
    /// severity among the anomalous ones, and trading should pause at high
    /// or critical.
    pub fn comprehensive_check(
        &self,
        candles: &[Candle],
        trades: Option<&[Trade]>,
    ) -> RiskAssessment {
        let price = self.run_degraded(self.detect_price_anomalies(candles), "price");
        let volume = self.run_degraded(self.detect_volume_anomalies(candles), "volume");
        let performance = trades
            .and_then(|t| self.run_degraded(self.detect_performance_anomalies(t), "performance"));

        let overall_risk_level = [price.as_ref(), volume.as_ref(), performance.as_ref()]
            .into_iter()
            .flatten()
            .filter(|v| v.is_anomaly)
            .map(|v| RiskLevel::from(v.severity))
            .max()
            .unwrap_or(RiskLevel::Minimal);

        let should_pause_trading = overall_risk_level >= RiskLevel::High;
        if should_pause_trading {
            tracing::warn!(%overall_risk_level, "risk assessment recommends pausing trading");
        }

        RiskAssessment {
            price,
            volume,
            performance,
            overall_risk_level,
            should_pause_trading,
        }
    }

    fn run_degraded(
        &self,
        outcome: Result<AnomalyVerdict>,
        check: &'static str,
    ) -> Option<AnomalyVerdict> {
        match outcome {
            Ok(verdict) => Some(verdict),
            Err(err) => {
                tracing::debug!(check, %err, "sub-check unavailable, reporting unknown");
                None
            }
        }
    }

    fn window<'a>(&self, candles: &'a [Candle], context: &'static str) -> Result<&'a [Candle]> {
        if candles.len() < self.config.lookback_days {
            return Err(EngineError::InsufficientData {
                context,
                required: self.config.lookback_days,
                actual: candles.len(),
            });
        }
        Ok(&candles[candles.len() - self.config.lookback_days..])
    }
}

fn longest_loss_run(profits: &[f64]) -> usize {
    let mut longest = 0usize;
    let mut current = 0usize;
    for &p in profits {
        if p < 0.0 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn price_recommendation(z_score: f64, threshold: f64) -> String {
    if z_score >= threshold {
        if z_score >= threshold * 1.5 {
            "CRITICAL: Extreme price spike detected. Consider pausing trading.".to_string()
        } else {
            "WARNING: Unusual price increase. Monitor closely before buying.".to_string()
        }
    } else if z_score <= -threshold {
        if z_score <= -threshold * 1.5 {
            "CRITICAL: Extreme price drop detected. Consider an emergency exit.".to_string()
        } else {
            "WARNING: Unusual price decrease. Avoid buying; review stop losses.".to_string()
        }
    } else {
        "Normal market conditions. Continue with strategy.".to_string()
    }
}

fn performance_severity(
    config: &AnomalyConfig,
    consecutive_losses: usize,
    win_rate: f64,
    drawdown: f64,
    drawdown_cap: f64,
) -> Severity {
    // Each dimension contributes 0-3 points depending on how far past its
    // threshold it sits; the sum maps to a severity tier.
    let mut score = 0u32;

    if consecutive_losses >= config.consecutive_loss_cap + 2 {
        score += 3;
    } else if consecutive_losses >= config.consecutive_loss_cap {
        score += 2;
    } else if consecutive_losses + 2 >= config.consecutive_loss_cap {
        score += 1;
    }

    if win_rate < config.win_rate_floor_pct - 5.0 {
        score += 3;
    } else if win_rate < config.win_rate_floor_pct + 5.0 {
        score += 2;
    } else if win_rate < config.win_rate_floor_pct + 15.0 {
        score += 1;
    }

    if drawdown_cap > 0.0 {
        if drawdown > drawdown_cap {
            score += 3;
        } else if drawdown > drawdown_cap * 0.5 {
            score += 2;
        } else if drawdown > drawdown_cap * 0.2 {
            score += 1;
        }
    }

    if score >= 7 {
        Severity::Critical
    } else if score >= 5 {
        Severity::High
    } else if score >= 3 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn performance_recommendation(
    config: &AnomalyConfig,
    is_anomaly: bool,
    severity: Severity,
) -> String {
    match (is_anomaly, severity) {
        (true, Severity::Critical) => {
            "CRITICAL: Strategy performance severely degraded. Pause trading and review parameters."
                .to_string()
        }
        (true, Severity::High) => {
            "WARNING: Strategy underperforming. Consider parameter re-optimization.".to_string()
        }
        (true, _) => format!(
            "CAUTION: Monitor strategy closely (win-rate floor {}%, loss cap {}).",
            config.win_rate_floor_pct, config.consecutive_loss_cap
        ),
        (false, _) => "Strategy performance is acceptable. Continue monitoring.".to_string(),
    }
}
