//! Configuration management
//!
//! Strategy configurations are a tagged union over the strategy kinds plus
//! the shared risk-exit parameters. Domain constraints are checked by
//! `validate()` at construction time; violations fail with
//! `InvalidParameter` and are never silently clamped.

use anyhow::{Context, Result as AnyResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::anomaly::AnomalyConfig;
use crate::error::{EngineError, Result};

/// Top-level application configuration, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    /// Optional grid-search candidate lists, one entry per parameter name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_space: Option<BTreeMap<String, Vec<f64>>>,
}

impl Config {
    /// Load configuration from a JSON file and validate the strategy section.
    pub fn from_file(path: impl AsRef<Path>) -> AnyResult<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.strategy.validate()?;
        Ok(config)
    }
}

/// Trading simulation parameters shared by backtests and optimization runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    pub initial_balance: f64,
    pub fee_rate: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            initial_balance: 1_000_000.0,
            fee_rate: 0.0025,
        }
    }
}

/// Backtest data parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub data_dir: String,
    pub lookback_days: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            data_dir: "data".to_string(),
            lookback_days: 90,
        }
    }
}

/// Strategy kind discriminant, used for factory dispatch and search-space
/// selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    MovingAverage,
    Rsi,
    Bollinger,
    Macd,
    Stochastic,
    Composite,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::MovingAverage => "moving_average",
            StrategyKind::Rsi => "rsi",
            StrategyKind::Bollinger => "bollinger",
            StrategyKind::Macd => "macd",
            StrategyKind::Stochastic => "stochastic",
            StrategyKind::Composite => "composite",
        }
    }
}

impl FromStr for StrategyKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "moving_average" | "ma" => Ok(StrategyKind::MovingAverage),
            "rsi" => Ok(StrategyKind::Rsi),
            "bollinger" => Ok(StrategyKind::Bollinger),
            "macd" => Ok(StrategyKind::Macd),
            "stochastic" => Ok(StrategyKind::Stochastic),
            "composite" => Ok(StrategyKind::Composite),
            other => Err(EngineError::invalid_param(
                "strategy.kind",
                format!(
                    "unknown strategy `{other}` (expected moving_average, rsi, bollinger, \
                     macd, stochastic, or composite)"
                ),
            )),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific strategy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyParams {
    /// Golden/death cross of two simple moving averages
    MovingAverage { short_period: usize, long_period: usize },
    /// Oversold/overbought zone entries of the relative strength index
    Rsi {
        period: usize,
        oversold: f64,
        overbought: f64,
    },
    /// Band re-entry after a close outside the Bollinger bands
    Bollinger { period: usize, std_dev: f64 },
    /// MACD line crossing its signal line
    Macd {
        fast_period: usize,
        slow_period: usize,
        signal_period: usize,
    },
    /// %K/%D crossover inside the oversold/overbought regions
    Stochastic {
        k_period: usize,
        d_period: usize,
        oversold: f64,
        overbought: f64,
    },
    /// Voting ensemble over member strategies
    Composite {
        members: Vec<StrategyParams>,
        min_confirmations: usize,
    },
}

impl StrategyParams {
    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyParams::MovingAverage { .. } => StrategyKind::MovingAverage,
            StrategyParams::Rsi { .. } => StrategyKind::Rsi,
            StrategyParams::Bollinger { .. } => StrategyKind::Bollinger,
            StrategyParams::Macd { .. } => StrategyKind::Macd,
            StrategyParams::Stochastic { .. } => StrategyKind::Stochastic,
            StrategyParams::Composite { .. } => StrategyKind::Composite,
        }
    }

    /// Conventional defaults for each kind.
    pub fn default_for(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::MovingAverage => StrategyParams::MovingAverage {
                short_period: 5,
                long_period: 20,
            },
            StrategyKind::Rsi => StrategyParams::Rsi {
                period: 14,
                oversold: 30.0,
                overbought: 70.0,
            },
            StrategyKind::Bollinger => StrategyParams::Bollinger {
                period: 20,
                std_dev: 2.0,
            },
            StrategyKind::Macd => StrategyParams::Macd {
                fast_period: 12,
                slow_period: 26,
                signal_period: 9,
            },
            StrategyKind::Stochastic => StrategyParams::Stochastic {
                k_period: 14,
                d_period: 3,
                oversold: 20.0,
                overbought: 80.0,
            },
            StrategyKind::Composite => StrategyParams::Composite {
                members: vec![
                    StrategyParams::default_for(StrategyKind::MovingAverage),
                    StrategyParams::default_for(StrategyKind::Rsi),
                    StrategyParams::default_for(StrategyKind::Macd),
                ],
                min_confirmations: 2,
            },
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            StrategyParams::MovingAverage {
                short_period,
                long_period,
            } => {
                require_period("moving_average.short_period", *short_period)?;
                require_period("moving_average.long_period", *long_period)?;
                if short_period >= long_period {
                    return Err(EngineError::invalid_param(
                        "moving_average.short_period",
                        format!("short period ({short_period}) must be < long period ({long_period})"),
                    ));
                }
            }
            StrategyParams::Rsi {
                period,
                oversold,
                overbought,
            } => {
                require_period("rsi.period", *period)?;
                require_band("rsi", *oversold, *overbought)?;
            }
            StrategyParams::Bollinger { period, std_dev } => {
                require_period("bollinger.period", *period)?;
                if *std_dev <= 0.0 {
                    return Err(EngineError::invalid_param(
                        "bollinger.std_dev",
                        format!("standard deviation multiplier must be > 0, got {std_dev}"),
                    ));
                }
            }
            StrategyParams::Macd {
                fast_period,
                slow_period,
                signal_period,
            } => {
                require_period("macd.fast_period", *fast_period)?;
                require_period("macd.slow_period", *slow_period)?;
                require_period("macd.signal_period", *signal_period)?;
                if fast_period >= slow_period {
                    return Err(EngineError::invalid_param(
                        "macd.fast_period",
                        format!("fast period ({fast_period}) must be < slow period ({slow_period})"),
                    ));
                }
            }
            StrategyParams::Stochastic {
                k_period,
                d_period,
                oversold,
                overbought,
            } => {
                require_period("stochastic.k_period", *k_period)?;
                require_period("stochastic.d_period", *d_period)?;
                require_band("stochastic", *oversold, *overbought)?;
            }
            StrategyParams::Composite {
                members,
                min_confirmations,
            } => {
                if members.is_empty() {
                    return Err(EngineError::invalid_param(
                        "composite.members",
                        "composite strategy needs at least one member",
                    ));
                }
                if *min_confirmations == 0 || *min_confirmations > members.len() {
                    return Err(EngineError::invalid_param(
                        "composite.min_confirmations",
                        format!(
                            "must be between 1 and the member count ({}), got {min_confirmations}",
                            members.len()
                        ),
                    ));
                }
                for member in members {
                    member.validate()?;
                }
            }
        }
        Ok(())
    }
}

fn require_period(name: &'static str, period: usize) -> Result<()> {
    if period == 0 {
        return Err(EngineError::invalid_param(name, "period must be >= 1"));
    }
    Ok(())
}

fn require_band(prefix: &str, oversold: f64, overbought: f64) -> Result<()> {
    if !(0.0..100.0).contains(&oversold) || !(0.0..=100.0).contains(&overbought) {
        return Err(EngineError::invalid_param(
            format!("{prefix}.oversold"),
            format!("thresholds must lie in (0, 100), got {oversold}/{overbought}"),
        ));
    }
    if oversold >= overbought {
        return Err(EngineError::invalid_param(
            format!("{prefix}.oversold"),
            format!("oversold ({oversold}) must be < overbought ({overbought})"),
        ));
    }
    Ok(())
}

/// Shared risk-exit parameters applied on top of any strategy signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParams {
    /// Force a sell once unrealized gain reaches this percentage.
    pub profit_target_pct: f64,
    /// Force a sell once unrealized loss reaches this percentage.
    pub stop_loss_pct: f64,
    /// Optional: force a sell when price falls this far (percent) below the
    /// highest price seen since entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailing_stop_pct: Option<f64>,
}

impl Default for RiskParams {
    fn default() -> Self {
        RiskParams {
            profit_target_pct: 5.0,
            stop_loss_pct: 3.0,
            trailing_stop_pct: None,
        }
    }
}

impl RiskParams {
    fn validate(&self) -> Result<()> {
        if self.profit_target_pct <= 0.0 {
            return Err(EngineError::invalid_param(
                "risk.profit_target_pct",
                format!("must be > 0, got {}", self.profit_target_pct),
            ));
        }
        if self.stop_loss_pct <= 0.0 {
            return Err(EngineError::invalid_param(
                "risk.stop_loss_pct",
                format!("must be > 0, got {}", self.stop_loss_pct),
            ));
        }
        if let Some(trailing) = self.trailing_stop_pct {
            if trailing <= 0.0 {
                return Err(EngineError::invalid_param(
                    "risk.trailing_stop_pct",
                    format!("must be > 0 when set, got {trailing}"),
                ));
            }
        }
        Ok(())
    }
}

/// Full strategy configuration: kind-specific parameters plus the risk
/// overlay shared by every kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub params: StrategyParams,
    #[serde(default)]
    pub risk: RiskParams,
}

impl StrategyConfig {
    pub fn new(params: StrategyParams, risk: RiskParams) -> Result<Self> {
        let config = StrategyConfig { params, risk };
        config.validate()?;
        Ok(config)
    }

    /// Defaults for the given kind with default risk parameters.
    pub fn default_for(kind: StrategyKind) -> Self {
        StrategyConfig {
            params: StrategyParams::default_for(kind),
            risk: RiskParams::default(),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        self.params.kind()
    }

    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        self.risk.validate()
    }

    /// Build a configuration for `kind` from a flat parameter map, as
    /// produced by the search layer. Starts from the kind's defaults,
    /// applies every entry, and validates the result; unknown names fail
    /// rather than being ignored.
    pub fn from_search_params(kind: StrategyKind, values: &BTreeMap<String, f64>) -> Result<Self> {
        if kind == StrategyKind::Composite {
            return Err(EngineError::invalid_param(
                "strategy.kind",
                "composite strategies have no flat search space; tune the members instead",
            ));
        }

        let mut params = StrategyParams::default_for(kind);
        let mut risk = RiskParams::default();

        for (name, &value) in values {
            if apply_risk_param(&mut risk, name, value) {
                continue;
            }
            if !apply_strategy_param(&mut params, name, value) {
                return Err(EngineError::invalid_param(
                    name.clone(),
                    format!("not a tunable parameter of the {kind} strategy"),
                ));
            }
        }

        StrategyConfig::new(params, risk)
    }
}

fn apply_risk_param(risk: &mut RiskParams, name: &str, value: f64) -> bool {
    match name {
        "profit_target" => risk.profit_target_pct = value,
        "stop_loss" => risk.stop_loss_pct = value,
        "trailing_stop" => risk.trailing_stop_pct = Some(value),
        _ => return false,
    }
    true
}

fn apply_strategy_param(params: &mut StrategyParams, name: &str, value: f64) -> bool {
    let as_period = value.round() as usize;
    match (params, name) {
        (StrategyParams::MovingAverage { short_period, .. }, "short_period") => {
            *short_period = as_period
        }
        (StrategyParams::MovingAverage { long_period, .. }, "long_period") => {
            *long_period = as_period
        }
        (StrategyParams::Rsi { period, .. }, "period") => *period = as_period,
        (StrategyParams::Rsi { oversold, .. }, "oversold") => *oversold = value,
        (StrategyParams::Rsi { overbought, .. }, "overbought") => *overbought = value,
        (StrategyParams::Bollinger { period, .. }, "period") => *period = as_period,
        (StrategyParams::Bollinger { std_dev, .. }, "std_dev") => *std_dev = value,
        (StrategyParams::Macd { fast_period, .. }, "fast_period") => *fast_period = as_period,
        (StrategyParams::Macd { slow_period, .. }, "slow_period") => *slow_period = as_period,
        (StrategyParams::Macd { signal_period, .. }, "signal_period") => {
            *signal_period = as_period
        }
        (StrategyParams::Stochastic { k_period, .. }, "k_period") => *k_period = as_period,
        (StrategyParams::Stochastic { d_period, .. }, "d_period") => *d_period = as_period,
        (StrategyParams::Stochastic { oversold, .. }, "oversold") => *oversold = value,
        (StrategyParams::Stochastic { overbought, .. }, "overbought") => *overbought = value,
        _ => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_for_every_kind() {
        for kind in [
            StrategyKind::MovingAverage,
            StrategyKind::Rsi,
            StrategyKind::Bollinger,
            StrategyKind::Macd,
            StrategyKind::Stochastic,
            StrategyKind::Composite,
        ] {
            StrategyConfig::default_for(kind).validate().unwrap();
        }
    }

    #[test]
    fn rejects_inverted_ma_periods() {
        let config = StrategyConfig {
            params: StrategyParams::MovingAverage {
                short_period: 20,
                long_period: 5,
            },
            risk: RiskParams::default(),
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("short_period"));
    }

    #[test]
    fn rejects_rsi_oversold_at_or_above_overbought() {
        let config = StrategyConfig {
            params: StrategyParams::Rsi {
                period: 14,
                oversold: 70.0,
                overbought: 70.0,
            },
            risk: RiskParams::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_stop_loss() {
        let config = StrategyConfig {
            params: StrategyParams::default_for(StrategyKind::Rsi),
            risk: RiskParams {
                stop_loss_pct: 0.0,
                ..RiskParams::default()
            },
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stop_loss_pct"));
    }

    #[test]
    fn rejects_composite_confirmations_above_member_count() {
        let config = StrategyConfig {
            params: StrategyParams::Composite {
                members: vec![StrategyParams::default_for(StrategyKind::Rsi)],
                min_confirmations: 2,
            },
            risk: RiskParams::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn search_params_build_a_validated_config() {
        let mut values = BTreeMap::new();
        values.insert("short_period".to_string(), 8.0);
        values.insert("long_period".to_string(), 34.0);
        values.insert("profit_target".to_string(), 6.0);
        values.insert("stop_loss".to_string(), 2.5);

        let config =
            StrategyConfig::from_search_params(StrategyKind::MovingAverage, &values).unwrap();
        assert_eq!(
            config.params,
            StrategyParams::MovingAverage {
                short_period: 8,
                long_period: 34,
            }
        );
        assert_eq!(config.risk.profit_target_pct, 6.0);
        assert_eq!(config.risk.stop_loss_pct, 2.5);
    }

    #[test]
    fn search_params_reject_unknown_names() {
        let mut values = BTreeMap::new();
        values.insert("period".to_string(), 14.0);

        let err = StrategyConfig::from_search_params(StrategyKind::MovingAverage, &values)
            .unwrap_err();
        assert!(err.to_string().contains("period"));
    }

    #[test]
    fn search_params_reject_invalid_combinations_rather_than_clamping() {
        let mut values = BTreeMap::new();
        values.insert("fast_period".to_string(), 30.0);
        values.insert("slow_period".to_string(), 20.0);

        assert!(StrategyConfig::from_search_params(StrategyKind::Macd, &values).is_err());
    }

    #[test]
    fn strategy_config_round_trips_through_json() {
        let config = StrategyConfig::default_for(StrategyKind::Stochastic);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: StrategyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
