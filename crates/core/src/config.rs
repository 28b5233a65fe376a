//! Configuration structures for the signal-backtest system.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for a backtest run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker frictions.
    pub broker: BrokerConfig,
    /// Fill price selection.
    pub execution: ExecutionConfig,
    /// Reporting parameters.
    pub report: ReportConfig,
}

impl Config {
    /// Parse a configuration from a JSON document.
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Check every section for values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        self.broker.validate()?;
        self.report.validate()
    }
}

/// Per-unit transaction frictions charged by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Commission per unit of position change, in price units.
    pub commission: f64,
    /// Slippage per unit of position change, in price units.
    pub slippage: f64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            commission: 2.0,
            slippage: 1.0,
        }
    }
}

impl BrokerConfig {
    /// Frictions may be zero but never negative.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("commission", self.commission), ("slippage", self.slippage)] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::config(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Which bar price a simulated order fills at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseAt {
    /// Fill at the bar's open.
    Open,
    /// Fill at the bar's close.
    #[default]
    Close,
}

/// Execution configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Fill price used by the signal-following strategy.
    pub exercise_at: ExerciseAt,
}

/// Reporting parameters for return/risk statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Trading days per year used for annualization.
    pub year_days: u32,
    /// Annual risk-free rate, in percent.
    pub risk_free_rate: f64,
    /// Number of drawdown periods listed in reports.
    pub top_drawdowns: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            year_days: 245,
            risk_free_rate: 3.0,
            top_drawdowns: 5,
        }
    }
}

impl ReportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.year_days == 0 {
            return Err(Error::config("year_days must be positive"));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(Error::config("risk_free_rate must be finite"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.broker.commission, 2.0);
        assert_eq!(config.broker.slippage, 1.0);
        assert_eq!(config.execution.exercise_at, ExerciseAt::Close);
        assert_eq!(config.report.year_days, 245);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json_str(
            r#"{"broker": {"commission": 0.5}, "execution": {"exercise_at": "open"}}"#,
        )
        .unwrap();
        assert_eq!(config.broker.commission, 0.5);
        assert_eq!(config.broker.slippage, 1.0);
        assert_eq!(config.execution.exercise_at, ExerciseAt::Open);
        assert_eq!(config.report.risk_free_rate, 3.0);
    }

    #[test]
    fn test_negative_commission_rejected() {
        let err = Config::from_json_str(r#"{"broker": {"commission": -1.0}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_frictions_allowed() {
        let broker = BrokerConfig {
            commission: 0.0,
            slippage: 0.0,
        };
        assert!(broker.validate().is_ok());
    }

    #[test]
    fn test_malformed_json() {
        let err = Config::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
