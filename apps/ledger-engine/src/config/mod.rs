//! Configuration loading and validation.
//!
//! YAML configuration with serde defaults for every field, so a partial (or
//! absent) file yields a fully usable paper-trading setup.

mod account;
mod limits;
mod loops;
mod risk;

pub use account::AccountConfig;
pub use limits::ValidationLimits;
pub use loops::LoopsConfig;
pub use risk::RiskThresholds;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("config validation failed: {0}")]
    Validation(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Account sizing and fee model.
    #[serde(default)]
    pub account: AccountConfig,
    /// Pre-trade validation limits.
    #[serde(default)]
    pub validation: ValidationLimits,
    /// Risk monitor thresholds and kill-switch policy.
    #[serde(default)]
    pub risk: RiskThresholds,
    /// Background loop cadences and gateway concurrency.
    #[serde(default)]
    pub loops: LoopsConfig,
}

impl Config {
    /// Sanity-check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` for nonsensical values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.account.starting_equity <= rust_decimal::Decimal::ZERO {
            return Err(ConfigError::Validation(
                "account.starting_equity must be positive".to_string(),
            ));
        }
        if self.validation.min_quantity > self.validation.max_quantity {
            return Err(ConfigError::Validation(
                "validation.min_quantity exceeds max_quantity".to_string(),
            ));
        }
        if self.loops.submit_concurrency == 0 {
            return Err(ConfigError::Validation(
                "loops.submit_concurrency must be at least 1".to_string(),
            ));
        }
        if self.risk.kill_switch_confirmation.trim().is_empty() {
            return Err(ConfigError::Validation(
                "risk.kill_switch_confirmation must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from a YAML file, or defaults when `path` is `None`.
///
/// # Errors
///
/// Returns an error when the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(path) if Path::new(path).exists() => {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_string(),
                source,
            })?;
            serde_yaml_bw::from_str(&raw)?
        }
        _ => Config::default(),
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Some("/nonexistent/config.yaml")).unwrap();
        assert_eq!(config.loops.order_monitor_interval_ms, 1000);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "account:\n  starting_equity: \"500000\"\n";
        let config: Config = serde_yaml_bw::from_str(yaml).unwrap();
        assert_eq!(config.account.starting_equity, dec!(500000));
        assert_eq!(config.validation.max_open_positions, 10);
    }

    #[test]
    fn invalid_equity_rejected() {
        let mut config = Config::default();
        config.account.starting_equity = Decimal::ZERO;
        assert!(config.validate().is_err());
    }
}
