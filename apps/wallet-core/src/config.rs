//! Configuration for the wallet core.
//!
//! The core has no file or network I/O of its own; hosts deserialize a
//! [`WalletCoreConfig`] from their configuration source (JSON string,
//! embedded defaults) and hand it to the engine factory.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration payload did not parse.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// The configuration parsed but holds unusable values.
    #[error("config validation failed: {0}")]
    Validation(String),
}

/// Tunables for the wallet core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletCoreConfig {
    /// Seconds a custodial withdrawal fee quote stays fresh.
    #[serde(default = "default_fee_quote_ttl_secs")]
    pub fee_quote_ttl_secs: u64,
    /// Seconds an on-chain gas quote stays fresh.
    #[serde(default = "default_gas_quote_ttl_secs")]
    pub gas_quote_ttl_secs: u64,
    /// Seconds resolved limits stay fresh when cached by a host.
    #[serde(default = "default_limits_ttl_secs")]
    pub limits_ttl_secs: u64,
}

const fn default_fee_quote_ttl_secs() -> u64 {
    20
}

const fn default_gas_quote_ttl_secs() -> u64 {
    20
}

const fn default_limits_ttl_secs() -> u64 {
    60
}

impl Default for WalletCoreConfig {
    fn default() -> Self {
        Self {
            fee_quote_ttl_secs: default_fee_quote_ttl_secs(),
            gas_quote_ttl_secs: default_gas_quote_ttl_secs(),
            limits_ttl_secs: default_limits_ttl_secs(),
        }
    }
}

impl WalletCoreConfig {
    /// Validate the parsed values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when any window is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fee_quote_ttl_secs == 0 || self.gas_quote_ttl_secs == 0 || self.limits_ttl_secs == 0
        {
            return Err(ConfigError::Validation(
                "staleness windows must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Fee quote staleness window.
    #[must_use]
    pub const fn fee_quote_ttl(&self) -> Duration {
        Duration::from_secs(self.fee_quote_ttl_secs)
    }

    /// Gas quote staleness window.
    #[must_use]
    pub const fn gas_quote_ttl(&self) -> Duration {
        Duration::from_secs(self.gas_quote_ttl_secs)
    }

    /// Limits staleness window.
    #[must_use]
    pub const fn limits_ttl(&self) -> Duration {
        Duration::from_secs(self.limits_ttl_secs)
    }
}

/// Parse and validate a configuration from a JSON string.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] on malformed JSON and
/// [`ConfigError::Validation`] on unusable values.
pub fn load_config_from_str(json: &str) -> Result<WalletCoreConfig, ConfigError> {
    let config: WalletCoreConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = WalletCoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fee_quote_ttl(), Duration::from_secs(20));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = load_config_from_str(r#"{"fee_quote_ttl_secs": 5}"#).unwrap();
        assert_eq!(config.fee_quote_ttl_secs, 5);
        assert_eq!(config.gas_quote_ttl_secs, 20);
    }

    #[test]
    fn zero_window_fails_validation() {
        let result = load_config_from_str(r#"{"limits_ttl_secs": 0}"#);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn malformed_json_fails_parse() {
        let result = load_config_from_str("{not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
