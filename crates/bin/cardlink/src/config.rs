//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `cardlink.toml` in the working directory unless another path
//! is given. Every field has a sensible default so the file is optional.
//! Environment variables take precedence over file values.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use cardlink_adapter_ble::BleConfig;
use cardlink_app::protocol::EngineConfig;
use cardlink_app::services::card_service::CardLimits;
use cardlink_domain::amount::{AmountLimits, INITIALIZE_MINIMUM, MAX_AMOUNT};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// BLE transport settings.
    pub ble: BleConfig,
    /// Protocol engine settings.
    pub engine: EngineSection,
    /// Amount bounds checked before anything is sent.
    pub limits: LimitsConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Protocol engine configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Seconds to wait for a reply. `0` waits forever.
    pub command_timeout_secs: u64,
}

/// Amount limits.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub initialize_minimum: u32,
    pub recharge_minimum: u32,
    pub maximum: u32,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `path` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if
    /// the resulting configuration is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("CARDLINK_DEVICE_PREFIX") {
            self.ble.name_prefix = val;
        }
        if let Some(val) = var("CARDLINK_COMMAND_TIMEOUT_SECS")
            && let Ok(secs) = val.parse()
        {
            self.engine.command_timeout_secs = secs;
        }
        if let Some(val) = var("CARDLINK_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ble.name_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "ble.name_prefix must not be empty".to_string(),
            ));
        }
        let limits = &self.limits;
        if limits.maximum > MAX_AMOUNT {
            return Err(ConfigError::Validation(format!(
                "limits.maximum must not exceed {MAX_AMOUNT}"
            )));
        }
        for (name, minimum) in [
            ("initialize_minimum", limits.initialize_minimum),
            ("recharge_minimum", limits.recharge_minimum),
        ] {
            if minimum == 0 || minimum > limits.maximum {
                return Err(ConfigError::Validation(format!(
                    "limits.{name} must be between 1 and limits.maximum"
                )));
            }
        }
        Ok(())
    }

    /// Engine settings derived from `[engine]`.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let secs = self.engine.command_timeout_secs;
        EngineConfig {
            command_timeout: (secs > 0).then(|| Duration::from_secs(secs)),
        }
    }

    /// Card operation bounds derived from `[limits]`.
    #[must_use]
    pub fn card_limits(&self) -> CardLimits {
        CardLimits {
            initialize: AmountLimits {
                minimum: self.limits.initialize_minimum,
                maximum: self.limits.maximum,
            },
            recharge: AmountLimits {
                minimum: self.limits.recharge_minimum,
                maximum: self.limits.maximum,
            },
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            command_timeout_secs: 15,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            initialize_minimum: INITIALIZE_MINIMUM,
            recharge_minimum: 1,
            maximum: MAX_AMOUNT,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "cardlink=info,cardlink_app=info,cardlink_adapter_ble=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
