//! Configuration loading and representation.
//!
//! Defaults live in code. A JSON file may replace any subset of them, and
//! `ARREARS_*` environment variables are applied last.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use arrears_campaigns::CampaignSettings;
use arrears_core::Currency;
use arrears_escalation::EscalationThresholds;
use arrears_observability::{LogFormat, LoggingOptions};
use arrears_prioritization::ScoringWeights;

pub const ENV_PREFIX: &str = "ARREARS_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Sweep worker pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Campaigns processed in parallel.
    pub max_concurrent: usize,
    /// Timeout applied to every async port call.
    pub io_timeout_ms: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            io_timeout_ms: 5_000,
        }
    }
}

impl SweepConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionsConfig {
    pub campaign: CampaignSettings,
    pub escalation: EscalationThresholds,
    pub scoring: ScoringWeights,
    pub sweep: SweepConfig,
    pub default_currency: String,
    pub logging: LoggingOptions,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            campaign: CampaignSettings::default(),
            escalation: EscalationThresholds::default(),
            scoring: ScoringWeights::default(),
            sweep: SweepConfig::default(),
            default_currency: "USD".to_string(),
            logging: LoggingOptions::default(),
        }
    }
}

impl CollectionsConfig {
    /// Defaults (or the given file), then process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env(std::env::vars())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `ARREARS_*` overrides from `vars`; unrelated keys are ignored.
    pub fn with_env<I>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "DAYS_BETWEEN_REMINDERS" => {
                    self.campaign.days_between_reminders = parse(&key, &value)?
                }
                "AUTO_ESCALATION_DAYS" => self.campaign.auto_escalation_days = parse(&key, &value)?,
                "MAX_RETRIES" => self.campaign.max_retries = parse(&key, &value)?,
                "PAUSE_ON_CUSTOMER_CONTACT" => {
                    self.campaign.pause_on_customer_contact = parse(&key, &value)?
                }
                "MAX_CONCURRENT" => self.sweep.max_concurrent = parse(&key, &value)?,
                "IO_TIMEOUT_MS" => self.sweep.io_timeout_ms = parse(&key, &value)?,
                "DEFAULT_CURRENCY" => self.default_currency = value,
                "LOG_FORMAT" => {
                    self.logging.format = match value.to_ascii_lowercase().as_str() {
                        "json" => LogFormat::Json,
                        "pretty" => LogFormat::Pretty,
                        _ => return Err(ConfigError::InvalidValue { key, value }),
                    }
                }
                "LOG" => self.logging.default_directive = value,
                _ => {}
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.campaign
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.sweep.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "sweep.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.sweep.io_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "sweep.io_timeout_ms must be at least 1".to_string(),
            ));
        }
        self.currency()?;
        Ok(())
    }

    pub fn currency(&self) -> Result<Currency, ConfigError> {
        Currency::new(&self.default_currency).map_err(|_| ConfigError::InvalidValue {
            key: "default_currency".to_string(),
            value: self.default_currency.clone(),
        })
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}
