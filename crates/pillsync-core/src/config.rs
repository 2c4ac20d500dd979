//! Runtime configuration for synchronized collections.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Pill-count bands. A count at or below `low` is low stock, at or below
/// `critical` is critical stock.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StockThresholds {
    pub low: u32,
    pub critical: u32,
}

impl Default for StockThresholds {
    fn default() -> Self {
        Self {
            low: 10,
            critical: 5,
        }
    }
}

impl StockThresholds {
    pub fn is_low(&self, stock: u32) -> bool {
        stock <= self.low
    }

    pub fn is_critical(&self, stock: u32) -> bool {
        stock <= self.critical
    }

    /// The most severe band entered by moving from `before` down to `after`.
    pub fn crossed_into(&self, before: u32, after: u32) -> Option<crate::models::StockTier> {
        use crate::models::StockTier;

        if after >= before {
            None
        } else if self.is_critical(after) && !self.is_critical(before) {
            Some(StockTier::Critical)
        } else if self.is_low(after) && !self.is_low(before) {
            Some(StockTier::Low)
        } else {
            None
        }
    }
}

/// Compliance percentage bands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComplianceThresholds {
    pub excellent: f64,
    pub good: f64,
}

impl Default for ComplianceThresholds {
    fn default() -> Self {
        Self {
            excellent: 90.0,
            good: 70.0,
        }
    }
}

/// How a collection recovers a dropped change feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResubscribePolicy {
    pub max_attempts: u32,
    /// Delay before attempt `n` is `n * backoff_ms`
    pub backoff_ms: u64,
}

impl Default for ResubscribePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 200,
        }
    }
}

impl ResubscribePolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Whether local writes touch the mirror before the store confirms them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MutationStrategy {
    /// Apply locally first, roll back if the write fails
    #[default]
    Optimistic,
    /// Leave the mirror alone until the change feed echoes the write
    AwaitConfirmation,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    pub stock: StockThresholds,
    pub compliance: ComplianceThresholds,
    /// Buffered change events per table before slow subscribers lag
    pub feed_capacity: usize,
    pub resubscribe: ResubscribePolicy,
    /// Entries shown in the dashboard's recent activity list
    pub dashboard_recent_limit: usize,
    pub mutation_strategy: MutationStrategy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            stock: StockThresholds::default(),
            compliance: ComplianceThresholds::default(),
            feed_capacity: 256,
            resubscribe: ResubscribePolicy::default(),
            dashboard_recent_limit: 10,
            mutation_strategy: MutationStrategy::default(),
        }
    }
}

impl SyncConfig {
    /// Parse and validate a JSON document. Missing keys take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stock.critical > self.stock.low {
            return Err(ConfigError::Invalid(format!(
                "critical stock threshold {} exceeds low threshold {}",
                self.stock.critical, self.stock.low
            )));
        }
        if self.compliance.good > self.compliance.excellent {
            return Err(ConfigError::Invalid(
                "good compliance threshold exceeds excellent".into(),
            ));
        }
        if self.feed_capacity == 0 {
            return Err(ConfigError::Invalid("feed_capacity must be positive".into()));
        }
        Ok(())
    }
}
