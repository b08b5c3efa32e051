//! Load generation configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Driver-side load configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Number of concurrent scenario workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Total benchmark duration
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_duration"
    )]
    pub duration: Duration,

    /// Seed for the randomness source; omit for a fresh seed per run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            duration: default_duration(),
            seed: None,
        }
    }
}

impl Validatable for LoadConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.workers, "workers", self.domain_name())?;
        validate_positive(self.duration.as_secs(), "duration", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "load"
    }
}

// Default value functions
fn default_workers() -> usize {
    20
}

fn default_duration() -> Duration {
    Duration::from_secs(60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_defaults() {
        let config = LoadConfig::default();
        assert_eq!(config.workers, 20);
        assert_eq!(config.duration, Duration::from_secs(60));
        assert!(config.seed.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_rejects_zero_workers() {
        let config = LoadConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
