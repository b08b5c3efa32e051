//! Target service configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_url, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration of the service under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Base URL of the service under test
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Maximum time a write may stay invisible to subsequent reads before
    /// reconciliation treats the discrepancy as a failure
    #[serde(
        with = "crate::domains::utils::serde_duration_millis",
        default = "default_allowable_delay"
    )]
    pub allowable_delay: Duration,

    /// Timeout for the sales report endpoint (reports scan every reservation
    /// and are allowed to run much longer than regular calls)
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_report_timeout"
    )]
    pub report_timeout: Duration,

    /// Timeout for the administrator login that precedes a report fetch
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_report_login_timeout"
    )]
    pub report_login_timeout: Duration,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            allowable_delay: default_allowable_delay(),
            report_timeout: default_report_timeout(),
            report_login_timeout: default_report_login_timeout(),
        }
    }
}

impl Validatable for TargetConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_url(&self.base_url, "base_url", self.domain_name())?;
        validate_positive(
            self.allowable_delay.as_millis(),
            "allowable_delay",
            self.domain_name(),
        )?;
        validate_positive(
            self.report_timeout.as_secs(),
            "report_timeout",
            self.domain_name(),
        )?;
        validate_positive(
            self.report_login_timeout.as_secs(),
            "report_login_timeout",
            self.domain_name(),
        )?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "target"
    }
}

// Default value functions
fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_allowable_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_report_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_report_login_timeout() -> Duration {
    Duration::from_secs(30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_config_defaults() {
        let config = TargetConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.allowable_delay, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_target_config_rejects_bad_url() {
        let config = TargetConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
