//! Configuration loading and environment variable handling

use crate::domains::GatecheckConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "GATECHECK".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<GatecheckConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: GatecheckConfig = serde_yaml::from_str(&content)?;

        // Apply environment variable overrides
        self.apply_env_overrides(&mut config)?;

        // Validate all domains
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<GatecheckConfig> {
        let mut config = GatecheckConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<GatecheckConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut GatecheckConfig) -> ConfigResult<()> {
        self.apply_target_overrides(&mut config.target)?;
        self.apply_http_overrides(&mut config.http)?;
        self.apply_load_overrides(&mut config.load)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    /// Apply target config overrides
    fn apply_target_overrides(
        &self,
        config: &mut crate::domains::target::TargetConfig,
    ) -> ConfigResult<()> {
        if let Ok(base_url) = self.get_env_var("TARGET_URL") {
            config.base_url = base_url;
        }

        if let Ok(delay) = self.get_env_var("ALLOWABLE_DELAY_MS") {
            let millis: u64 = delay
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid ALLOWABLE_DELAY_MS: {}", e)))?;
            config.allowable_delay = std::time::Duration::from_millis(millis);
        }

        if let Ok(timeout) = self.get_env_var("REPORT_TIMEOUT") {
            let seconds: u64 = timeout
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid REPORT_TIMEOUT: {}", e)))?;
            config.report_timeout = std::time::Duration::from_secs(seconds);
        }

        Ok(())
    }

    /// Apply HTTP config overrides
    fn apply_http_overrides(
        &self,
        config: &mut crate::domains::http::HttpConfig,
    ) -> ConfigResult<()> {
        if let Ok(timeout) = self.get_env_var("HTTP_TIMEOUT") {
            let seconds: u64 = timeout
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid HTTP_TIMEOUT: {}", e)))?;
            config.timeout = std::time::Duration::from_secs(seconds);
        }

        if let Ok(user_agent) = self.get_env_var("HTTP_USER_AGENT") {
            config.user_agent = user_agent;
        }

        if let Ok(verify_ssl) = self.get_env_var("HTTP_VERIFY_SSL") {
            config.verify_ssl = verify_ssl
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid HTTP_VERIFY_SSL: {}", e)))?;
        }

        Ok(())
    }

    /// Apply load config overrides
    fn apply_load_overrides(
        &self,
        config: &mut crate::domains::load::LoadConfig,
    ) -> ConfigResult<()> {
        if let Ok(workers) = self.get_env_var("WORKERS") {
            config.workers = workers
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid WORKERS: {}", e)))?;
        }

        if let Ok(duration) = self.get_env_var("DURATION") {
            let seconds: u64 = duration
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid DURATION: {}", e)))?;
            config.duration = std::time::Duration::from_secs(seconds);
        }

        if let Ok(seed) = self.get_env_var("SEED") {
            config.seed = Some(
                seed.parse()
                    .map_err(|e| ConfigError::EnvError(format!("Invalid SEED: {}", e)))?,
            );
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            use std::str::FromStr;
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            use std::str::FromStr;
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "target:\n  base_url: \"http://10.0.0.5:8080\"\nload:\n  workers: 4\n"
        )
        .unwrap();

        let config = ConfigLoader::new().from_file(file.path()).unwrap();
        assert_eq!(config.target.base_url, "http://10.0.0.5:8080");
        assert_eq!(config.load.workers, 4);
        // Untouched domains keep their defaults
        assert_eq!(config.http.user_agent, "Gatecheck/1.0");
    }

    #[test]
    fn test_env_override() {
        // Custom prefix keeps this test isolated from the real environment
        std::env::set_var("GCTEST_WORKERS", "7");
        std::env::set_var("GCTEST_TARGET_URL", "http://192.168.1.9:8080");

        let config = ConfigLoader::with_prefix("GCTEST").from_env().unwrap();
        assert_eq!(config.load.workers, 7);
        assert_eq!(config.target.base_url, "http://192.168.1.9:8080");

        std::env::remove_var("GCTEST_WORKERS");
        std::env::remove_var("GCTEST_TARGET_URL");
    }

    #[test]
    fn test_invalid_env_value() {
        std::env::set_var("GCBAD_WORKERS", "many");
        let result = ConfigLoader::with_prefix("GCBAD").from_env();
        assert!(result.is_err());
        std::env::remove_var("GCBAD_WORKERS");
    }
}
