//! Device-scope cache configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! refresh_rate = "1h"
//! refresh_delay = "5m"
//! cycle_timeout = "10m"
//! notification_capacity = 64
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default interval between full refresh cycles.
pub const DEFAULT_REFRESH_RATE: Duration = Duration::from_secs(3600);

/// Default maximum age of a record before `verify` may force a re-check.
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_secs(300);

/// Default capacity of the change notification channel.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 64;

/// Configuration for the device-scope cache and its refresh service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScopeCacheConfig {
    /// Period between full directory reconciliation cycles.
    #[serde(with = "humantime_serde")]
    pub refresh_rate: Duration,

    /// Maximum age of a cached record before a `verify` call that asks for
    /// fresh data re-checks it against the directory.
    #[serde(with = "humantime_serde")]
    pub refresh_delay: Duration,

    /// Upper bound on a single refresh cycle's listing.
    /// When unset a hung listing stalls that cycle until it returns.
    #[serde(default, with = "humantime_serde")]
    pub cycle_timeout: Option<Duration>,

    /// Number of change notifications buffered per subscriber.
    pub notification_capacity: usize,
}

impl Default for ScopeCacheConfig {
    fn default() -> Self {
        Self {
            refresh_rate: DEFAULT_REFRESH_RATE,
            refresh_delay: DEFAULT_REFRESH_DELAY,
            cycle_timeout: None,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// The configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// The configuration file could not be read.
    #[error("Failed to read configuration file {path}: {message}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying error.
        message: String,
    },
}

impl ScopeCacheConfig {
    /// Creates a configuration for testing with fast timings.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            refresh_rate: Duration::from_millis(50),
            refresh_delay: Duration::from_secs(120),
            cycle_timeout: None,
            notification_capacity: 16,
        }
    }

    #[must_use]
    pub fn with_refresh_rate(mut self, rate: Duration) -> Self {
        self.refresh_rate = rate;
        self
    }

    #[must_use]
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    #[must_use]
    pub fn with_cycle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.cycle_timeout = timeout;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - `refresh_rate` is zero
    /// - `cycle_timeout` is set to zero
    /// - `notification_capacity` is zero
    ///
    /// A zero `refresh_delay` is allowed and makes every record stale.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_rate.is_zero() {
            return Err(ConfigError::InvalidValue(
                "refresh_rate must be > 0".to_string(),
            ));
        }

        if self.cycle_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::InvalidValue(
                "cycle_timeout must be > 0 when set".to_string(),
            ));
        }

        if self.notification_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "notification_capacity must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or fails validation.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its contents are invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScopeCacheConfig::default();
        assert_eq!(config.refresh_rate, Duration::from_secs(3600));
        assert_eq!(config.refresh_delay, Duration::from_secs(300));
        assert!(config.cycle_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_for_testing_validates() {
        assert!(ScopeCacheConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_zero_refresh_rate_fails_validation() {
        let config = ScopeCacheConfig::default().with_refresh_rate(Duration::ZERO);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
        assert!(err.to_string().contains("refresh_rate"));
    }

    #[test]
    fn test_zero_cycle_timeout_fails_validation() {
        let config = ScopeCacheConfig::default().with_cycle_timeout(Some(Duration::ZERO));
        assert!(config.validate().unwrap_err().to_string().contains("cycle_timeout"));
    }

    #[test]
    fn test_zero_refresh_delay_is_valid() {
        let config = ScopeCacheConfig::default().with_refresh_delay(Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_fails_validation() {
        let mut config = ScopeCacheConfig::default();
        config.notification_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = ScopeCacheConfig::from_toml_str(
            r#"
            refresh_rate = "30m"
            refresh_delay = "2m"
            cycle_timeout = "10m"
            "#,
        )
        .unwrap();

        assert_eq!(config.refresh_rate, Duration::from_secs(1800));
        assert_eq!(config.refresh_delay, Duration::from_secs(120));
        assert_eq!(config.cycle_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.notification_capacity, DEFAULT_NOTIFICATION_CAPACITY);
    }

    #[test]
    fn test_from_toml_empty_uses_defaults() {
        assert_eq!(
            ScopeCacheConfig::from_toml_str("").unwrap(),
            ScopeCacheConfig::default()
        );
    }

    #[test]
    fn test_from_toml_rejects_bad_duration() {
        let err = ScopeCacheConfig::from_toml_str(r#"refresh_rate = "soon""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ScopeCacheConfig::load("/nonexistent/scope-cache.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
