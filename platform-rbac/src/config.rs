//! Engine configuration.
//!
//! Tunables for the decision cache and for catalog write retries. Values are
//! loaded from environment variables with defaults suitable for a single
//! process; [`EngineConfig::validate`] rejects settings the engine cannot run
//! with.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryConfig;

/// Longest accepted decision lifetime, in seconds.
pub const MAX_CACHE_TTL_SECS: u64 = 86_400;

/// Longest accepted first retry delay, in milliseconds.
pub const MAX_RETRY_DELAY_MS: u64 = 60_000;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Access-control engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Whether authorization decisions are cached.
    pub cache_enabled: bool,

    /// How long a cached decision stays valid, in seconds.
    pub cache_ttl_secs: u64,

    /// Maximum number of cached decisions.
    pub cache_capacity: usize,

    /// Attempts per declaration when catalog writes conflict.
    pub reconcile_max_attempts: u32,

    /// Delay before the first retried declaration write, in milliseconds.
    pub reconcile_retry_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl_secs: 30,
            cache_capacity: 10_000,
            reconcile_max_attempts: 3,
            reconcile_retry_delay_ms: 50,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `RBAC_DECISION_CACHE_ENABLED`: Cache authorization decisions (default: true)
    /// - `RBAC_DECISION_CACHE_TTL_SECS`: Decision lifetime in seconds (default: 30)
    /// - `RBAC_DECISION_CACHE_CAPACITY`: Maximum cached decisions (default: 10000)
    /// - `RBAC_RECONCILE_MAX_ATTEMPTS`: Attempts per conflicting declaration (default: 3)
    /// - `RBAC_RECONCILE_RETRY_DELAY_MS`: First retry delay in milliseconds (default: 50)
    ///
    /// Unparseable values fall back to the default; the result is validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let default = Self::default();

        let config = Self {
            cache_enabled: lookup("RBAC_DECISION_CACHE_ENABLED")
                .map(|s| s != "false" && s != "0")
                .unwrap_or(default.cache_enabled),
            cache_ttl_secs: lookup("RBAC_DECISION_CACHE_TTL_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.cache_ttl_secs),
            cache_capacity: lookup("RBAC_DECISION_CACHE_CAPACITY")
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.cache_capacity),
            reconcile_max_attempts: lookup("RBAC_RECONCILE_MAX_ATTEMPTS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.reconcile_max_attempts),
            reconcile_retry_delay_ms: lookup("RBAC_RECONCILE_RETRY_DELAY_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.reconcile_retry_delay_ms),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_enabled && self.cache_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RBAC_DECISION_CACHE_CAPACITY".to_string(),
                message: "must be greater than zero when the cache is enabled".to_string(),
            });
        }
        if self.cache_enabled && self.cache_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RBAC_DECISION_CACHE_TTL_SECS".to_string(),
                message: "must be greater than zero when the cache is enabled".to_string(),
            });
        }
        if self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(ConfigError::InvalidValue {
                key: "RBAC_DECISION_CACHE_TTL_SECS".to_string(),
                message: format!("must be at most {MAX_CACHE_TTL_SECS}"),
            });
        }
        if self.reconcile_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RBAC_RECONCILE_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.reconcile_retry_delay_ms > MAX_RETRY_DELAY_MS {
            return Err(ConfigError::InvalidValue {
                key: "RBAC_RECONCILE_RETRY_DELAY_MS".to_string(),
                message: format!("must be at most {MAX_RETRY_DELAY_MS}"),
            });
        }
        Ok(())
    }

    /// Get the decision lifetime as a Duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Retry policy for conflicting declaration writes.
    pub fn reconcile_retry(&self) -> RetryConfig {
        RetryConfig::new(
            self.reconcile_max_attempts,
            Duration::from_millis(self.reconcile_retry_delay_ms),
        )
    }
}
