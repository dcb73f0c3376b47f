//! Authorization engine configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [cache]
//! ttl = "5m"
//!
//! [rate_limits.bulk_operations]
//! max_requests = 10
//! window_minutes = 60
//!
//! [audit]
//! dispatch = "spawn"
//! log_authorized_access = true
//! ```
//!
//! Every key can be overridden from the environment with the `OPSDESK`
//! prefix and `__` as separator, e.g. `OPSDESK__CACHE__TTL=2m`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::rate_limit::{RateLimit, RateLimitProfile};

/// Root authorization configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// Permission cache configuration.
    pub cache: CacheConfig,

    /// Budgets of the five rate-limit profiles.
    pub rate_limits: RateLimitsConfig,

    /// Audit emission configuration.
    pub audit: AuditConfig,

    /// Default option values for `authorize` calls.
    pub decisions: DecisionDefaults,

    /// Diagnostic logging configuration.
    pub logging: LoggingConfig,
}

/// Permission cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a resolved context stays valid after it is written.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// Budgets of the rate-limit profiles.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitsConfig {
    /// Ordinary reads and writes.
    pub general: RateLimit,
    /// Security-sensitive operations (role changes, exports).
    pub sensitive: RateLimit,
    /// Bulk imports, mass sends, batch deletes.
    pub bulk_operations: RateLimit,
    /// File uploads.
    pub file_upload: RateLimit,
    /// Programmatic API access.
    pub api_calls: RateLimit,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            general: RateLimitProfile::General.default_limit(),
            sensitive: RateLimitProfile::Sensitive.default_limit(),
            bulk_operations: RateLimitProfile::BulkOperations.default_limit(),
            file_upload: RateLimitProfile::FileUpload.default_limit(),
            api_calls: RateLimitProfile::ApiCalls.default_limit(),
        }
    }
}

impl RateLimitsConfig {
    /// Returns the configured budget for `profile`.
    #[must_use]
    pub fn limit_for(&self, profile: RateLimitProfile) -> RateLimit {
        match profile {
            RateLimitProfile::General => self.general,
            RateLimitProfile::Sensitive => self.sensitive,
            RateLimitProfile::BulkOperations => self.bulk_operations,
            RateLimitProfile::FileUpload => self.file_upload,
            RateLimitProfile::ApiCalls => self.api_calls,
        }
    }
}

/// How audit events are handed to the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDispatch {
    /// Write on a background tokio task; the caller never waits.
    #[default]
    Spawn,
    /// Await the write before returning; failures are still swallowed.
    Inline,
}

/// Audit emission configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Master switch for audit emission.
    pub enabled: bool,

    /// How events are dispatched.
    pub dispatch: AuditDispatch,

    /// Record granted decisions.
    pub log_authorized_access: bool,

    /// Record denied decisions.
    pub log_unauthorized_attempts: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dispatch: AuditDispatch::Spawn,
            log_authorized_access: true,
            log_unauthorized_attempts: true,
        }
    }
}

/// Default values for per-call options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DecisionDefaults {
    /// Grant admin roles without rate or permission checks.
    pub bypass_for_admin: bool,

    /// Emit an audit event for each decision.
    pub log_attempt: bool,
}

impl Default for DecisionDefaults {
    fn default() -> Self {
        Self {
            bypass_for_admin: true,
            log_attempt: true,
        }
    }
}

/// Diagnostic logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive (e.g. "info", "opsdesk_authz=debug").
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// The configuration could not be read or parsed.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl AuthzConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The cache TTL is zero
    /// - Any rate-limit profile has a zero budget or zero window
    /// - The logging level is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "cache.ttl must be > 0".to_string(),
            ));
        }

        for profile in RateLimitProfile::ALL {
            let limit = self.rate_limits.limit_for(profile);
            if limit.max_requests == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "rate_limits.{}.max_requests must be > 0",
                    profile.as_str()
                )));
            }
            if limit.window_minutes == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "rate_limits.{}.window_minutes must be > 0",
                    profile.as_str()
                )));
            }
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "logging.level cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

pub mod loader {
    use super::{AuthzConfig, ConfigError};
    use ::config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "opsdesk.toml";

    /// Loads configuration from an optional TOML file plus `OPSDESK__*`
    /// environment overrides, then validates it.
    ///
    /// A missing default file is not an error: defaults apply. An explicit
    /// `path` must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the sources cannot be parsed or validation fails.
    pub fn load_config(path: Option<&str>) -> Result<AuthzConfig, ConfigError> {
        let mut builder = Config::builder();
        let file = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if file.exists() {
            builder = builder.add_source(File::from(file));
        } else if let Some(path) = path {
            return Err(ConfigError::Load(format!("config file not found: {path}")));
        }
        // Environment variable overrides, e.g., OPSDESK__CACHE__TTL=2m
        builder = builder.add_source(
            Environment::with_prefix("OPSDESK")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );
        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Load(format!("config build error: {e}")))?;
        let merged: AuthzConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("config deserialize error: {e}")))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AuthzConfig::default();
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert!(config.decisions.bypass_for_admin);
        assert!(config.decisions.log_attempt);
        assert_eq!(config.audit.dispatch, AuditDispatch::Spawn);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_rate_limits() {
        let limits = RateLimitsConfig::default();
        assert_eq!(limits.general.max_requests, 100);
        assert_eq!(limits.sensitive.max_requests, 20);
        assert_eq!(limits.bulk_operations.max_requests, 10);
        assert_eq!(limits.file_upload.max_requests, 50);
        assert_eq!(limits.api_calls.max_requests, 1000);
        for profile in RateLimitProfile::ALL {
            assert_eq!(limits.limit_for(profile).window_minutes, 60);
            assert!(limits.limit_for(profile).enabled);
        }
    }

    #[test]
    fn test_zero_ttl_fails_validation() {
        let mut config = AuthzConfig::default();
        config.cache.ttl = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache.ttl"));
    }

    #[test]
    fn test_zero_budget_fails_validation() {
        let mut config = AuthzConfig::default();
        config.rate_limits.bulk_operations.max_requests = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bulk_operations.max_requests"));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[cache]
ttl = "2m"

[rate_limits.sensitive]
max_requests = 5
window_minutes = 30

[audit]
dispatch = "inline"
log_authorized_access = false
"#
        )
        .unwrap();

        let config = loader::load_config(file.path().to_str()).unwrap();
        assert_eq!(config.cache.ttl, Duration::from_secs(120));
        assert_eq!(config.rate_limits.sensitive.max_requests, 5);
        assert_eq!(config.rate_limits.sensitive.window_minutes, 30);
        assert_eq!(config.rate_limits.general.max_requests, 100);
        assert_eq!(config.audit.dispatch, AuditDispatch::Inline);
        assert!(!config.audit.log_authorized_access);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = loader::load_config(Some("/nonexistent/opsdesk.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = AuthzConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AuthzConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.cache.ttl, config.cache.ttl);
        assert_eq!(parsed.rate_limits.api_calls, config.rate_limits.api_calls);
    }
}
