//! Configuration for the purchase and entitlement pipeline.
//!
//! The execution environment is computed once by the host application and
//! injected here; nothing in this crate re-derives it from ambient globals.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::utils::get_env_with_prefix;

/// Where the process is running, as declared by the host application.
///
/// Controls mock-mode short-circuiting and whether initialization failures
/// degrade softly (production-like) or fail loudly (development).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionEnvironment {
    /// Untrusted/sandboxed execution host where the real store is never
    /// reachable. All store interactions are simulated.
    SandboxHost,
    /// Local development. Configuration problems surface immediately.
    Development,
    /// Production. Purchase capability degrades gracefully on failure.
    Production,
}

impl ExecutionEnvironment {
    /// Parse from a configuration string.
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s {
            "sandbox_host" | "sandbox" => Self::SandboxHost,
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    /// Convert to a configuration string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SandboxHost => "sandbox_host",
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl std::fmt::Display for ExecutionEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What to do when the receipt validator itself errors (as opposed to
/// rejecting a receipt).
///
/// `Allow` is an explicit interim policy for test deployments; the config
/// builder refuses it in production.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Treat a validator error as a rejection. The safe default.
    #[default]
    Deny,
    /// Treat a validator error as acceptance. Interim testing aid only.
    Allow,
}

impl FallbackPolicy {
    /// Convert to a configuration string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deny => "deny",
            Self::Allow => "allow",
        }
    }
}

/// Main configuration for the purchase pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseConfig {
    /// Execution environment, injected by the host at startup.
    #[serde(default = "default_environment")]
    pub execution_environment: ExecutionEnvironment,
    /// Bypass the real store entirely and simulate every interaction.
    #[serde(default)]
    pub mock_mode: bool,
    /// Bound on store connect and catalog calls, in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Maximum attempts for retryable operations.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Base delay between retry attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Ceiling on the backoff delay, in milliseconds.
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    /// How long a loaded product catalog is trusted, in milliseconds.
    #[serde(default = "default_catalog_cache_ttl_ms")]
    pub catalog_cache_ttl_ms: u64,
    /// How long a cached entitlement read is trusted, in milliseconds.
    #[serde(default = "default_status_cache_ttl_ms")]
    pub status_cache_ttl_ms: u64,
    /// Policy for receipt-validator errors.
    #[serde(default)]
    pub validation_fallback: FallbackPolicy,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for PurchaseConfig {
    fn default() -> Self {
        Self {
            execution_environment: default_environment(),
            mock_mode: false,
            connection_timeout_ms: default_connection_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            catalog_cache_ttl_ms: default_catalog_cache_ttl_ms(),
            status_cache_ttl_ms: default_status_cache_ttl_ms(),
            validation_fallback: FallbackPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_environment() -> ExecutionEnvironment {
    ExecutionEnvironment::Development
}

fn default_connection_timeout_ms() -> u64 {
    10_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    30_000
}

fn default_catalog_cache_ttl_ms() -> u64 {
    300_000
}

fn default_status_cache_ttl_ms() -> u64 {
    60_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl PurchaseConfig {
    /// Whether every store interaction should be simulated locally.
    #[must_use]
    pub fn use_mock_store(&self) -> bool {
        self.mock_mode || self.execution_environment == ExecutionEnvironment::SandboxHost
    }

    /// Whether failures should surface immediately rather than degrade.
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.execution_environment == ExecutionEnvironment::Development
    }

    /// Bound applied to connect and catalog calls.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Base delay between retry attempts.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Catalog cache TTL.
    #[must_use]
    pub fn catalog_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.catalog_cache_ttl_ms)
    }

    /// Status cache TTL.
    #[must_use]
    pub fn status_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.status_cache_ttl_ms)
    }
}

/// Builder for [`PurchaseConfig`] with environment variable support.
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: PurchaseConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: PurchaseConfig::default(),
        }
    }

    pub fn with_environment(mut self, environment: ExecutionEnvironment) -> Self {
        self.config.execution_environment = environment;
        self
    }

    pub fn with_mock_mode(mut self, enabled: bool) -> Self {
        self.config.mock_mode = enabled;
        self
    }

    pub fn with_connection_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connection_timeout_ms = ms;
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.retry_attempts = attempts;
        self
    }

    pub fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn with_max_retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.max_retry_delay_ms = ms;
        self
    }

    pub fn with_catalog_cache_ttl_ms(mut self, ms: u64) -> Self {
        self.config.catalog_cache_ttl_ms = ms;
        self
    }

    pub fn with_status_cache_ttl_ms(mut self, ms: u64) -> Self {
        self.config.status_cache_ttl_ms = ms;
        self
    }

    pub fn with_validation_fallback(mut self, policy: FallbackPolicy) -> Self {
        self.config.validation_fallback = policy;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    /// Load configuration from environment variables with TOLLGATE_ prefix.
    pub fn from_env(mut self) -> Self {
        if let Some(env) = get_env_with_prefix("EXECUTION_ENVIRONMENT") {
            self.config.execution_environment = ExecutionEnvironment::from_str(&env);
        }
        if let Some(mock) = get_env_with_prefix("MOCK_MODE") {
            self.config.mock_mode = mock.parse().unwrap_or(false);
        }
        if let Some(ms) = get_env_with_prefix("CONNECTION_TIMEOUT_MS") {
            if let Ok(v) = ms.parse() {
                self.config.connection_timeout_ms = v;
            }
        }
        if let Some(attempts) = get_env_with_prefix("RETRY_ATTEMPTS") {
            if let Ok(v) = attempts.parse() {
                self.config.retry_attempts = v;
            }
        }
        if let Some(ms) = get_env_with_prefix("RETRY_DELAY_MS") {
            if let Ok(v) = ms.parse() {
                self.config.retry_delay_ms = v;
            }
        }
        if let Some(ms) = get_env_with_prefix("CATALOG_CACHE_TTL_MS") {
            if let Ok(v) = ms.parse() {
                self.config.catalog_cache_ttl_ms = v;
            }
        }
        if let Some(ms) = get_env_with_prefix("STATUS_CACHE_TTL_MS") {
            if let Ok(v) = ms.parse() {
                self.config.status_cache_ttl_ms = v;
            }
        }
        if let Some(policy) = get_env_with_prefix("VALIDATION_FALLBACK") {
            if policy == "allow" {
                self.config.validation_fallback = FallbackPolicy::Allow;
            }
        }
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }
        self
    }

    /// Build the configuration, validating all settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` if any setting is out of range or if
    /// the permissive validation fallback is requested in production.
    pub fn build(self) -> crate::error::Result<PurchaseConfig> {
        if self.config.connection_timeout_ms == 0 {
            return Err(crate::error::TollgateError::ConfigurationInvalid(
                "Connection timeout must be greater than 0".to_string(),
            ));
        }

        if self.config.retry_attempts == 0 {
            return Err(crate::error::TollgateError::ConfigurationInvalid(
                "Retry attempts must be at least 1".to_string(),
            ));
        }

        if self.config.retry_delay_ms == 0 {
            return Err(crate::error::TollgateError::ConfigurationInvalid(
                "Retry delay must be greater than 0".to_string(),
            ));
        }

        if self.config.max_retry_delay_ms < self.config.retry_delay_ms {
            return Err(crate::error::TollgateError::ConfigurationInvalid(
                "Maximum retry delay must not be below the base delay".to_string(),
            ));
        }

        // The allow-on-error validation fallback masks genuine validation
        // failures indefinitely; it is only permitted outside production.
        if self.config.validation_fallback == FallbackPolicy::Allow
            && self.config.execution_environment == ExecutionEnvironment::Production
        {
            return Err(crate::error::TollgateError::ConfigurationInvalid(
                "Permissive validation fallback is not allowed in production".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging.level.to_lowercase().as_str()) {
            return Err(crate::error::TollgateError::ConfigurationInvalid(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
