//! Configuration management for drlab
//!
//! This module provides a centralized configuration system that supports:
//! - YAML configuration files
//! - Environment variable overrides
//! - Reasonable defaults
//! - Configuration validation

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure for drlab
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DrConfig {
    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub retry: RetryTuning,

    #[serde(default)]
    pub budget: StepBudget,

    #[serde(default)]
    pub store: StoreConfig,
}

impl DrConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. Config file specified by DRLAB_CONFIG env var
    /// 3. ./config/drlab.yaml
    /// 4. /etc/drlab/drlab.yaml
    /// 5. Hardcoded defaults (lowest priority)
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        builder = Self::set_defaults(builder)?;

        if let Ok(config_path) = std::env::var("DRLAB_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        builder = builder
            .add_source(File::with_name("./config/drlab").required(false))
            .add_source(File::with_name("/etc/drlab/drlab").required(false));

        // Override with environment variables
        // Example: DRLAB_RETRY__SECRET__MAX_ATTEMPTS=5
        builder = builder.add_source(
            Environment::with_prefix("DRLAB")
                .separator("__")
                .try_parsing(true),
        );

        let config: DrConfig = builder.build()?.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// Set default values for all configuration options
    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            // Probe
            .set_default("probe.timeout_ms", 5_000)?
            .set_default("probe.poll_interval_ms", 1_000)?
            .set_default("probe.failure_threshold", ProbeConfig::DEFAULT_FAILURE_THRESHOLD)?
            .set_default("probe.dns_interval_secs", 30)?
            .set_default("probe.dns_failure_threshold", 3)?
            // Retry: secret rotation
            .set_default("retry.secret.max_attempts", 3)?
            .set_default("retry.secret.initial_backoff_ms", 100)?
            .set_default("retry.secret.max_backoff_ms", 5_000)?
            .set_default("retry.secret.backoff_multiplier", 2.0)?
            // Retry: database recovery step
            .set_default("retry.recovery_attempts", 2)?
            // Step budgets (allocated from the RTO target)
            .set_default("budget.recover_secs", 900)?
            .set_default("budget.scale_secs", 300)?
            .set_default("budget.route_secs", 120)?
            .set_default("budget.checks_secs", 300)?
            .set_default("budget.overall_secs", 3_600)?
            // Execution store
            .set_default("store.data_dir", "./data/executions")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe.failure_threshold == 0 {
            return Err(ConfigError::Message(
                "probe.failure_threshold must be > 0".to_string(),
            ));
        }

        if self.probe.timeout_ms == 0 {
            return Err(ConfigError::Message(
                "probe.timeout_ms must be > 0".to_string(),
            ));
        }

        if self.retry.secret.max_attempts == 0 {
            return Err(ConfigError::Message(
                "retry.secret.max_attempts must be > 0".to_string(),
            ));
        }

        if self.retry.recovery_attempts == 0 {
            return Err(ConfigError::Message(
                "retry.recovery_attempts must be > 0".to_string(),
            ));
        }

        let step_total = self.budget.recover_secs
            + self.budget.scale_secs
            + self.budget.route_secs
            + self.budget.checks_secs;
        if step_total > self.budget.overall_secs {
            return Err(ConfigError::Message(format!(
                "per-step budgets ({step_total}s) exceed budget.overall_secs ({}s)",
                self.budget.overall_secs
            )));
        }

        if self.store.data_dir.is_empty() {
            return Err(ConfigError::Message(
                "store.data_dir must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from a specific file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: DrConfig = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;

        config.validate()?;

        Ok(config)
    }
}

/// Health probe configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    /// Per-probe request timeout in milliseconds
    pub timeout_ms: u64,

    /// Delay between probes when polling for consecutive failures
    pub poll_interval_ms: u64,

    /// Consecutive failed probes before the target counts as down
    pub failure_threshold: u32,

    /// DNS health-check request interval in seconds (informational cadence)
    pub dns_interval_secs: u64,

    /// DNS health-check failure threshold (informational cadence)
    pub dns_failure_threshold: u32,
}

impl ProbeConfig {
    /// The documented alerting threshold. The source material also uses 3
    /// for the DNS health-check cadence; that value lives in
    /// `dns_failure_threshold` so neither is hard-coded at call sites.
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 2;

    /// Per-probe timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            poll_interval_ms: 1_000,
            failure_threshold: Self::DEFAULT_FAILURE_THRESHOLD,
            dns_interval_secs: 30,
            dns_failure_threshold: 3,
        }
    }
}

/// Retry tuning for the orchestrator and drivers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryTuning {
    /// Retry/backoff settings for secret rotation
    #[serde(default)]
    pub secret: RetryConfig,

    /// Whole-step retry cap for database recovery
    pub recovery_attempts: u32,
}

impl Default for RetryTuning {
    fn default() -> Self {
        Self {
            secret: RetryConfig::default(),
            recovery_attempts: 2,
        }
    }
}

/// Retry configuration for operations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (first try included)
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,

    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Get initial backoff duration
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Get maximum backoff duration
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Calculate backoff delay for a given retry attempt
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_backoff_ms as f64
            * self.backoff_multiplier.powi(attempt as i32))
        .min(self.max_backoff_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }
}

/// Per-step timeout budgets, allocated from the overall RTO target.
///
/// Exceeding a step's budget is that step's failure, not a global abort.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StepBudget {
    /// Database recovery (promotion or restore) budget in seconds
    pub recover_secs: u64,

    /// Compute scale-up wait budget in seconds
    pub scale_secs: u64,

    /// Traffic switch budget in seconds
    pub route_secs: u64,

    /// Post-check budget in seconds
    pub checks_secs: u64,

    /// Overall execution budget in seconds
    pub overall_secs: u64,
}

impl Default for StepBudget {
    fn default() -> Self {
        Self {
            recover_secs: 900,
            scale_secs: 300,
            route_secs: 120,
            checks_secs: 300,
            overall_secs: 3_600,
        }
    }
}

impl StepBudget {
    /// Recovery budget as a Duration
    pub fn recover(&self) -> Duration {
        Duration::from_secs(self.recover_secs)
    }

    /// Scale budget as a Duration
    pub fn scale(&self) -> Duration {
        Duration::from_secs(self.scale_secs)
    }

    /// Routing budget as a Duration
    pub fn route(&self) -> Duration {
        Duration::from_secs(self.route_secs)
    }

    /// Post-check budget as a Duration
    pub fn checks(&self) -> Duration {
        Duration::from_secs(self.checks_secs)
    }
}

/// Execution store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Directory holding one JSON record per terminal execution
    pub data_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/executions".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let config = DrConfig::default();

        // Probe configuration
        assert_eq!(config.probe.timeout_ms, 5_000);
        assert_eq!(config.probe.failure_threshold, 2);
        assert_eq!(config.probe.dns_interval_secs, 30);
        assert_eq!(config.probe.dns_failure_threshold, 3);

        // Retry configuration
        assert_eq!(config.retry.secret.max_attempts, 3);
        assert_eq!(config.retry.recovery_attempts, 2);

        // Budget configuration
        assert_eq!(config.budget.recover_secs, 900);
        assert_eq!(config.budget.scale_secs, 300);
        assert_eq!(config.budget.route_secs, 120);
        assert_eq!(config.budget.checks_secs, 300);
        assert_eq!(config.budget.overall_secs, 3_600);
    }

    #[test]
    fn test_retry_config_backoff() {
        let retry = RetryConfig::default();

        // Initial backoff
        assert_eq!(retry.backoff_for_attempt(0).as_millis(), 100);

        // Exponential backoff
        assert_eq!(retry.backoff_for_attempt(1).as_millis(), 200);
        assert_eq!(retry.backoff_for_attempt(2).as_millis(), 400);

        // Max backoff cap
        let long_backoff = retry.backoff_for_attempt(10);
        assert!(long_backoff.as_millis() <= 5_000);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = DrConfig::default();

        // Invalid: failure_threshold = 0
        config.probe.failure_threshold = 0;
        assert!(config.validate().is_err());

        // Fix and validate again
        config.probe.failure_threshold = 2;
        assert!(config.validate().is_ok());

        // Invalid: step budgets exceed the overall budget
        config.budget.recover_secs = 10_000;
        assert!(config.validate().is_err());
    }
}
