//! Configuration module for the backtest orchestrator.
//!
//! Provides YAML configuration loading, validation, and environment
//! variable interpolation for the engine, scheduler, workspace and
//! observability settings.
//!
//! # Usage
//!
//! ```rust,ignore
//! use backtest_orchestrator::config::load_config;
//!
//! // Load from default path (orchestrator.yaml)
//! let config = load_config(None)?;
//!
//! // Load from custom path
//! let config = load_config(Some("custom/orchestrator.yaml"))?;
//!
//! println!("workers: {}", config.scheduler.max_workers);
//! ```

mod engine;
mod observability;
mod scheduler;
mod workspace;

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use engine::EngineSettings;
pub use observability::{LoggingConfig, MetricsSettings, ObservabilityConfig};
pub use scheduler::SchedulerConfig;
pub use workspace::{CleanupPolicy, WorkspaceConfig};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "orchestrator.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// External engine settings.
    #[serde(default)]
    pub engine: EngineSettings,
    /// Scheduler configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Per-task file workspace.
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "orchestrator.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or(DEFAULT_CONFIG_PATH);

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
pub fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |caps: &regex::Captures<'_>| {
        let default_value = caps.get(2).map_or("", |m| m.as_str());
        match std::env::var(&caps[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.engine.binary.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "engine.binary must not be empty".to_string(),
        ));
    }

    if config.engine.backtest_timeout_secs == 0 || config.engine.hyperopt_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "engine timeouts must be greater than 0".to_string(),
        ));
    }

    if config.scheduler.max_workers == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.max_workers must be greater than 0".to_string(),
        ));
    }

    if config.scheduler.max_tasks == Some(0) {
        return Err(ConfigError::ValidationError(
            "scheduler.max_tasks must be greater than 0 when set".to_string(),
        ));
    }

    let valid_formats = ["json", "pretty"];
    if !valid_formats.contains(&config.observability.logging.format.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "observability.logging.format must be one of: {valid_formats:?}"
        )));
    }

    if config.observability.metrics.enabled
        && config
            .observability
            .metrics
            .listen_addr
            .parse::<SocketAddr>()
            .is_err()
    {
        return Err(ConfigError::ValidationError(format!(
            "observability.metrics.listen_addr is not a socket address: {}",
            config.observability.metrics.listen_addr
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.engine.binary, "freqtrade");
        assert_eq!(config.engine.exchange, "binance");
        assert_eq!(config.engine.backtest_timeout_secs, 300);
        assert_eq!(config.scheduler.max_workers, 4);
        assert_eq!(config.scheduler.max_tasks, None);
        assert_eq!(config.workspace.cleanup, CleanupPolicy::Remove);
        assert!(!config.observability.metrics.enabled);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_load_minimal_config() {
        let yaml = r"
scheduler:
  max_workers: 2
";

        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should load minimal config: {e}"),
        };
        assert_eq!(config.scheduler.max_workers, 2);
        assert_eq!(config.engine.hyperopt_timeout_secs, 3600); // Default value
    }

    #[test]
    fn test_full_config_parse() {
        let yaml = r"
engine:
  binary: /bin/sh
  base_args: [fake_engine.sh]
  exchange: kraken
  stake_currency: EUR
  strategy_path: strategies
  backtest_timeout_secs: 10
  kill_grace_ms: 100
scheduler:
  max_workers: 8
  max_tasks: 1000
workspace:
  dir: /tmp/sweeps
  cleanup: keep
observability:
  logging:
    level: debug
    format: json
  metrics:
    enabled: true
    listen_addr: 127.0.0.1:9464
";
        let config = load_config_from_string(yaml).unwrap();
        assert_eq!(config.engine.base_args, vec!["fake_engine.sh".to_string()]);
        assert_eq!(config.engine.stake_currency, "EUR");
        assert_eq!(config.engine.kill_grace().as_millis(), 100);
        assert_eq!(config.scheduler.max_tasks, Some(1000));
        assert_eq!(config.workspace.cleanup, CleanupPolicy::Keep);
        assert_eq!(config.observability.logging.format, "json");
    }

    #[test]
    fn test_env_var_with_default_when_missing() {
        // Use a variable name unlikely to exist
        let input = "binary: ${ORCHESTRATOR_CONFIG_TEST_NONEXISTENT_VAR:-freqtrade}";
        assert_eq!(interpolate_env_vars(input), "binary: freqtrade");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)] // ${...} is env var syntax, not format args
    fn test_env_var_with_default_uses_existing() {
        // PATH should always exist
        let input = "path: ${PATH:-default}";
        let result = interpolate_env_vars(input);

        assert_ne!(result, "path: default");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn test_env_var_without_default_becomes_empty() {
        let input = "dir: ${ORCHESTRATOR_CONFIG_TEST_UNLIKELY_TO_EXIST}";
        assert_eq!(interpolate_env_vars(input), "dir: ");
    }

    #[test]
    fn test_validation_zero_workers() {
        let yaml = r"
scheduler:
  max_workers: 0
";
        let Err(err) = load_config_from_string(yaml) else {
            panic!("zero workers should fail validation");
        };
        assert!(err.to_string().contains("max_workers"));
    }

    #[test]
    fn test_validation_bad_log_format() {
        let yaml = r"
observability:
  logging:
    format: xml
";
        assert!(matches!(
            load_config_from_string(yaml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validation_bad_metrics_addr() {
        let yaml = r"
observability:
  metrics:
    enabled: true
    listen_addr: not-an-address
";
        assert!(load_config_from_string(yaml).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scheduler:\n  max_workers: 3").unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.scheduler.max_workers, 3);

        let Err(err) = load_config(Some("/definitely/not/here.yaml")) else {
            panic!("missing file should fail");
        };
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
