//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ResilienceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML or JSON file.
///
/// The format follows the extension: `.json` is JSON, anything else TOML.
pub fn load_config(path: &Path) -> Result<ResilienceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let config = if is_json {
        parse_json(&content)?
    } else {
        parse_toml(&content)?
    };

    tracing::info!(
        path = %path.display(),
        retry_enabled = config.retry.enabled,
        rate_limit_enabled = config.rate_limit.enabled,
        "Configuration loaded"
    );
    Ok(config)
}

/// Parse and validate TOML text.
pub fn parse_toml(content: &str) -> Result<ResilienceConfig, ConfigError> {
    let config: ResilienceConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Parse and validate JSON text.
pub fn parse_json(content: &str) -> Result<ResilienceConfig, ConfigError> {
    let config: ResilienceConfig = serde_json::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::Strategy;
    use std::path::PathBuf;

    fn write_temp(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", uuid::Uuid::new_v4(), name));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_toml_file() {
        let path = write_temp(
            "client.toml",
            r#"
[retry]
max_attempts = 2
backoff = "fixed"
base_delay_ms = 250

[rate_limit]
enabled = true
strategy = "leaky_bucket"
permits_per_second = 50
"#,
        );
        let config = load_config(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.retry.max_attempts, 2);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.strategy, Strategy::LeakyBucket);
    }

    #[test]
    fn test_load_json_file() {
        let path = write_temp(
            "client.json",
            r#"{"rate_limit": {"strategy": "fixed_window", "permits_per_second": 5}}"#,
        );
        let config = load_config(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.rate_limit.strategy, Strategy::FixedWindow);
        assert_eq!(config.rate_limit.permits_per_second, 5);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/client.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_unknown_strategy_is_parse_error() {
        let err = parse_toml("[rate_limit]\nstrategy = \"gcra\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_semantic_errors_are_reported_together() {
        let toml = concat!(
            "[retry]\njitter_factor = 2.0\nretry_methods = [\"POST\"]\n",
            "[rate_limit]\npermits_per_second = 0\n",
        );
        let err = parse_toml(toml).unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
    }
}
