//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let config = parse_config(
            r#"
            [routing]
            default_backend = "http://10.0.0.2:8080"
            content_token_header = "X-Report-Token"
            "#,
        )
        .unwrap();
        assert_eq!(config.routing.default_backend, "http://10.0.0.2:8080");
        assert_eq!(config.routing.content_token_header, "X-Report-Token");
    }

    #[test]
    fn test_parse_rejects_invalid() {
        let err = parse_config(
            r#"
            [routing]
            default_backend = "ftp://files"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref e) if e.len() == 1));
        assert!(err.to_string().contains("routing.default_backend"));
    }

    #[test]
    fn test_parse_rejects_narrow_catch_all() {
        let err = parse_config(
            r#"
            [routing]
            catch_all_path = "/reports/{**rest}"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref e) if e.len() == 1));
        assert!(err.to_string().contains("routing.catch_all_path"));
    }

    #[test]
    fn test_parse_rejects_wss_control_channel() {
        let err = parse_config(
            r#"
            [control_channel]
            url = "wss://orchestrator.internal/proxy-hub"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unsupported scheme 'wss'"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/session-proxy.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
