//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

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

/// Load and validate configuration. `.json` files are read as JSON, anything
/// else as TOML.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let config = if is_json {
        parse_json(&content)?
    } else {
        parse_toml(&content)?
    };

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

pub fn parse_json(content: &str) -> Result<GatewayConfig, ConfigError> {
    serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
}

pub fn parse_toml(content: &str) -> Result<GatewayConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", std::process::id(), name));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_json_by_extension() {
        let path = write_temp(
            "gateway.json",
            r#"{"http_port": 8181, "http_routes": [{"path": "/", "backends": [{"address": "127.0.0.1:1"}]}]}"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.http_port, 8181);
        assert_eq!(config.http_routes.len(), 1);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn rejects_invalid_document() {
        let path = write_temp(
            "invalid.toml",
            "[[http_routes]]\npath = \"/api\"\nbackends = []\n",
        );
        match load_config(&path) {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("expected validation error, got {:?}", other),
        }
        let _ = fs::remove_file(path);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/gateway.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
