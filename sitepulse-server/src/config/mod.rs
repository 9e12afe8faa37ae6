//! Configuration module for sitepulse-server.
//!
//! Handles loading configuration from the TOML file and CLI arguments,
//! and compiles the configured payload schemas into the validator.

pub mod file;

use crate::config::file::FileConfig;
use sitepulse_core::entities::EventKind;
use sitepulse_core::limiter::RatePolicy;
use sitepulse_core::validate::JsonSchemaValidator;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("failed to load schema {path}: {message}")]
    Schema { path: String, message: String },
}

/// Loaded configuration, ready to build the application state from.
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub trusted_origins: Vec<String>,
    pub csrf_key: Option<String>,
    pub rate_policy: RatePolicy,
    pub validator: JsonSchemaValidator,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// Reads the TOML file, applies CLI overrides, validates the result
    /// and compiles the configured payload schemas.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        self.validate(&file_config)?;
        let validator = build_validator(&file_config)?;

        Ok(LoadedConfig {
            listen: file_config.server.listen,
            trusted_origins: file_config.security.trusted_origins,
            csrf_key: file_config.security.csrf_key,
            rate_policy: RatePolicy {
                points: file_config.rate_limit.points,
                window: Duration::from_millis(file_config.rate_limit.window_ms),
            },
            validator,
        })
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        if config.security.trusted_origins.is_empty() {
            return Err(ConfigError::Validation(
                "at least one trusted origin is required".to_string(),
            ));
        }
        if config.security.trusted_origins[0].contains('*') {
            return Err(ConfigError::Validation(
                "the first trusted origin is the preflight default and must be exact".to_string(),
            ));
        }
        for origin in &config.security.trusted_origins {
            if !origin.starts_with("https://") && !origin.starts_with("http://") {
                return Err(ConfigError::Validation(format!(
                    "trusted origin must include a scheme: {origin}"
                )));
            }
        }
        if config.rate_limit.points == 0 {
            return Err(ConfigError::Validation(
                "rate_limit.points must be greater than zero".to_string(),
            ));
        }
        if config.rate_limit.window_ms == 0 {
            return Err(ConfigError::Validation(
                "rate_limit.window_ms must be greater than zero".to_string(),
            ));
        }
        for name in config.schemas.keys() {
            if parse_kind(name).is_none() {
                return Err(ConfigError::Validation(format!(
                    "unknown event kind in [schemas]: {name}"
                )));
            }
        }
        Ok(())
    }
}

fn parse_kind(name: &str) -> Option<EventKind> {
    match name {
        "performance" => Some(EventKind::Performance),
        "pageview" => Some(EventKind::Pageview),
        "utm" => Some(EventKind::Utm),
        "campaign" => Some(EventKind::Campaign),
        _ => None,
    }
}

fn build_validator(config: &FileConfig) -> Result<JsonSchemaValidator, ConfigError> {
    let mut validator = JsonSchemaValidator::new();
    for (name, path) in &config.schemas {
        // Unknown names were already rejected by validate().
        let Some(kind) = parse_kind(name) else {
            continue;
        };
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Schema {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let schema: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| ConfigError::Schema {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        validator = validator
            .with_schema(kind, schema)
            .map_err(|e| ConfigError::Schema {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
    }
    Ok(validator)
}
