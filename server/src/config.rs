//! Configuration management for the server.

use std::env;
use tether_engine::FieldPath;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Where each record keeps its primary key
    pub primary_key_field: FieldPath,
    /// Stamped with the server clock on every write
    pub timestamp_field: FieldPath,
    /// When set, pull responses nest the records at this path and add a `count`
    pub read_envelope: Option<FieldPath>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let primary_key_field = field(
            "PRIMARY_KEY_FIELD",
            &env::var("PRIMARY_KEY_FIELD").unwrap_or_else(|_| "id".to_string()),
        )?;
        let timestamp_field = field(
            "TIMESTAMP_FIELD",
            &env::var("TIMESTAMP_FIELD").unwrap_or_else(|_| "timestamp".to_string()),
        )?;
        let read_envelope = match env::var("READ_ENVELOPE_PATH") {
            Ok(path) if !path.trim().is_empty() => Some(field("READ_ENVELOPE_PATH", &path)?),
            _ => None,
        };

        Ok(Self {
            host,
            port,
            primary_key_field,
            timestamp_field,
            read_envelope,
        })
    }

    /// A loopback config on port 3000 with the given fields.
    pub fn new(primary_key_field: FieldPath, timestamp_field: FieldPath) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            primary_key_field,
            timestamp_field,
            read_envelope: None,
        }
    }

    /// Nest pull responses under `path`.
    pub fn with_read_envelope(mut self, path: FieldPath) -> Self {
        self.read_envelope = Some(path);
        self
    }
}

fn field(var: &'static str, raw: &str) -> Result<FieldPath, ConfigError> {
    FieldPath::parse(raw).map_err(|_| ConfigError::InvalidField {
        var,
        value: raw.to_string(),
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid {var} value: {value:?}")]
    InvalidField { var: &'static str, value: String },
}
