//! Application configuration, loaded from YAML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable naming the YAML config file.
pub const CONFIG_PATH_ENV: &str = "INVENTORY_CONFIG";
/// Environment variable overriding `database_url`.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    /// PostgreSQL connection URL. Used only with the `postgres` feature.
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            store: StoreConfig::default(),
            database_url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub mailbox_size: usize,
    /// Longest wait for a product row lock, in milliseconds. `0` waits
    /// until the lock is granted, in every store.
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mailbox_size: 32,
            lock_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    pub fn lock_timeout(&self) -> Option<Duration> {
        (self.lock_timeout_ms > 0).then(|| Duration::from_millis(self.lock_timeout_ms))
    }
}

impl AppConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Reads the file named by `INVENTORY_CONFIG` when set, otherwise starts
    /// from defaults. `DATABASE_URL` overrides the configured URL.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            config.database_url = Some(url);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = AppConfig::from_yaml_str("store:\n  lock_timeout_ms: 250\n").unwrap();
        assert_eq!(config.store.lock_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.store.mailbox_size, 32);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.max_connections, 10);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn zero_lock_timeout_means_wait_until_granted() {
        let config = AppConfig::from_yaml_str("store:\n  lock_timeout_ms: 0\n").unwrap();
        assert_eq!(config.store.lock_timeout(), None);
    }

    #[test]
    fn parses_a_full_document() {
        let yaml = r#"
logging:
  level: debug
  json: true
store:
  mailbox_size: 128
  lock_timeout_ms: 1000
database_url: postgres://inventory@localhost/inventory
max_connections: 4
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.store.mailbox_size, 128);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://inventory@localhost/inventory")
        );
        assert_eq!(config.max_connections, 4);
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = AppConfig::from_yaml_str("store: [1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AppConfig::from_file("/nonexistent/inventory.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
