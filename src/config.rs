//! Application configuration.
//!
//! Settings come from `config/config.toml` (optional) overlaid with
//! `STOCKROOM__SECTION__KEY` environment variables, e.g.
//! `STOCKROOM__DATABASE__URL` or `STOCKROOM__INVENTORY__DEFAULT_MIN_STOCK`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

pub use crate::pool::config::DatabaseConfig;

const CONFIG_FILE: &str = "config/config.toml";
const ENV_PREFIX: &str = "STOCKROOM";

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of `may` scheduler threads; 0 keeps the runtime default.
    #[serde(default)]
    pub workers: usize,
    /// Coroutine stack size in bytes; 0 keeps the runtime default.
    #[serde(default)]
    pub stack_size: usize,
    /// Prefix mounted in front of every route, e.g. `/api`.
    #[serde(default)]
    pub base_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: 0,
            stack_size: 0,
            base_path: String::new(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Which storage implementation serves requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Postgres,
    Memory,
}

/// Inventory business settings.
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryConfig {
    /// Minimum-stock threshold given to inventory rows created by a transfer or receipt.
    #[serde(default = "default_min_stock")]
    pub default_min_stock: i32,
    #[serde(default)]
    pub backend: BackendKind,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            default_min_stock: default_min_stock(),
            backend: BackendKind::default(),
        }
    }
}

fn default_min_stock() -> i32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Root configuration object.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from `config/config.toml`, falling back to environment variables only.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when no usable configuration can be assembled or
    /// the result fails [`AppConfig::validate`].
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    /// Same as [`AppConfig::load`] with an explicit file path.
    ///
    /// # Errors
    ///
    /// See [`AppConfig::load`].
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let builder = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                if path.exists() {
                    log::warn!(
                        "failed to load config file {}, falling back to env: {err}",
                        path.display()
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        let app: AppConfig = settings.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    /// Reject settings the service cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("server.port must be non-zero".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "database.max_connections must be at least 1".into(),
            ));
        }
        if self.inventory.default_min_stock < 0 {
            return Err(ConfigError::Message(
                "inventory.default_min_stock must not be negative".into(),
            ));
        }
        if !self.server.base_path.is_empty() && !self.server.base_path.starts_with('/') {
            return Err(ConfigError::Message(
                "server.base_path must start with '/'".into(),
            ));
        }
        if self.inventory.backend == BackendKind::Postgres {
            crate::connection::validate_connection_string(&self.database.url)
                .map_err(|e| ConfigError::Message(format!("database.url: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.inventory.default_min_stock, 10);
        assert_eq!(cfg.server.bind_address(), "0.0.0.0:8080");
        assert_eq!(cfg.inventory.backend, BackendKind::Postgres);
    }

    #[test]
    fn test_validate_rejects_negative_min_stock() {
        let mut cfg = AppConfig::default();
        cfg.inventory.default_min_stock = -1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_pool() {
        let mut cfg = AppConfig::default();
        cfg.database.max_connections = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_relative_base_path() {
        let mut cfg = AppConfig::default();
        cfg.server.base_path = "api".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_memory_backend_skips_url_check() {
        let mut cfg = AppConfig::default();
        cfg.database.url = String::new();
        assert!(cfg.validate().is_err());
        cfg.inventory.backend = BackendKind::Memory;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let cfg = AppConfig::load_from("does/not/exist.toml").expect("defaults load");
        assert_eq!(cfg.database.max_connections, 10);
        assert_eq!(cfg.database.lock_timeout_ms, 5_000);
    }
}
