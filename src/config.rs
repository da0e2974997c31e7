//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub pagination: PaginationConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Where uploaded media blobs live
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    R2,
}

/// Blob storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub local: LocalStorageConfig,
    #[serde(default)]
    pub r2: R2StorageConfig,
}

/// Local filesystem storage, served by the HTTP layer
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    /// Directory files are written to
    pub root: PathBuf,
    /// URL path prefix the directory is served under (e.g., "/uploads")
    pub public_path: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("uploads"),
            public_path: "/uploads".to_string(),
        }
    }
}

/// Cloudflare R2 media bucket
#[derive(Debug, Clone, Default, Deserialize)]
pub struct R2StorageConfig {
    #[serde(default)]
    pub bucket: String,
    /// Public URL base (Custom Domain), e.g. "https://media.example.com"
    #[serde(default)]
    pub public_url: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
}

/// Listing page sizes
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    pub default_size: u32,
    pub max_size: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_size: 20,
            max_size: 100,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, json)
    pub format: String,
}

impl LoggingConfig {
    const LEVELS: [&'static str; 5] = ["trace", "debug", "info", "warn", "error"];

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }

    /// Filter used when `RUST_LOG` is not set
    pub fn default_filter(&self) -> String {
        format!(
            "threadline={},tower_http=debug",
            self.level.to_ascii_lowercase()
        )
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (THREADLINE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.path", "data/threadline.db")?
            .set_default("storage.backend", "local")?
            .set_default("storage.local.root", "uploads")?
            .set_default("storage.local.public_path", "/uploads")?
            .set_default("pagination.default_size", 20)?
            .set_default("pagination.max_size", 100)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("THREADLINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        if self.pagination.default_size == 0 || self.pagination.max_size == 0 {
            return Err(AppError::Config(
                "pagination sizes must be greater than 0".to_string(),
            ));
        }
        if self.pagination.default_size > self.pagination.max_size {
            return Err(AppError::Config(format!(
                "pagination.default_size ({}) exceeds pagination.max_size ({})",
                self.pagination.default_size, self.pagination.max_size
            )));
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !LoggingConfig::LEVELS.contains(&level.as_str()) {
            return Err(AppError::Config(format!(
                "logging.level must be one of {}, got {:?}",
                LoggingConfig::LEVELS.join(", "),
                self.logging.level
            )));
        }
        if !self.logging.is_json() && !self.logging.format.eq_ignore_ascii_case("pretty") {
            return Err(AppError::Config(format!(
                "logging.format must be pretty or json, got {:?}",
                self.logging.format
            )));
        }

        match self.storage.backend {
            StorageBackend::Local => {
                if self.storage.local.root.as_os_str().is_empty() {
                    return Err(AppError::Config(
                        "storage.local.root must not be empty".to_string(),
                    ));
                }
                if !self.storage.local.public_path.starts_with('/') {
                    return Err(AppError::Config(
                        "storage.local.public_path must start with '/'".to_string(),
                    ));
                }
            }
            StorageBackend::R2 => {
                let r2 = &self.storage.r2;
                let missing = [
                    ("bucket", &r2.bucket),
                    ("public_url", &r2.public_url),
                    ("account_id", &r2.account_id),
                    ("access_key_id", &r2.access_key_id),
                    ("secret_access_key", &r2.secret_access_key),
                ]
                .into_iter()
                .find(|(_, value)| value.trim().is_empty());

                if let Some((field, _)) = missing {
                    return Err(AppError::Config(format!(
                        "storage.r2.{} is required when storage.backend=r2",
                        field
                    )));
                }
            }
        }

        Ok(())
    }
}
