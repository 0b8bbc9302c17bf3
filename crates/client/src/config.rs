//! Configuration management for smbova.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/smbova/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::Export;
use crate::files::transfer::{DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE};
use crate::gallery::{DEFAULT_BUDGET_FRACTION, DEFAULT_MEMORY_BUDGET};
use crate::stream::DEFAULT_REOPEN_THRESHOLD;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("workers must be between 1 and 256, got {0}")]
    InvalidWorkers(usize),

    #[error("buffer_size must be between 1 and {max} bytes, got {0}", max = MAX_BUFFER_SIZE)]
    InvalidBufferSize(usize),

    #[error("budget_fraction must be greater than 0")]
    InvalidBudgetFraction,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("share {host}/{name} is exported more than once")]
    DuplicateShare { host: String, name: String },
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Maximum size of the blocking worker pool.
pub const MAX_WORKERS: usize = 256;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General client configuration.
    pub client: ClientConfig,

    /// Upload/download configuration.
    pub transfer: TransferConfig,

    /// Random access stream configuration.
    pub stream: StreamConfig,

    /// Image cache configuration.
    pub cache: CacheConfig,

    /// Credential applied at startup.
    pub auth: AuthConfig,

    /// Shares served from local mount points.
    pub shares: Vec<Export>,
}

/// General client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Maximum concurrent remote operations.
    pub workers: usize,
}

/// Upload/download configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransferConfig {
    /// Copy buffer size in bytes.
    pub buffer_size: usize,
}

/// Random access stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Forward seek distance served by discarding bytes instead of reopening.
    pub reopen_threshold: u64,
}

/// Image cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Memory budget the cache capacity is derived from, in bytes.
    pub memory_budget: u64,

    /// The cache gets `memory_budget / budget_fraction` bytes.
    pub budget_fraction: u64,
}

/// Credential applied at startup.
#[derive(Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Account name; blank for anonymous access.
    pub username: String,

    /// Password; blank for anonymous access.
    pub password: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            workers: 4,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reopen_threshold: DEFAULT_REOPEN_THRESHOLD,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_budget: DEFAULT_MEMORY_BUDGET,
            budget_fraction: DEFAULT_BUDGET_FRACTION,
        }
    }
}

impl CacheConfig {
    /// Cache capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.memory_budget / self.budget_fraction.max(1)
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smbova")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - SMBOVA_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - SMBOVA_USERNAME: Override the startup username
    /// - SMBOVA_PASSWORD: Override the startup password
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("SMBOVA_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!(log_level = %level, "Overriding log_level from environment");
                self.client.log_level = level;
            }
        }

        if let Ok(username) = std::env::var("SMBOVA_USERNAME") {
            if !username.is_empty() {
                tracing::info!(username = %username, "Overriding username from environment");
                self.auth.username = username;
            }
        }

        if let Ok(password) = std::env::var("SMBOVA_PASSWORD") {
            if !password.is_empty() {
                tracing::info!("Overriding password from environment");
                self.auth.password = password;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.workers < 1 || self.client.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkers(self.client.workers));
        }

        if self.transfer.buffer_size == 0 || self.transfer.buffer_size > MAX_BUFFER_SIZE {
            return Err(ConfigError::InvalidBufferSize(self.transfer.buffer_size));
        }

        if self.cache.budget_fraction == 0 {
            return Err(ConfigError::InvalidBudgetFraction);
        }

        let level = self.client.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.client.log_level.clone()));
        }

        for (i, share) in self.shares.iter().enumerate() {
            let duplicate = self.shares[..i].iter().any(|other| {
                other.host.eq_ignore_ascii_case(&share.host)
                    && other.name.eq_ignore_ascii_case(&share.name)
            });
            if duplicate {
                return Err(ConfigError::DuplicateShare {
                    host: share.host.clone(),
                    name: share.name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        std::env::remove_var("SMBOVA_LOG_LEVEL");
        std::env::remove_var("SMBOVA_USERNAME");
        std::env::remove_var("SMBOVA_PASSWORD");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.client.log_level, "info");
        assert_eq!(config.client.workers, 4);
        assert_eq!(config.transfer.buffer_size, 8192);
        assert_eq!(config.stream.reopen_threshold, 1024 * 1024);
        assert_eq!(config.cache.memory_budget, 256 * 1024 * 1024);
        assert_eq!(config.cache.budget_fraction, 8);
        assert_eq!(config.cache.capacity(), 32 * 1024 * 1024);
        assert!(config.auth.username.is_empty());
        assert!(config.shares.is_empty());
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[transfer]
buffer_size = 65536
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.transfer.buffer_size, 65536);
        assert_eq!(config.client.workers, 4);
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[client]
log_level = "debug"
workers = 8

[transfer]
buffer_size = 4096

[stream]
reopen_threshold = 65536

[cache]
memory_budget = 1073741824
budget_fraction = 4

[auth]
username = "alice"
password = "s3cret"

[[shares]]
host = "nas"
name = "public"
root = "/mnt/public"

[[shares]]
host = "nas"
name = "private"
root = "/mnt/private"
username = "alice"
password = "s3cret"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.client.log_level, "debug");
        assert_eq!(config.client.workers, 8);
        assert_eq!(config.transfer.buffer_size, 4096);
        assert_eq!(config.stream.reopen_threshold, 65536);
        assert_eq!(config.cache.capacity(), 256 * 1024 * 1024);
        assert_eq!(config.auth.username, "alice");
        assert_eq!(config.shares.len(), 2);
        assert_eq!(config.shares[0].root, PathBuf::from("/mnt/public"));
        assert!(config.shares[0].username.is_none());
        assert_eq!(config.shares[1].username.as_deref(), Some("alice"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[client\nworkers = 4");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid TOML configuration"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let result = Config::from_toml("[client]\nworkers = \"many\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_roundtrip() {
        let mut config = Config::default();
        config.client.workers = 2;
        config.shares.push(Export::new("nas", "media", "/srv/media"));
        let toml = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&toml).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/config.toml");
        let mut config = Config::default();
        config.transfer.buffer_size = 1024;
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "not = [valid").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("smbova/config.toml"));
    }

    #[test]
    fn test_auth_debug_redacts_password() {
        let auth = AuthConfig {
            username: "alice".to_string(),
            password: "s3cret".to_string(),
        };
        assert!(!format!("{auth:?}").contains("s3cret"));
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        clear_env();
        std::env::set_var("SMBOVA_LOG_LEVEL", "debug");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.client.log_level, "debug");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_credentials() {
        clear_env();
        std::env::set_var("SMBOVA_USERNAME", "bob");
        std::env::set_var("SMBOVA_PASSWORD", "hunter2");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.auth.username, "bob");
        assert_eq!(config.auth.password, "hunter2");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        clear_env();
        std::env::set_var("SMBOVA_LOG_LEVEL", "");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.client.log_level, "info");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        clear_env();
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_workers() {
        let mut config = Config::default();
        config.client.workers = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidWorkers(0)));
        config.client.workers = 257;
        assert_eq!(config.validate(), Err(ConfigError::InvalidWorkers(257)));
        config.client.workers = 256;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_buffer_size() {
        let mut config = Config::default();
        config.transfer.buffer_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidBufferSize(0)));
        config.transfer.buffer_size = MAX_BUFFER_SIZE + 1;
        assert!(config.validate().is_err());
        config.transfer.buffer_size = MAX_BUFFER_SIZE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_budget_fraction() {
        let mut config = Config::default();
        config.cache.budget_fraction = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidBudgetFraction));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.client.log_level = "WARN".to_string();
        assert!(config.validate().is_ok());
        config.client.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }

    #[test]
    fn test_validate_duplicate_share() {
        let mut config = Config::default();
        config.shares.push(Export::new("nas", "public", "/a"));
        config.shares.push(Export::new("NAS", "Public", "/b"));
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateShare {
                host: "NAS".to_string(),
                name: "Public".to_string()
            })
        );
    }
}
