//! Configuration management for visitorlog.
//!
//! Configuration is loaded with figment from defaults, an optional TOML file
//! and `VISITORLOG_` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "visitorlog";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "visitors.db";

/// Default storage key of the local fallback cache.
pub const DEFAULT_CACHE_KEY: &str = "codex-visitor-log-v1";

/// Default record cap, shared by the server store and the local cache.
pub const DEFAULT_MAX_RECORDS: usize = 400;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `VISITORLOG_`, `__` between nested keys)
/// 2. TOML config file at `~/.config/visitorlog/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// HTTP API server configuration.
    pub server: ServerConfig,
    /// Remote API client configuration.
    pub client: ClientConfig,
    /// Recorder configuration.
    pub recorder: RecorderConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the server-side database file.
    /// Defaults to `~/.local/share/visitorlog/visitors.db`
    pub database_path: Option<PathBuf>,
    /// Maximum number of records retained by any store.
    pub max_records: usize,
    /// Directory holding the local fallback cache.
    /// Defaults to `~/.local/share/visitorlog/cache`
    pub cache_dir: Option<PathBuf>,
    /// Key of the local fallback cache entry.
    pub cache_key: String,
}

/// HTTP API server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Upper bound for the `limit` query parameter.
    pub max_list_limit: usize,
    /// Largest accepted POST body.
    pub max_body_bytes: usize,
    /// Optional directory served for non-API paths.
    pub static_dir: Option<PathBuf>,
}

/// Remote API client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Origin of the visitor API, e.g. `http://127.0.0.1:8080`.
    ///
    /// When unset the remote backend is unavailable and every operation uses
    /// the local cache.
    pub base_url: Option<String>,
    /// Path segment marking a sub-path deployment of the site.
    pub site_marker: String,
    /// Timeout for list/append/clear requests in milliseconds.
    pub request_timeout_ms: u64,
}

/// Recorder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Public IP lookup service.
    pub ip_lookup_url: String,
    /// Geo-IP lookup service.
    pub geo_lookup_url: String,
    /// Timeout for each lookup in milliseconds.
    pub lookup_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_records: DEFAULT_MAX_RECORDS,
            cache_dir: None,
            cache_key: DEFAULT_CACHE_KEY.to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_list_limit: 5000,
            max_body_bytes: 128_000,
            static_dir: None,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            site_marker: "codex".to_string(),
            request_timeout_ms: 4500,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            ip_lookup_url: "https://api.ipify.org?format=json".to_string(),
            geo_lookup_url: "https://ipapi.co/json/".to_string(),
            lookup_timeout_ms: 4500,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("VISITORLOG_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.storage.max_records == 0 {
            return Err(invalid("max_records must be greater than 0"));
        }
        if self.storage.cache_key.trim().is_empty() {
            return Err(invalid("cache_key must not be empty"));
        }
        let key = &self.storage.cache_key;
        if key.contains(['/', '\\']) || key.contains("..") {
            return Err(invalid(format!(
                "cache_key must be a plain file name, got {key}"
            )));
        }
        if self.server.max_list_limit == 0 {
            return Err(invalid("max_list_limit must be greater than 0"));
        }
        if self.server.max_body_bytes == 0 {
            return Err(invalid("max_body_bytes must be greater than 0"));
        }
        if self.client.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms must be greater than 0"));
        }
        if self.recorder.lookup_timeout_ms == 0 {
            return Err(invalid("lookup_timeout_ms must be greater than 0"));
        }
        if self.recorder.ip_lookup_url.trim().is_empty()
            || self.recorder.geo_lookup_url.trim().is_empty()
        {
            return Err(invalid("lookup URLs must not be empty"));
        }
        if let Some(base_url) = &self.client.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(invalid(format!(
                    "base_url must be an http(s) origin, got {base_url}"
                )));
            }
        }
        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the local cache directory, resolving defaults if not set.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.storage
            .cache_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("cache"))
    }

    /// Address the server binds to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Timeout for remote API requests.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.client.request_timeout_ms)
    }

    /// Timeout for each IP/geo lookup.
    #[must_use]
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.recorder.lookup_timeout_ms)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
