//! Configuration management for streamhub
//!
//! Configuration is assembled from several sources. Precedence (highest to
//! lowest):
//! 1. Command-line arguments (applied by the CLI layer)
//! 2. `STREAMHUB_*` environment variables
//! 3. Configuration file (`~/.streamhub/config.toml` or `--config FILE`)
//! 4. Default values
//!
//! Every section and field is optional in the file; anything missing takes
//! its default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::catalog::{DEFAULT_CONTENTS_COLLECTION, DEFAULT_USERS_COLLECTION};
use crate::error::{ConfigError, Result};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "STREAMHUB_";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub catalog: CatalogConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// MongoDB connection URI
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Database holding the catalog collections
    #[serde(default = "default_database")]
    pub database: String,

    /// Connect timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Server selection timeout in seconds
    #[serde(default = "default_server_selection_timeout")]
    pub server_selection_timeout: u64,

    /// Attempts for the initial connection only; operations are never retried
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,

    #[serde(default = "default_min_pool_size")]
    pub min_pool_size: u32,

    /// Connection idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,

    /// Application name reported to the server
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

/// Collection names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_users_collection")]
    pub users_collection: String,

    #[serde(default = "default_contents_collection")]
    pub contents_collection: String,
}

/// Display and output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Output format (json, json-pretty, table)
    #[serde(default = "default_format")]
    pub format: OutputFormat,

    /// Enable colored output
    #[serde(default = "default_color_output")]
    pub color_output: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Single-line JSON, one value per result
    Json,

    /// Indented JSON
    JsonPretty,

    /// ASCII table, one row per result
    Table,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "streamhub".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_server_selection_timeout() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_max_pool_size() -> u32 {
    10
}

fn default_min_pool_size() -> u32 {
    0
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_app_name() -> String {
    "streamhub".to_string()
}

fn default_users_collection() -> String {
    DEFAULT_USERS_COLLECTION.to_string()
}

fn default_contents_collection() -> String {
    DEFAULT_CONTENTS_COLLECTION.to_string()
}

fn default_format() -> OutputFormat {
    OutputFormat::Table
}

fn default_color_output() -> bool {
    true
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    false
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: default_database(),
            timeout: default_timeout(),
            server_selection_timeout: default_server_selection_timeout(),
            retry_attempts: default_retry_attempts(),
            max_pool_size: default_max_pool_size(),
            min_pool_size: default_min_pool_size(),
            idle_timeout: default_idle_timeout(),
            app_name: default_app_name(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            users_collection: default_users_collection(),
            contents_collection: default_contents_collection(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            color_output: default_color_output(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load file and environment layers
    ///
    /// An explicit `path` must exist. Without one, the default path is used
    /// when present and defaults otherwise. CLI overrides are applied by the
    /// caller afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env_vars()?;
        Ok(config)
    }

    /// Defaults overlaid with `STREAMHUB_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_vars()?;
        Ok(config)
    }

    /// Overlay `STREAMHUB_*` variables from the process environment
    pub fn apply_env_vars(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay variables resolved through `lookup`
    ///
    /// Recognized keys (after the `STREAMHUB_` prefix): `URI`, `DATABASE`,
    /// `TIMEOUT`, `SERVER_SELECTION_TIMEOUT`, `MAX_POOL_SIZE`,
    /// `MIN_POOL_SIZE`, `USERS_COLLECTION`, `CONTENTS_COLLECTION`, `FORMAT`,
    /// `NO_COLOR`, `LOG_LEVEL`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(uri) = var("URI") {
            self.connection.uri = uri;
        }
        if let Some(database) = var("DATABASE") {
            self.connection.database = database;
        }
        if let Some(value) = var("TIMEOUT") {
            self.connection.timeout = parse_env("TIMEOUT", &value)?;
        }
        if let Some(value) = var("SERVER_SELECTION_TIMEOUT") {
            self.connection.server_selection_timeout =
                parse_env("SERVER_SELECTION_TIMEOUT", &value)?;
        }
        if let Some(value) = var("MAX_POOL_SIZE") {
            self.connection.max_pool_size = parse_env("MAX_POOL_SIZE", &value)?;
        }
        if let Some(value) = var("MIN_POOL_SIZE") {
            self.connection.min_pool_size = parse_env("MIN_POOL_SIZE", &value)?;
        }
        if let Some(name) = var("USERS_COLLECTION") {
            self.catalog.users_collection = name;
        }
        if let Some(name) = var("CONTENTS_COLLECTION") {
            self.catalog.contents_collection = name;
        }
        if let Some(value) = var("FORMAT") {
            self.display.format = value.parse()?;
        }
        if var("NO_COLOR").is_some() {
            self.display.color_output = false;
        }
        if let Some(value) = var("LOG_LEVEL") {
            self.logging.level = value.parse()?;
        }
        Ok(())
    }

    /// `~/.streamhub/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".streamhub")
            .join("config.toml")
    }

    /// Save configuration to a file, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    pub fn validate(&self) -> Result<()> {
        self.connection.validate_uri()?;

        let required = [
            ("connection.database", &self.connection.database),
            ("catalog.users_collection", &self.catalog.users_collection),
            (
                "catalog.contents_collection",
                &self.catalog.contents_collection,
            ),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(invalid(field, value));
            }
        }

        let timeouts = [
            ("connection.timeout", self.connection.timeout),
            (
                "connection.server_selection_timeout",
                self.connection.server_selection_timeout,
            ),
        ];
        for (field, value) in timeouts {
            if value == 0 {
                return Err(invalid(field, value));
            }
        }

        if self.connection.max_pool_size == 0 {
            return Err(invalid(
                "connection.max_pool_size",
                self.connection.max_pool_size,
            ));
        }
        if self.connection.min_pool_size > self.connection.max_pool_size {
            return Err(ConfigError::Generic(format!(
                "connection.min_pool_size ({}) exceeds connection.max_pool_size ({})",
                self.connection.min_pool_size, self.connection.max_pool_size
            ))
            .into());
        }
        Ok(())
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.timeout)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.idle_timeout)
    }
}

fn invalid(field: &str, value: impl fmt::Display) -> crate::error::CatalogError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ConfigError::InvalidValue {
            field: format!("{ENV_PREFIX}{name}"),
            value: value.to_string(),
        }
        .into()
    })
}

impl ConnectionConfig {
    /// Check the URI is non-empty and uses a MongoDB scheme
    pub fn validate_uri(&self) -> Result<()> {
        let uri = self.uri.trim();
        if uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://") {
            let rest = uri.split_once("://").map_or("", |(_, rest)| rest);
            if !rest.is_empty() {
                return Ok(());
            }
        }
        Err(invalid("connection.uri", &self.uri))
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::JsonPretty)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Json => "json",
            OutputFormat::JsonPretty => "json-pretty",
            OutputFormat::Table => "table",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "json-pretty" | "jsonpretty" | "pretty" => Ok(OutputFormat::JsonPretty),
            "table" => Ok(OutputFormat::Table),
            _ => Err(ConfigError::InvalidValue {
                field: "display.format".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.uri, "mongodb://localhost:27017");
        assert_eq!(config.connection.database, "streamhub");
        assert_eq!(config.catalog.users_collection, "usuarios");
        assert_eq!(config.catalog.contents_collection, "contenidos");
        assert_eq!(config.display.format, OutputFormat::Table);
        assert!(config.display.color_output);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_partial_toml_takes_defaults() {
        let config = Config::from_toml(
            r#"
            [connection]
            database = "catalog_test"

            [display]
            format = "json-pretty"
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.database, "catalog_test");
        assert_eq!(config.connection.uri, "mongodb://localhost:27017");
        assert_eq!(config.display.format, OutputFormat::JsonPretty);
        assert_eq!(config.catalog, CatalogConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml("[connection\nuri = 1").unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Config(ConfigError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.connection.database = "saved".to_string();
        config.logging.level = LogLevel::Debug;
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let err = Config::load(Some(missing.as_path())).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Config(ConfigError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_with(env(&[
                ("STREAMHUB_URI", "mongodb://db.internal:27017"),
                ("STREAMHUB_DATABASE", "prod"),
                ("STREAMHUB_TIMEOUT", "5"),
                ("STREAMHUB_CONTENTS_COLLECTION", "titles"),
                ("STREAMHUB_FORMAT", "json"),
                ("STREAMHUB_NO_COLOR", "1"),
                ("STREAMHUB_LOG_LEVEL", "info"),
            ]))
            .unwrap();

        assert_eq!(config.connection.uri, "mongodb://db.internal:27017");
        assert_eq!(config.connection.database, "prod");
        assert_eq!(config.connection.timeout, 5);
        assert_eq!(config.catalog.contents_collection, "titles");
        assert_eq!(config.catalog.users_collection, "usuarios");
        assert_eq!(config.display.format, OutputFormat::Json);
        assert!(!config.display.color_output);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_env_bad_number() {
        let mut config = Config::default();
        let err = config
            .apply_env_with(env(&[("STREAMHUB_MAX_POOL_SIZE", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("STREAMHUB_MAX_POOL_SIZE"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.connection.uri = "postgres://localhost".to_string();
        assert_err!(config.validate());

        let mut config = Config::default();
        config.connection.uri = "mongodb://".to_string();
        assert_err!(config.validate());

        let mut config = Config::default();
        config.catalog.users_collection = " ".to_string();
        assert_err!(config.validate());

        let mut config = Config::default();
        config.connection.server_selection_timeout = 0;
        assert_err!(config.validate());

        let mut config = Config::default();
        config.connection.min_pool_size = 20;
        assert_err!(config.validate());

        let mut config = Config::default();
        config.connection.uri = "mongodb+srv://cluster0.example.net".to_string();
        assert_ok!(config.validate());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "json-pretty".parse::<OutputFormat>().unwrap(),
            OutputFormat::JsonPretty
        );
        assert!("yaml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::JsonPretty.to_string(), "json-pretty");
        assert!(OutputFormat::Json.is_json());
        assert!(!OutputFormat::Table.is_json());
    }

    #[test]
    fn test_connection_timeout() {
        let config = Config::default();
        assert_eq!(config.connection_timeout(), Duration::from_secs(10));
    }
}
