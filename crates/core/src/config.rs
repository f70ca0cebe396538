//! MV-Util configuration and per-plugin TOML configurations

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The embedded default `config.toml`.
pub const DEFAULT_CONFIG: &str = include_str!("../resources/config.toml");

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Process-wide MV-Util configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MvUtilConfig {
    pub redis: RedisConfig,
    pub sql: SqlConfig,
    pub megachunk: MegaChunkConfig,
    pub runner: RunnerConfig,
    pub logging: LoggingConfig,
}

/// Pub/sub server address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub hostname: String,
    pub port: u16,
}

/// Where plugin databases live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
    pub directory: PathBuf,
    /// Prepended to every database name.
    pub db_prefix: String,
}

/// Mega-chunk size and offsets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MegaChunkConfig {
    /// Size in chunks.
    pub size: i32,
    pub offset_x: i32,
    pub offset_z: i32,
    pub random_offset_x: bool,
    pub random_offset_z: bool,
}

/// Background work settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub worker_threads: usize,
    /// How long shutdown waits for outstanding work.
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG`.
    pub filter: String,
    pub json: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: 6379,
        }
    }
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("databases"),
            db_prefix: String::new(),
        }
    }
}

impl Default for MegaChunkConfig {
    fn default() -> Self {
        Self {
            size: 8,
            offset_x: 0,
            offset_z: 0,
            random_offset_x: false,
            random_offset_z: false,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            shutdown_grace_secs: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl RunnerConfig {
    pub fn shutdown_grace(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl MvUtilConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;

        let config: MvUtilConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("TOML parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseFailed(format!("TOML serialize error: {}", e)))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Loads `config.toml` from `data_folder`, writing the default first if it is missing.
    pub fn load_or_create<P: AsRef<Path>>(data_folder: P) -> Result<Self, ConfigError> {
        let path = data_folder.as_ref().join(CONFIG_FILE_NAME);
        if !path.is_file() {
            tracing::info!("Writing default configuration to {}", path.display());
            copy_default(DEFAULT_CONFIG, &path)?;
        }
        Self::load_from_file(&path)
    }

    /// Resolves relative paths against `data_folder`.
    pub fn resolve_paths(&mut self, data_folder: &Path) {
        if self.sql.directory.is_relative() {
            self.sql.directory = data_folder.join(&self.sql.directory);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis.hostname.is_empty() {
            return Err(ConfigError::Invalid("Redis hostname cannot be empty".to_string()));
        }

        if self.redis.port == 0 {
            return Err(ConfigError::Invalid("Redis port cannot be 0".to_string()));
        }

        if self.megachunk.size <= 0 {
            return Err(ConfigError::Invalid("Mega-chunk size must be positive".to_string()));
        }

        if self.runner.worker_threads == 0 {
            return Err(ConfigError::Invalid("Worker thread count cannot be 0".to_string()));
        }

        if self.sql.directory.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("SQL directory cannot be empty".to_string()));
        }

        Ok(())
    }
}

fn copy_default(default: &str, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
    }
    std::fs::write(path, default).map_err(|e| ConfigError::Io(e.to_string()))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration value '{key}' has the wrong type: {message}")]
    WrongType { key: String, message: String },
}

/// A plugin's own `config.toml`, layered over embedded defaults.
///
/// Keys missing from the file fall back to the defaults. Keys are addressed
/// with dotted paths such as `"teleport.delay"`.
#[derive(Debug, Clone)]
pub struct TomlConfig {
    path: PathBuf,
    defaults: Option<&'static str>,
    table: toml::Table,
}

impl TomlConfig {
    pub fn open(path: impl Into<PathBuf>, defaults: Option<&'static str>) -> Result<Self, ConfigError> {
        let mut config = Self {
            path: path.into(),
            defaults,
            table: toml::Table::new(),
        };
        config.reload()?;
        Ok(config)
    }

    /// Re-reads the file. On first run the defaults are written out.
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        let mut table = match self.defaults {
            Some(defaults) => {
                if !self.path.is_file() {
                    copy_default(defaults, &self.path)?;
                }
                parse_table(defaults)?
            }
            None => toml::Table::new(),
        };

        if self.path.is_file() {
            let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::Io(e.to_string()))?;
            merge(&mut table, parse_table(&content)?);
        }

        self.table = table;
        Ok(())
    }

    pub fn write(&self) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(&self.table)
            .map_err(|e| ConfigError::ParseFailed(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        std::fs::write(&self.path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// Typed value at `key`, `None` when absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        let Some(value) = self.get_raw(key) else {
            return Ok(None);
        };
        value.clone().try_into().map(Some).map_err(|e: toml::de::Error| ConfigError::WrongType {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    pub fn get_raw(&self, key: &str) -> Option<&toml::Value> {
        let mut parts = key.split('.');
        let mut current = self.table.get(parts.next()?)?;
        for part in parts {
            current = current.as_table()?.get(part)?;
        }
        Some(current)
    }

    /// Sets `key`, creating intermediate tables. Call [`write`](Self::write) to persist.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), ConfigError> {
        let value = toml::Value::try_from(value).map_err(|e| ConfigError::WrongType {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        let (parents, leaf) = match key.rsplit_once('.') {
            Some((parents, leaf)) => (Some(parents), leaf),
            None => (None, key),
        };

        let mut table = &mut self.table;
        for part in parents.into_iter().flat_map(|p| p.split('.')) {
            let entry = table
                .entry(part.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            if !entry.is_table() {
                *entry = toml::Value::Table(toml::Table::new());
            }
            table = entry.as_table_mut().ok_or_else(|| ConfigError::WrongType {
                key: key.to_string(),
                message: format!("'{}' is not a table", part),
            })?;
        }
        table.insert(leaf.to_string(), value);
        Ok(())
    }

    pub fn table(&self) -> &toml::Table {
        &self.table
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_table(content: &str) -> Result<toml::Table, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseFailed(format!("TOML parse error: {}", e)))
}

fn merge(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => merge(existing, incoming),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
