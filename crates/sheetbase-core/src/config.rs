//! TOML configuration.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration pointing at `./sheetbase.db`. Environment overrides
//! are applied after parsing and before validation:
//!
//! - `SHEETBASE_DATABASE_URL` replaces `database.url`.
//! - `SHEETBASE_LOG_LEVEL` replaces `logging.level`.
//!
//! ```toml
//! [database]
//! url = "sqlite://./sheetbase.db"
//! pool_size = 20
//! pool_recycle_secs = 3600
//! pool_timeout_secs = 30
//! max_overflow = 10
//! connect_timeout_secs = 60
//!
//! [ingest]
//! max_value_len = 50
//! batch_policy = "stop_on_first_error"
//! duplicate_policy = "idempotent"
//!
//! [logging]
//! level = "info"
//! ```

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{ingest::BatchPolicy, manager::DuplicatePolicy};

/// Environment variable overriding `database.url`.
pub const ENV_DATABASE_URL: &str = "SHEETBASE_DATABASE_URL";
/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "SHEETBASE_LOG_LEVEL";

const VALID_LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Errors raised while loading or validating configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[snafu(display("Failed to read config file {path}: {source}"))]
    ReadFile {
        /// Path that was requested.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`SheetbaseConfig`].
    #[snafu(display("Failed to parse config file {path}: {source}"))]
    Parse {
        /// Path that was requested.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// A setting holds a value outside its accepted range.
    #[snafu(display("Invalid setting {key}: {message}"))]
    InvalidSetting {
        /// Dotted key of the offending setting.
        key: String,
        /// Why the value was rejected.
        message: String,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetbaseConfig {
    /// Storage engine and connection pool settings.
    pub database: DatabaseSettings,
    /// Table creation and ingestion settings.
    pub ingest: IngestSettings,
    /// Logging settings for front ends.
    pub logging: LoggingSettings,
}

/// Connection pool settings.
///
/// `pool_size + max_overflow` is the hard ceiling on open connections;
/// `pool_size` of them are kept warm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite connection URL (for example `sqlite://./sheetbase.db`).
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Number of pooled connections kept open.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Maximum lifetime of a pooled connection, in seconds.
    #[serde(default = "default_pool_recycle_secs")]
    pub pool_recycle_secs: u64,
    /// How long a caller may queue for a connection, in seconds.
    #[serde(default = "default_pool_timeout_secs")]
    pub pool_timeout_secs: u64,
    /// Connections allowed beyond `pool_size` under load.
    #[serde(default = "default_max_overflow")]
    pub max_overflow: u32,
    /// How long the engine waits on a locked database, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Table creation and ingestion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestSettings {
    /// Maximum number of characters per stored value.
    #[serde(default = "default_max_value_len")]
    pub max_value_len: usize,
    /// Policy applied to multi-file ingestion.
    #[serde(default)]
    pub batch_policy: BatchPolicy,
    /// Behavior when a table name is already taken.
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default log level (`error`, `warn`, `info`, `debug`, `trace`, `off`).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_database_url() -> String {
    "sqlite://./sheetbase.db".to_string()
}

fn default_pool_size() -> u32 {
    20
}

fn default_pool_recycle_secs() -> u64 {
    3600
}

fn default_pool_timeout_secs() -> u64 {
    30
}

fn default_max_overflow() -> u32 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    60
}

fn default_max_value_len() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_size: default_pool_size(),
            pool_recycle_secs: default_pool_recycle_secs(),
            pool_timeout_secs: default_pool_timeout_secs(),
            max_overflow: default_max_overflow(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl DatabaseSettings {
    /// Settings for a database file at `path`, other options defaulted.
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        Self {
            url: format!("sqlite://{}", path.as_ref().display()),
            ..Self::default()
        }
    }

    /// Hard ceiling on open connections.
    pub fn max_connections(&self) -> u32 {
        self.pool_size.saturating_add(self.max_overflow)
    }

    /// Connection lifetime before recycling.
    pub fn recycle_interval(&self) -> Duration {
        Duration::from_secs(self.pool_recycle_secs)
    }

    /// Queueing timeout for connection acquisition.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_timeout_secs)
    }

    /// Engine-side wait on a locked database.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            max_value_len: default_max_value_len(),
            batch_policy: BatchPolicy::default(),
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SheetbaseConfig {
    /// Load configuration from a TOML file, apply environment overrides and
    /// validate the result.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(ReadFileSnafu {
            path: path.display().to_string(),
        })?;

        let mut config: SheetbaseConfig = toml::from_str(&content).context(ParseSnafu {
            path: path.display().to_string(),
        })?;

        config.apply_env_overrides();
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = SheetbaseConfig::default();
        config.apply_env_overrides();
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Apply `SHEETBASE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_DATABASE_URL)
            && !url.trim().is_empty()
        {
            self.database.url = url;
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL)
            && !level.trim().is_empty()
        {
            self.logging.level = level;
        }
    }

    /// Trim and lowercase the log level, whichever source set it.
    pub fn normalize(&mut self) {
        self.logging.level = self.logging.level.trim().to_lowercase();
    }

    /// Validate configuration settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let db = &self.database;
        if db.url.trim().is_empty() {
            return invalid("database.url", "must not be empty");
        }
        if db.pool_size == 0 {
            return invalid("database.pool_size", "must be at least 1");
        }
        if db.pool_timeout_secs == 0 {
            return invalid("database.pool_timeout_secs", "must be at least 1");
        }
        if db.pool_recycle_secs == 0 {
            return invalid("database.pool_recycle_secs", "must be at least 1");
        }
        if self.ingest.max_value_len == 0 {
            return invalid("ingest.max_value_len", "must be at least 1");
        }
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return invalid(
                "logging.level",
                &format!(
                    "'{}' is not one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }
        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> Result<(), ConfigError> {
    InvalidSettingSnafu {
        key: key.to_string(),
        message: message.to_string(),
    }
    .fail()
}
