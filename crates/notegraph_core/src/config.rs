//! Runtime configuration.
//!
//! # Responsibility
//! - Resolve database path, logging and index behaviour from defaults,
//!   a `.env` file and `NOTEGRAPH_*` environment variables.
//!
//! # Invariants
//! - Unset or blank variables fall back to defaults; set but invalid values
//!   are errors, never silently ignored.

use crate::logging::{default_log_level, normalize_level};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

pub const ENV_DB_PATH: &str = "NOTEGRAPH_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "NOTEGRAPH_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "NOTEGRAPH_LOG_DIR";
pub const ENV_LINK_SYNC: &str = "NOTEGRAPH_LINK_SYNC";

const DEFAULT_DB_PATH: &str = "notegraph.sqlite3";

/// How link extraction treats edges a sub-note no longer mentions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkSyncMode {
    /// Only add edges. Removing a `[[link]]` from text leaves its edge and
    /// cache contribution in place until the sub-note is deleted.
    #[default]
    AppendOnly,
    /// Delete edges originated by the sub-note that its text no longer
    /// mentions, decrementing the graph cache for each.
    Reconcile,
}

impl LinkSyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AppendOnly => "append_only",
            Self::Reconcile => "reconcile",
        }
    }
}

impl FromStr for LinkSyncMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "append_only" | "append" => Ok(Self::AppendOnly),
            "reconcile" => Ok(Self::Reconcile),
            _ => Err(ConfigError::InvalidValue {
                key: ENV_LINK_SYNC,
                value: value.to_string(),
                expected: "append_only|reconcile",
            }),
        }
    }
}

/// Settings consumed by the index dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexConfig {
    pub link_sync: LinkSyncMode,
}

/// Process-level configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub db_path: PathBuf,
    pub log_level: &'static str,
    /// `None` leaves file logging off.
    pub log_dir: Option<PathBuf>,
    pub index: IndexConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            log_level: default_log_level(),
            log_dir: None,
            index: IndexConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Loads `.env` (when present) and then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(ConfigError::DotEnv(err.to_string()));
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(path) = read(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            config.log_level = normalize_level(&level).map_err(|_| ConfigError::InvalidValue {
                key: ENV_LOG_LEVEL,
                value: level.clone(),
                expected: "trace|debug|info|warn|error",
            })?;
        }
        if let Some(dir) = read(ENV_LOG_DIR) {
            let dir = PathBuf::from(dir);
            if !dir.is_absolute() {
                return Err(ConfigError::InvalidValue {
                    key: ENV_LOG_DIR,
                    value: dir.display().to_string(),
                    expected: "an absolute path",
                });
            }
            config.log_dir = Some(dir);
        }
        if let Some(mode) = read(ENV_LINK_SYNC) {
            config.index.link_sync = mode.parse()?;
        }
        Ok(config)
    }
}

/// Configuration loading error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
    /// `.env` exists but could not be read or parsed.
    DotEnv(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue {
                key,
                value,
                expected,
            } => write!(f, "invalid value `{value}` for {key}; expected {expected}"),
            Self::DotEnv(message) => write!(f, "failed to load .env: {message}"),
        }
    }
}

impl Error for ConfigError {}
