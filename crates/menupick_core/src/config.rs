//! Store configuration.
//!
//! # Responsibility
//! - Select the backend mode and write-failure policy once per store.
//! - Resolve storage paths from the environment with temp-dir defaults.
//!
//! # Invariants
//! - Blank environment values behave like absent ones.
//! - Unknown enum values are rejected, never silently defaulted.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_BACKEND: &str = "MENUPICK_BACKEND";
pub const ENV_FAILURE_POLICY: &str = "MENUPICK_FAILURE_POLICY";
pub const ENV_KV_PATH: &str = "MENUPICK_KV_PATH";
pub const ENV_DB_PATH: &str = "MENUPICK_DB_PATH";

const DEFAULT_DB_NAME: &str = "menupick";
const DEFAULT_DB_FILE_NAME: &str = "menupick.sqlite3";
const DEFAULT_KV_FILE_NAME: &str = "menupick_kv.json";

/// Which medium the store brings up first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    /// SQLite first, key-value store as per-call fallback.
    #[default]
    Relational,
    /// Key-value store only.
    KeyValue,
}

/// What the store does when a write fails on every medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Reject the operation with `WriteFailed`; the cache is untouched.
    #[default]
    Strict,
    /// Apply the change to the cache only and enter degraded mode.
    Degrade,
}

impl BackendMode {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "relational" | "sql" | "sqlite" => Ok(Self::Relational),
            "kv" | "key_value" | "key-value" => Ok(Self::KeyValue),
            other => Err(ConfigError::InvalidValue {
                key: ENV_BACKEND,
                value: other.to_string(),
            }),
        }
    }
}

impl FailurePolicy {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "degrade" | "degraded" => Ok(Self::Degrade),
            other => Err(ConfigError::InvalidValue {
                key: ENV_FAILURE_POLICY,
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, value } => {
                write!(f, "unsupported value `{value}` for {key}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Configuration for one item store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend_mode: BackendMode,
    pub failure_policy: FailurePolicy,
    /// Key-value file; also the relational fallback medium.
    pub kv_path: PathBuf,
    pub db_path: PathBuf,
    /// Logical database name handed to the SQL bridge.
    pub db_name: String,
    /// Seed the default dishes when the medium has never held an item.
    pub seed_when_empty: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let temp_dir = std::env::temp_dir();
        Self {
            backend_mode: BackendMode::default(),
            failure_policy: FailurePolicy::default(),
            kv_path: temp_dir.join(DEFAULT_KV_FILE_NAME),
            db_path: temp_dir.join(DEFAULT_DB_FILE_NAME),
            db_name: DEFAULT_DB_NAME.to_string(),
            seed_when_empty: true,
        }
    }
}

impl StoreConfig {
    /// Reads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(value) = read(ENV_BACKEND) {
            config.backend_mode = BackendMode::parse(&value)?;
        }
        if let Some(value) = read(ENV_FAILURE_POLICY) {
            config.failure_policy = FailurePolicy::parse(&value)?;
        }
        if let Some(value) = read(ENV_KV_PATH) {
            config.kv_path = PathBuf::from(value);
        }
        if let Some(value) = read(ENV_DB_PATH) {
            config.db_path = PathBuf::from(value);
        }
        Ok(config)
    }
}
