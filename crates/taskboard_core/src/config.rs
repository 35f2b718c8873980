//! Application configuration.
//!
//! # Responsibility
//! - Load `AppConfig` from a TOML file, falling back to defaults when the file
//!   is absent.
//! - Apply `TASKBOARD_*` environment overrides on top of the file.
//!
//! # Invariants
//! - Every field has a default, so an empty file is a valid config.
//! - Invalid values fail at load time, never at first use.

use crate::engine::CapacityPolicy;
use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DATABASE_PATH: &str = "TASKBOARD_DATABASE_PATH";
pub const ENV_BIND_ADDR: &str = "TASKBOARD_BIND_ADDR";
pub const ENV_LOG_LEVEL: &str = "TASKBOARD_LOG_LEVEL";

const DEFAULT_DATABASE_PATH: &str = "taskboard.sqlite3";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_TOKEN_TTL_HOURS: u64 = 24 * 7;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config {}: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "cannot parse config {}: {source}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

/// Runtime configuration shared by the HTTP server and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub bind_addr: String,
    pub log_level: String,
    /// Rolling log directory. `None` logs to stderr.
    pub log_dir: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub capacity_policy: CapacityPolicy,
    pub token_ttl_hours: u64,
    /// CORS origins. Empty allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            log_level: default_log_level().to_string(),
            log_dir: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            capacity_policy: CapacityPolicy::default(),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            allowed_origins: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Loads config from `path` (defaults when missing), then applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                log::debug!(
                    "event=config_load module=config status=missing path={}",
                    path.display()
                );
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML file without environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!(
            "event=config_load module=config status=ok path={}",
            path.display()
        );
        Ok(config)
    }

    /// Applies `TASKBOARD_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(ENV_DATABASE_PATH).filter(|value| !value.trim().is_empty()) {
            self.database_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_BIND_ADDR).filter(|value| !value.trim().is_empty()) {
            self.bind_addr = value.trim().to_string();
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL).filter(|value| !value.trim().is_empty()) {
            self.log_level = value.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        crate::logging::normalize_level(&self.log_level).map_err(ConfigError::Invalid)?;
        if self.token_ttl_hours == 0 {
            return Err(ConfigError::Invalid(
                "token_ttl_hours must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr.parse().map_err(|_| {
            ConfigError::Invalid(format!("bind_addr `{}` is not host:port", self.bind_addr))
        })
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_hours.saturating_mul(60 * 60))
    }
}
