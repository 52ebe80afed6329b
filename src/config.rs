//! Configuration
//!
//! Layered configuration: built-in defaults, overridden by an optional
//! TOML file at `~/.config/ziryab/config.toml`, overridden by environment
//! variables (`ZIRYAB_API_URL`, `ZIRYAB_TIMEOUT_SECS`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::client::traits::ResponseMode;

/// Default assistant shown when an exchange fails before any content arrives
const DEFAULT_FAILURE_NOTICE: &str =
    "Sorry, there was an error processing your request. Please try again.";

/// Configuration load failure
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Transport-level settings
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Chat service root URL
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl ClientConfig {
    /// Apply environment-variable overrides
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("ZIRYAB_API_URL") {
            self.base_url = url;
        }
        if let Ok(secs) = std::env::var("ZIRYAB_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) => self.request_timeout = Duration::from_secs(secs),
                Err(_) => tracing::warn!(value = %secs, "ignoring invalid ZIRYAB_TIMEOUT_SECS"),
            }
        }
        self
    }
}

/// Session behavior settings
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Delivery mode requested for every exchange
    pub response_mode: ResponseMode,
    /// How many completed local turns anonymous requests carry as context
    pub anonymous_history_limit: usize,
    /// Placeholder content shown when an exchange fails before producing any
    pub failure_notice: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            response_mode: ResponseMode::Streaming,
            anonymous_history_limit: 6,
            failure_notice: DEFAULT_FAILURE_NOTICE.to_string(),
        }
    }
}

/// Full crate configuration
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Transport settings
    pub client: ClientConfig,
    /// Session settings
    pub session: SessionConfig,
}

/// TOML file shape; every field optional so a partial file works
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    client: ClientSection,
    #[serde(default)]
    session: SessionSection,
}

#[derive(Debug, Default, Deserialize)]
struct ClientSection {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionSection {
    response_mode: Option<ResponseMode>,
    anonymous_history_limit: Option<usize>,
    failure_notice: Option<String>,
}

impl Config {
    /// Load from the default path (if present), then apply env overrides
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match default_config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        Ok(Self {
            client: config.client.with_env_overrides(),
            session: config.session,
        })
    }

    /// Load from a specific TOML file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&raw)?;
        tracing::debug!(path = %path.display(), "loaded config file");

        let mut config = Self::default();
        if let Some(url) = file.client.base_url {
            config.client.base_url = url;
        }
        if let Some(secs) = file.client.timeout_secs {
            config.client.request_timeout = Duration::from_secs(secs);
        }
        if let Some(mode) = file.session.response_mode {
            config.session.response_mode = mode;
        }
        if let Some(limit) = file.session.anonymous_history_limit {
            config.session.anonymous_history_limit = limit;
        }
        if let Some(notice) = file.session.failure_notice {
            config.session.failure_notice = notice;
        }
        Ok(config)
    }
}

/// Default config file location (`~/.config/ziryab/config.toml`)
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ziryab").join("config.toml"))
}
