//! Host-facing configuration for heatlink.
//!
//! A TOML file (default: `heatlink.toml` in the platform config dir)
//! merged with `HEATLINK_*` environment overrides, resolved into a
//! `heatlink_core::ControllerConfig`. Credential lookup prefers an
//! environment variable over plaintext in the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use heatlink_core::{ControllerConfig, Credentials};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured (set username plus password or password_env)")]
    NoCredentials,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Cloud API base URL.
    pub base_url: Option<String>,

    /// Account username.
    pub username: Option<String>,

    /// Account password (plaintext -- prefer `password_env`).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Where to persist energy accumulator state.
    pub energy_store_path: Option<PathBuf>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Polling cadence knobs.
    #[serde(default)]
    pub intervals: Intervals,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Intervals {
    /// Main state-sync interval in seconds.
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,

    /// Ambient sub-poll cadence in seconds (once probed as supported).
    #[serde(default = "default_telemetry_secs")]
    pub telemetry_secs: u64,

    /// Post-command refresh debounce window in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Energy bucket retention horizon in hours.
    #[serde(default = "default_energy_retention_hours")]
    pub energy_retention_hours: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            username: None,
            password: None,
            password_env: None,
            energy_store_path: None,
            timeout_secs: default_timeout_secs(),
            intervals: Intervals::default(),
        }
    }
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
            telemetry_secs: default_telemetry_secs(),
            debounce_ms: default_debounce_ms(),
            energy_retention_hours: default_energy_retention_hours(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_poll_secs() -> u64 {
    60
}
fn default_telemetry_secs() -> u64 {
    30 * 60
}
fn default_debounce_ms() -> u64 {
    2000
}
fn default_energy_retention_hours() -> u64 {
    48
}

// ── Loading ─────────────────────────────────────────────────────────

/// The default config file location (platform config dir).
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "heatlink").map(|dirs| dirs.config_dir().join("heatlink.toml"))
}

impl Config {
    /// Load configuration: defaults, then the TOML file (explicit path
    /// or the platform default), then `HEATLINK_*` env overrides.
    /// Nested keys use `__` in env names (`HEATLINK_INTERVALS__POLL_SECS`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let file = path.map(Path::to_path_buf).or_else(default_config_path);
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }

        let config = figment
            .merge(Env::prefixed("HEATLINK_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Resolve into a runtime `ControllerConfig`.
    pub fn into_controller_config(self) -> Result<ControllerConfig, ConfigError> {
        let base_url = self
            .base_url
            .clone()
            .ok_or_else(|| ConfigError::Validation {
                field: "base_url".into(),
                reason: "missing".into(),
            })?
            .parse::<url::Url>()
            .map_err(|e| ConfigError::Validation {
                field: "base_url".into(),
                reason: e.to_string(),
            })?;

        let username = self
            .username
            .as_ref()
            .ok_or(ConfigError::NoCredentials)?
            .clone();
        let password = self.resolve_password()?;

        if self.intervals.poll_secs == 0 {
            return Err(ConfigError::Validation {
                field: "intervals.poll_secs".into(),
                reason: "must be non-zero".into(),
            });
        }

        Ok(ControllerConfig {
            base_url,
            credentials: Credentials::new(username, password),
            timeout: Duration::from_secs(self.timeout_secs),
            poll_interval: Duration::from_secs(self.intervals.poll_secs),
            telemetry_interval: Duration::from_secs(self.intervals.telemetry_secs),
            debounce_window: Duration::from_millis(self.intervals.debounce_ms),
            energy_retention: Duration::from_secs(self.intervals.energy_retention_hours * 3600),
            energy_store_path: self.energy_store_path,
        })
    }

    /// Write a starter config file with the default values. Refuses to
    /// overwrite an existing file.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Err(ConfigError::Validation {
                field: "path".into(),
                reason: format!("{} already exists", path.display()),
            });
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(&Self::default())?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Password resolution order: named env var, then plaintext.
    fn resolve_password(&self) -> Result<String, ConfigError> {
        if let Some(var) = &self.password_env {
            return std::env::var(var).map_err(|_| ConfigError::Validation {
                field: "password_env".into(),
                reason: format!("environment variable {var} is not set"),
            });
        }
        if let Some(password) = &self.password {
            warn!("plaintext password in config file -- prefer password_env");
            return Ok(password.clone());
        }
        Err(ConfigError::NoCredentials)
    }
}
