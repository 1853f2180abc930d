//! Process-wide settings.
//!
//! Settings are looked up in this order:
//! 1. The file named by `$STEVEDORE_CONFIG`
//! 2. `./stevedore.toml`
//! 3. Built-in defaults
//!
//! ```toml
//! max_wait_secs = 30
//! startup_poll_interval_secs = 0.5
//! name_prefix = "ci"
//!
//! [options]
//! mem_limit = "512m"
//! cap_add = ["NET_ADMIN"]
//!
//! [options.ports]
//! "5432/tcp" = 15432
//! "6379/tcp" = "any"
//! ```

use crate::container::{ContainerError, Result, RunOptions};
use crate::env;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Defaults applied to every container built with
/// [`ContainerBuilder::settings`](crate::container::ContainerBuilder::settings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Startup wait budget in seconds; unset means each image's own budget
    pub max_wait_secs: Option<f64>,
    /// Seconds between status polls during startup
    pub startup_poll_interval_secs: f64,
    /// Seconds between port probe rounds
    pub readiness_poll_interval_secs: f64,
    /// Prefix of generated container names
    pub name_prefix: String,
    /// Explicit runtime endpoint (`unix:///run/podman/podman.sock`, `tcp://host:2375`)
    pub docker_host: Option<String>,
    /// Creation options layered between the defaults and caller options
    pub options: RunOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_wait_secs: None,
            startup_poll_interval_secs: env::DEFAULT_STARTUP_POLL_INTERVAL.as_secs_f64(),
            readiness_poll_interval_secs: env::DEFAULT_READINESS_POLL_INTERVAL.as_secs_f64(),
            name_prefix: env::DEFAULT_NAME_PREFIX.to_string(),
            docker_host: None,
            options: RunOptions::default(),
        }
    }
}

impl Settings {
    /// Parse and validate settings from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::ConfigError`] on malformed TOML or invalid values.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)
            .map_err(|e| ContainerError::ConfigError(format!("Failed to parse TOML: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::IoError`] if the file cannot be read, or the
    /// errors of [`Settings::from_toml_str`].
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serialize to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::ConfigError`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            ContainerError::ConfigError(format!("Failed to serialize settings: {}", e))
        })
    }

    /// Discover settings through the lookup order in the module docs.
    ///
    /// # Errors
    ///
    /// Returns the load error of the file found, if any.
    pub fn discover() -> Result<Self> {
        match Self::find_config_file() {
            Some(path) => {
                info!("Loading settings from: {:?}", path);
                Self::from_toml_file(path)
            }
            None => {
                debug!("No settings file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// First existing settings file in lookup order.
    pub fn find_config_file() -> Option<PathBuf> {
        Self::config_candidates().into_iter().find(|candidate| {
            debug!("Checking for settings file: {:?}", candidate);
            candidate.is_file()
        })
    }

    fn config_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(path) = std::env::var_os(env::CONFIG_ENV_VAR) {
            candidates.push(PathBuf::from(path));
        }
        if let Ok(current_dir) = std::env::current_dir() {
            candidates.push(current_dir.join(env::CONFIG_FILE_NAME));
        }
        candidates
    }

    /// Check value ranges and option syntax.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::ConfigError`] for negative or non-finite
    /// durations, a zero poll interval, an empty name prefix, or malformed
    /// options.
    pub fn validate(&self) -> Result<()> {
        if let Some(secs) = self.max_wait_secs {
            seconds("max_wait_secs", secs)?;
        }
        for (field, secs) in [
            ("startup_poll_interval_secs", self.startup_poll_interval_secs),
            ("readiness_poll_interval_secs", self.readiness_poll_interval_secs),
        ] {
            if seconds(field, secs)?.is_zero() {
                return Err(ContainerError::ConfigError(format!(
                    "{} must be greater than zero",
                    field
                )));
            }
        }
        if self.name_prefix.trim().is_empty() {
            return Err(ContainerError::ConfigError(
                "name_prefix must not be empty".to_string(),
            ));
        }
        self.options.validate()?;
        Ok(())
    }

    /// Startup wait budget, if configured.
    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Delay between status polls.
    pub fn startup_poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.startup_poll_interval_secs)
            .unwrap_or(env::DEFAULT_STARTUP_POLL_INTERVAL)
    }

    /// Delay between port probe rounds.
    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.readiness_poll_interval_secs)
            .unwrap_or(env::DEFAULT_READINESS_POLL_INTERVAL)
    }

    /// Connect to the configured runtime, or discover a local one.
    ///
    /// # Errors
    ///
    /// Returns the connection error.
    #[cfg(feature = "docker")]
    pub async fn runtime_client(&self) -> Result<crate::container::DockerClient> {
        match &self.docker_host {
            Some(host) => crate::container::DockerClient::connect_with_host(host).await,
            None => crate::container::DockerClient::connect().await,
        }
    }
}

fn seconds(field: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        ContainerError::ConfigError(format!(
            "{} must be a non-negative number of seconds, got {}",
            field, secs
        ))
    })
}
