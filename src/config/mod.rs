//! Configuration management for the Things MCP server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::params::Limits;

/// Environment variable overriding `executor.timeout_secs`.
pub const TIMEOUT_ENV: &str = "THINGS_MCP_TIMEOUT_SECS";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target application.
    pub things: ThingsConfig,

    /// Script execution.
    pub executor: ExecutorConfig,

    /// Default listing sizes.
    pub limits: Limits,
}

impl Config {
    /// Load configuration from `path`, or from the default path.
    ///
    /// A missing file at the default path yields the defaults; an explicit
    /// path must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::config_path()?, false),
        };

        if !required && !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
        let config = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Get the configuration file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the config directory path (`~/.config/things-mcp/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config_home).join("things-mcp"));
        }

        if cfg!(target_os = "macos") {
            if let Ok(home) = std::env::var("HOME") {
                return Ok(PathBuf::from(home).join(".config").join("things-mcp"));
            }
        }

        let base = directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

        Ok(base.config_dir().join("things-mcp"))
    }
}

/// Target application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThingsConfig {
    /// Scripting name of the application.
    pub app_name: String,

    /// Let scripts launch the application when it is not running.
    pub launch_if_needed: bool,
}

impl Default for ThingsConfig {
    fn default() -> Self {
        Self {
            app_name: "Things3".to_string(),
            launch_if_needed: true,
        }
    }
}

/// Script execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Program that runs scripts read from stdin.
    pub osascript: PathBuf,

    /// Seconds to wait for one script.
    pub timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            osascript: PathBuf::from("osascript"),
            timeout_secs: 10,
        }
    }
}

impl ExecutorConfig {
    /// Effective timeout, honoring `THINGS_MCP_TIMEOUT_SECS`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout_with(std::env::var(TIMEOUT_ENV).ok().as_deref())
    }

    fn timeout_with(&self, env: Option<&str>) -> Duration {
        let secs = match env.map(str::trim).filter(|v| !v.is_empty()) {
            Some(value) => value.parse().unwrap_or_else(|_| {
                tracing::warn!(value, "ignoring invalid {TIMEOUT_ENV}");
                self.timeout_secs
            }),
            None => self.timeout_secs,
        };
        Duration::from_secs(secs.max(1))
    }
}
