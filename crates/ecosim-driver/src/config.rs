//! Driver configuration.
//!
//! Parsed from TOML or built in code; every knob has a default that
//! matches the reference driver's behavior. The one deliberate addition
//! is `exchange_timeout_secs`: the reference blocks indefinitely on a
//! hung peer, so the bound is off unless explicitly configured.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML content is invalid.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The parsed values are out of range.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Path to the simulator executable.
    pub program: PathBuf,

    /// Directory under which per-episode working directories are created.
    #[serde(default = "default_experiment_root")]
    pub experiment_root: PathBuf,

    /// Environment name, used in episode directory names and log fields.
    #[serde(default = "default_env_name")]
    pub env_name: String,

    /// How many times `step` re-sends the same action per call.
    ///
    /// Must be at least 1. The repeat loop stops early the moment the
    /// simulator reports the episode's configured duration reached.
    #[serde(default = "default_action_repeat")]
    pub action_repeat: u32,

    /// Bound on waiting for the spawned simulator to dial back, seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Optional bound on each protocol reply, seconds.
    ///
    /// `None` reproduces the reference behavior (wait forever).
    #[serde(default)]
    pub exchange_timeout_secs: Option<u64>,

    /// Pause after the terminate handshake before the group signal,
    /// milliseconds. Gives the simulator time to flush its output files.
    #[serde(default = "default_flush_delay_ms")]
    pub flush_delay_ms: u64,

    /// Action carried by the terminate message when an episode ends
    /// before any step was applied.
    #[serde(default)]
    pub initial_action: Vec<f64>,

    /// How many episode working directories to retain; older ones are
    /// pruned at episode end.
    #[serde(default = "default_max_episode_dirs")]
    pub max_episode_dirs: usize,
}

fn default_experiment_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_env_name() -> String {
    "ecosim-env".to_string()
}

const fn default_action_repeat() -> u32 {
    1
}

const fn default_connect_timeout_secs() -> u64 {
    60
}

const fn default_flush_delay_ms() -> u64 {
    1000
}

const fn default_max_episode_dirs() -> usize {
    10
}

impl DriverConfig {
    /// Creates a configuration with defaults for everything but the
    /// simulator program.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            experiment_root: default_experiment_root(),
            env_name: default_env_name(),
            action_repeat: default_action_repeat(),
            connect_timeout_secs: default_connect_timeout_secs(),
            exchange_timeout_secs: None,
            flush_delay_ms: default_flush_delay_ms(),
            initial_action: Vec::new(),
            max_episode_dirs: default_max_episode_dirs(),
        }
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on invalid TOML and
    /// [`ConfigError::Validation`] on out-of-range values.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `action_repeat` is zero or
    /// `max_episode_dirs` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.action_repeat == 0 {
            return Err(ConfigError::Validation(
                "action_repeat must be at least 1".to_string(),
            ));
        }
        if self.max_episode_dirs == 0 {
            return Err(ConfigError::Validation(
                "max_episode_dirs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The connect bound as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// The optional exchange bound as a [`Duration`].
    #[must_use]
    pub fn exchange_timeout(&self) -> Option<Duration> {
        self.exchange_timeout_secs.map(Duration::from_secs)
    }

    /// The post-terminate flush pause as a [`Duration`].
    #[must_use]
    pub const fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }
}
