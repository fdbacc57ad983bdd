//! Application configuration.
//!
//! Configuration is stored as TOML, by default at
//! `~/.config/partcopy/partcopy.toml`. A missing file means defaults.

use std::path::{Path, PathBuf};

use partcopy_transfer::{BatchOptions, TaskConfig};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of files processed at once (unset = no limit).
    #[serde(default)]
    pub max_concurrent_tasks: Option<usize>,

    /// Delete each reassembled file after it verified.
    #[serde(default)]
    pub remove_outputs: bool,

    /// Per-task tuning (split factor, output directory, digest).
    #[serde(default)]
    pub task: TaskConfig,
}

impl Config {
    /// Loads `path`, or the default location when `path` is `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path(),
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        config.task.validate()?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            max_concurrent_tasks: self.max_concurrent_tasks,
            remove_outputs: self.remove_outputs,
        }
    }
}

/// Returns the default configuration file path.
fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("partcopy")
        .join("partcopy.toml")
}
