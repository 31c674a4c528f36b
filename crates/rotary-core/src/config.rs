//! Configuration for rotary
//!
//! Defaults come from [`Config::default`], can be loaded from a TOML file,
//! and are finally overridden by the environment:
//! - `LOG_TO_FILE` (`1`, `true`, `yes` enable file logging, anything else disables it)
//! - `LOG_FOLDER_NAME` (log folder)
//! - `LOG_MAX_SIZE` (maximum file size in megabytes)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::constants::*;
use crate::error::{Error, Result};
use crate::types::{BrokenPipePolicy, Encoding, Prefix, WriteMode};

/// Settings consumed once when a coordinator is built
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Write mirrored output to log files at all
    pub log_to_file: bool,
    /// Folder requested by the user (validated before use)
    pub log_folder: PathBuf,
    /// Folder used when `log_folder` cannot be used
    pub default_log_folder: PathBuf,
    /// Maximum size of one log file, in megabytes
    pub max_size_mb: i64,
    /// Buffered bytes that trigger a flush
    pub flush_size: i64,
    /// Share one file between stdout and stderr
    pub merge_streams: bool,
    /// Truncate the first file instead of appending to it
    pub overwrite: bool,
    pub encoding: Encoding,
    pub prefix: Prefix,
    pub broken_pipe: BrokenPipePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_to_file: true,
            log_folder: default_log_folder(),
            default_log_folder: default_log_folder(),
            max_size_mb: (DEFAULT_LOG_MAX_SIZE / MB) as i64,
            flush_size: DEFAULT_FLUSH_SIZE as i64,
            merge_streams: true,
            overwrite: false,
            encoding: Encoding::default(),
            prefix: Prefix::default(),
            broken_pipe: BrokenPipePolicy::default(),
        }
    }
}

impl Config {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load a TOML config file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env();

        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Parse TOML config content
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup
    pub fn apply_vars<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_LOG_TO_FILE) {
            self.log_to_file = is_truthy(&value);
        }

        if let Some(value) = lookup(ENV_LOG_FOLDER) {
            if !value.trim().is_empty() {
                self.log_folder = PathBuf::from(value);
            }
        }

        if let Some(value) = lookup(ENV_LOG_MAX_SIZE) {
            match value.trim().parse::<i64>() {
                Ok(mb) => self.max_size_mb = mb,
                Err(_) => warn!(
                    "Ignoring {}={:?}: not a whole number of megabytes",
                    ENV_LOG_MAX_SIZE, value
                ),
            }
        }
    }

    /// Maximum file size in bytes; the sign is kept so the sink can correct it
    pub fn max_size_bytes(&self) -> i64 {
        self.max_size_mb.saturating_mul(MB as i64)
    }

    pub fn write_mode(&self) -> WriteMode {
        WriteMode::from_override(self.overwrite)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}
