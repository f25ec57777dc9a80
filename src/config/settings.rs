//! User configuration settings
//!
//! Layered configuration: defaults → config file → environment variables → CLI args

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error, Result};

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Repository to analyze
    pub repo_path: PathBuf,

    /// Remote that holds the pull-request heads
    pub remote: String,

    /// Trunk branch override (skips detection when set)
    pub trunk: Option<String>,

    /// Version-control executable
    pub git_program: String,

    /// PR-tracking CLI executable
    pub gh_program: String,

    /// Maximum concurrent external commands
    pub max_concurrent_commands: usize,

    /// Pause between branches while streaming results, in milliseconds
    pub pacing_ms: u64,

    /// Interval for re-announcing the paused state, in milliseconds
    pub heartbeat_ms: u64,

    /// Fetch from the remote before analyzing
    pub fetch_before_analysis: bool,

    /// Enable debug logging
    pub debug: bool,

    /// Log file path (if set, logs to file instead of stderr)
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("."),
            remote: "origin".to_string(),
            trunk: None,
            git_program: "git".to_string(),
            gh_program: "gh".to_string(),
            max_concurrent_commands: 16,
            pacing_ms: 100,
            heartbeat_ms: 500,
            fetch_before_analysis: true,
            debug: false,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Load configuration with an explicit config file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path));

        // The repository path has historically been passed as GIT_REPO_PATH
        if let Ok(path) = std::env::var("GIT_REPO_PATH") {
            figment = figment.merge(Serialized::default("repo_path", path));
        }

        figment
            .merge(Env::prefixed("BC_"))
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()).into())
    }

    /// Get the configuration file path
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = Self::project_dirs()?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Save current configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    /// Save current configuration to a specific path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|_e| {
                Error::Config(ConfigError::DirectoryCreationFailed(parent.to_path_buf()))
            })?;
        }

        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        std::fs::write(config_path, toml).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        Ok(())
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    /// Heartbeat period, never zero
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.max(1))
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "branch-cleaner", "branch-cleaner").ok_or_else(|| {
            Error::Config(ConfigError::LoadFailed(
                "Could not determine home directory".to_string(),
            ))
        })
    }
}
