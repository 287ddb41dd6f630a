//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! Two scopes:
//! - **Global**: user-level settings
//! - **Repo**: per-repository overrides, stored in `<git_dir>/stagehand/config.toml`
//!
//! # Precedence
//!
//! Later overrides earlier:
//! 1. Default values
//! 2. Global config file
//! 3. Repo config file
//! 4. CLI flags (not handled here)
//!
//! # Global Config Locations
//!
//! The first existing file wins:
//! 1. `$STAGEHAND_CONFIG`
//! 2. `$XDG_CONFIG_HOME/stagehand/config.toml`
//! 3. `~/.stagehand/config.toml` (canonical write location)
//!
//! # Example
//!
//! ```no_run
//! use stagehand::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! println!("Remote: {}", config.remote());
//! println!("Pull strategy: {}", config.pull_strategy());
//! ```

pub mod schema;

pub use schema::{AutoStash, GlobalConfig, OperationDefaults, RepoConfig, ShutdownConfig};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::core::paths::{self, StagehandPaths};
use crate::core::types::PullStrategy;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("unknown config key '{0}'")]
    UnknownKey(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Merged configuration from all sources.
///
/// Accessors apply precedence; repo values override global ones.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: GlobalConfig,
    pub repo: Option<RepoConfig>,
    global_path: Option<PathBuf>,
    repo_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration, including the repo scope when `repo` is given.
    ///
    /// Missing files are not an error. Files that exist but fail to parse
    /// or validate are.
    pub fn load(repo: Option<&StagehandPaths>) -> Result<Self, ConfigError> {
        let (global, global_path) = match paths::global_config_candidates()
            .into_iter()
            .find(|p| p.exists())
        {
            Some(path) => (read_toml::<GlobalConfig>(&path)?, Some(path)),
            None => (GlobalConfig::default(), None),
        };
        global.validate()?;

        let (repo, repo_path) = match repo.map(StagehandPaths::repo_config_path) {
            Some(path) if path.exists() => {
                let config = read_toml::<RepoConfig>(&path)?;
                config.validate()?;
                (Some(config), Some(path))
            }
            _ => (None, None),
        };

        debug!(
            global = ?global_path,
            repo = ?repo_path,
            "configuration loaded"
        );

        Ok(Self {
            global,
            repo,
            global_path,
            repo_path,
        })
    }

    /// Write global config atomically to `~/.stagehand/config.toml`.
    pub fn write_global(config: &GlobalConfig) -> Result<PathBuf, ConfigError> {
        let path = paths::canonical_global_config_path().ok_or(ConfigError::NoHomeDir)?;
        write_toml_atomic(&path, config)?;
        Ok(path)
    }

    /// Write repo config atomically.
    pub fn write_repo(paths: &StagehandPaths, config: &RepoConfig) -> Result<PathBuf, ConfigError> {
        let path = paths.repo_config_path();
        write_toml_atomic(&path, config)?;
        Ok(path)
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    fn pick<T>(&self, field: impl Fn(&OperationDefaults) -> Option<T>) -> Option<T> {
        self.repo
            .as_ref()
            .and_then(&field)
            .or_else(|| field(&self.global.defaults()))
    }

    /// Remote used by pull and push. Defaults to "origin".
    pub fn remote(&self) -> String {
        self.pick(|d| d.remote.clone())
            .unwrap_or_else(|| "origin".to_string())
    }

    /// Defaults to merge.
    pub fn pull_strategy(&self) -> PullStrategy {
        self.pick(|d| d.pull_strategy).unwrap_or_default()
    }

    /// Defaults to `false`.
    pub fn stash_include_untracked(&self) -> bool {
        self.pick(|d| d.stash_include_untracked).unwrap_or(false)
    }

    /// Defaults to asking.
    pub fn auto_stash_on_switch(&self) -> AutoStash {
        self.pick(|d| d.auto_stash_on_switch).unwrap_or_default()
    }

    /// Defaults to `true`.
    pub fn interactive(&self) -> bool {
        self.global.interactive.unwrap_or(true)
    }

    /// Whether shutdown blocks until the queue drains. Defaults to `true`.
    pub fn shutdown_wait(&self) -> bool {
        self.global
            .shutdown
            .as_ref()
            .and_then(|s| s.wait)
            .unwrap_or(true)
    }

    /// Whether shutdown drops tasks that have not started. Defaults to `false`.
    pub fn shutdown_discard_pending(&self) -> bool {
        self.global
            .shutdown
            .as_ref()
            .and_then(|s| s.discard_pending)
            .unwrap_or(false)
    }

    /// Effective value of `key` as a string, defaults included.
    pub fn effective(&self, key: &str) -> Option<String> {
        match key {
            "remote" => Some(self.remote()),
            "pull_strategy" => Some(self.pull_strategy().to_string()),
            "stash_include_untracked" => Some(self.stash_include_untracked().to_string()),
            "auto_stash_on_switch" => Some(self.auto_stash_on_switch().to_string()),
            "interactive" => Some(self.interactive().to_string()),
            "shutdown.wait" => Some(self.shutdown_wait().to_string()),
            "shutdown.discard_pending" => Some(self.shutdown_discard_pending().to_string()),
            _ => None,
        }
    }

    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    pub fn repo_config_loaded_from(&self) -> Option<&Path> {
        self.repo_path.as_deref()
    }
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Write to a sibling temp file, then rename over the target.
fn write_toml_atomic<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ConfigError::WriteError { path, source }
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err(path))?;
    }

    let contents =
        toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

    let temp_path = path.with_extension("toml.tmp");
    let mut file = fs::File::create(&temp_path).map_err(write_err(&temp_path))?;
    file.write_all(contents.as_bytes())
        .map_err(write_err(&temp_path))?;
    file.sync_all().map_err(write_err(&temp_path))?;

    fs::rename(&temp_path, path).map_err(write_err(path))
}
