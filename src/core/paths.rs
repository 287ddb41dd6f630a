//! core::paths
//!
//! Centralized path routing for stagehand's on-disk state.
//!
//! Everything stagehand stores for a repository lives under
//! `<git_dir>/stagehand/`:
//! - `config.toml` - Repository configuration
//! - `lock` - Working-copy lock file
//!
//! No other module should compute `*.join("stagehand")` paths.
//!
//! # Example
//!
//! ```
//! use stagehand::core::paths::StagehandPaths;
//! use std::path::PathBuf;
//!
//! let paths = StagehandPaths::new(PathBuf::from("/repo/.git"), PathBuf::from("/repo"));
//! assert_eq!(paths.repo_config_path(), PathBuf::from("/repo/.git/stagehand/config.toml"));
//! assert_eq!(paths.lock_path(), PathBuf::from("/repo/.git/stagehand/lock"));
//! ```

use std::path::{Path, PathBuf};

use crate::git::RepoInfo;

const STORAGE_DIR: &str = "stagehand";

/// Storage locations for one working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagehandPaths {
    /// The repository's `.git` directory.
    pub git_dir: PathBuf,
    /// The working copy root.
    pub work_dir: PathBuf,
}

impl StagehandPaths {
    pub fn new(git_dir: PathBuf, work_dir: PathBuf) -> Self {
        Self { git_dir, work_dir }
    }

    /// Build paths from an opened repository.
    pub fn from_repo_info(info: &RepoInfo) -> Self {
        Self::new(info.git_dir.clone(), info.work_dir.clone())
    }

    /// `<git_dir>/stagehand`
    pub fn storage_dir(&self) -> PathBuf {
        self.git_dir.join(STORAGE_DIR)
    }

    /// `<git_dir>/stagehand/config.toml`
    pub fn repo_config_path(&self) -> PathBuf {
        self.storage_dir().join("config.toml")
    }

    /// `<git_dir>/stagehand/lock`
    pub fn lock_path(&self) -> PathBuf {
        self.storage_dir().join("lock")
    }

    /// Make a user-supplied path relative to the working copy root.
    ///
    /// Absolute paths inside the working copy are stripped; relative paths
    /// are taken as already relative to the root. Separators are normalized
    /// to `/`, which is what the index expects.
    pub fn relativize(&self, path: &Path) -> Option<String> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.work_dir).ok()?
        } else {
            path
        };
        let joined = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        (!joined.is_empty()).then_some(joined)
    }
}

/// Global configuration file locations, in lookup order.
///
/// 1. `$STAGEHAND_CONFIG`
/// 2. `$XDG_CONFIG_HOME/stagehand/config.toml`
/// 3. `~/.stagehand/config.toml`
pub fn global_config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(path) = std::env::var("STAGEHAND_CONFIG") {
        candidates.push(PathBuf::from(path));
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        candidates.push(PathBuf::from(xdg).join(STORAGE_DIR).join("config.toml"));
    }
    if let Some(home) = canonical_global_config_path() {
        candidates.push(home);
    }
    candidates
}

/// `~/.stagehand/config.toml`, where `config set --global` writes.
pub fn canonical_global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".stagehand").join("config.toml"))
}
