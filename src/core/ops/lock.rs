//! core::ops::lock
//!
//! Advisory lock that marks a working copy as owned by one orchestrator.
//!
//! The scheduler already serializes mutations inside a process. This lock
//! extends the single-writer rule across processes: a second stagehand
//! instance opening the same repository fails fast instead of racing the
//! first one's worker.
//!
//! # Storage
//!
//! - `<git_dir>/stagehand/lock` - Lock file holding an OS-level exclusive lock
//!
//! # Invariants
//!
//! - Held for as long as the repository handle is open
//! - Released on drop
//! - Acquisition never blocks

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

use crate::core::paths::StagehandPaths;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process holds the lock.
    #[error("working copy is in use by another stagehand process ({path})")]
    AlreadyLocked { path: PathBuf },

    #[error("failed to create lock file {path}: {source}")]
    CreateFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to acquire lock: {0}")]
    AcquireFailed(std::io::Error),
}

/// An exclusive lock on a working copy, released when dropped.
#[derive(Debug)]
pub struct WorkingCopyLock {
    path: PathBuf,
    file: Option<File>,
}

impl WorkingCopyLock {
    /// Take the lock for the repository described by `paths`.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyLocked`] if another process holds it
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    pub fn acquire(paths: &StagehandPaths) -> Result<Self, LockError> {
        let dir = paths.storage_dir();
        fs::create_dir_all(&dir).map_err(|source| LockError::CreateFailed {
            path: dir.clone(),
            source,
        })?;

        let path = paths.lock_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::CreateFailed {
                path: path.clone(),
                source,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path,
                file: Some(file),
            }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(LockError::AlreadyLocked { path })
            }
            Err(e) => Err(LockError::AcquireFailed(e)),
        }
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release before drop. Releasing twice is a no-op.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}

impl Drop for WorkingCopyLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_paths(dir: &Path) -> StagehandPaths {
        StagehandPaths::new(dir.join(".git"), dir.to_path_buf())
    }

    #[test]
    fn acquire_creates_lock_file() {
        let temp = TempDir::new().unwrap();
        let lock = WorkingCopyLock::acquire(&test_paths(temp.path())).unwrap();
        assert!(lock.is_held());
        assert!(lock.path().exists());
    }

    #[test]
    fn second_acquire_is_refused() {
        let temp = TempDir::new().unwrap();
        let paths = test_paths(temp.path());
        let _held = WorkingCopyLock::acquire(&paths).unwrap();

        let second = WorkingCopyLock::acquire(&paths);
        assert!(matches!(second, Err(LockError::AlreadyLocked { .. })));
    }

    #[test]
    fn release_allows_reacquire() {
        let temp = TempDir::new().unwrap();
        let paths = test_paths(temp.path());

        let mut lock = WorkingCopyLock::acquire(&paths).unwrap();
        lock.release();
        assert!(!lock.is_held());
        lock.release();

        assert!(WorkingCopyLock::acquire(&paths).is_ok());
    }

    #[test]
    fn drop_releases() {
        let temp = TempDir::new().unwrap();
        let paths = test_paths(temp.path());
        drop(WorkingCopyLock::acquire(&paths).unwrap());
        assert!(WorkingCopyLock::acquire(&paths).is_ok());
    }
}
