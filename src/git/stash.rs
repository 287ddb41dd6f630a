//! git::stash
//!
//! The stash stack.
//!
//! There is no pop here. libgit2's `stash_pop` drops the entry even when
//! the apply left conflicts; callers apply, inspect the returned conflicts,
//! and drop only on a clean apply.

use std::collections::BTreeSet;
use std::path::Path;

use super::interface::{to_git2_oid, to_oid, Git, GitError};
use crate::core::types::{ChangeKind, FileChange, Oid, StashEntry};

impl Git {
    /// Stash uncommitted changes.
    ///
    /// Returns `None` when there is nothing to stash. The new entry is
    /// always index 0.
    pub fn stash_save(
        &mut self,
        message: Option<&str>,
        include_untracked: bool,
    ) -> Result<Option<StashEntry>, GitError> {
        let signature = self.repo.signature()?;
        let mut flags = git2::StashFlags::DEFAULT;
        if include_untracked {
            flags |= git2::StashFlags::INCLUDE_UNTRACKED;
        }

        match self.repo.stash_save2(&signature, message, Some(flags)) {
            Ok(_) => Ok(self.stash_list()?.into_iter().next()),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, "stash")),
        }
    }

    /// All stash entries, most recent first.
    pub fn stash_list(&mut self) -> Result<Vec<StashEntry>, GitError> {
        let mut raw = Vec::new();
        self.repo.stash_foreach(|index, message, oid| {
            raw.push((index, message.to_string(), *oid));
            true
        })?;

        raw.into_iter()
            .map(|(index, message, oid)| {
                Ok(StashEntry {
                    index,
                    message,
                    oid: to_oid(oid)?,
                })
            })
            .collect()
    }

    /// Index of the entry whose stash commit is `oid`.
    pub fn stash_index_of(&mut self, oid: &Oid) -> Result<usize, GitError> {
        self.stash_list()?
            .into_iter()
            .find(|entry| &entry.oid == oid)
            .map(|entry| entry.index)
            .ok_or_else(|| GitError::StashNotFound {
                reference: oid.to_string(),
            })
    }

    /// Apply entry `index` onto the working tree, keeping the entry.
    ///
    /// Returns the paths left in conflict (empty on a clean apply). When
    /// uncommitted local changes would be overwritten nothing is touched
    /// and [`GitError::CheckoutConflict`] lists the overlapping paths.
    pub fn stash_apply(&mut self, index: usize) -> Result<Vec<FileChange>, GitError> {
        let entry = self.stash_entry(index)?;

        let mut opts = git2::StashApplyOptions::new();
        match self.repo.stash_apply(index, Some(&mut opts)) {
            Ok(()) => {}
            Err(e) => {
                return Err(match GitError::from_git2(e, &format!("stash@{{{index}}}")) {
                    GitError::CheckoutConflict { message, .. } => GitError::CheckoutConflict {
                        paths: self.blocking_paths(&entry.oid)?,
                        message,
                    },
                    other => other,
                })
            }
        }

        Ok(self
            .conflicted_paths()?
            .into_iter()
            .map(|path| FileChange::new(path, ChangeKind::Conflicted))
            .collect())
    }

    /// Remove entry `index`; entries above it shift down by one.
    pub fn stash_drop(&mut self, index: usize) -> Result<StashEntry, GitError> {
        let entry = self.stash_entry(index)?;
        self.repo
            .stash_drop(index)
            .map_err(|e| GitError::from_git2(e, &format!("stash@{{{index}}}")))?;
        Ok(entry)
    }

    /// Remove every entry. Returns how many were dropped.
    pub fn stash_clear(&mut self) -> Result<usize, GitError> {
        let count = self.stash_list()?.len();
        for _ in 0..count {
            self.repo.stash_drop(0)?;
        }
        Ok(count)
    }

    fn stash_entry(&mut self, index: usize) -> Result<StashEntry, GitError> {
        self.stash_list()?
            .into_iter()
            .nth(index)
            .ok_or_else(|| GitError::StashNotFound {
                reference: format!("stash@{{{index}}}"),
            })
    }

    /// Paths the stash changes that also carry uncommitted local edits.
    fn blocking_paths(&self, stash: &Oid) -> Result<Vec<String>, GitError> {
        let commit = self.repo.find_commit(to_git2_oid(stash)?)?;
        let base = commit.parent(0)?.tree()?;
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&base), Some(&commit.tree()?), None)?;

        let touched: BTreeSet<String> = diff
            .deltas()
            .filter_map(|d| d.new_file().path().or_else(|| d.old_file().path()))
            .map(path_string)
            .collect();

        let status = self.status()?;
        let dirty: BTreeSet<String> = status
            .staged
            .iter()
            .chain(status.unstaged.iter())
            .map(|c| c.path.clone())
            .collect();

        Ok(touched.intersection(&dirty).cloned().collect())
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
