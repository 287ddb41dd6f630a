//! git::integrate
//!
//! Bringing other history into HEAD: merge, rebase, their continue and
//! abort steps, and per-path conflict resolution.
//!
//! Conflicts are an outcome here, not an error. A merge or rebase step that
//! stops on conflicts returns [`IntegrationOutcome::Conflicts`] and leaves
//! the repository mid-operation for the user to resolve.

use std::path::Path;

use super::interface::{to_oid, Git, GitError};
use crate::core::types::{ChangeKind, ConflictSide, FileChange, Oid};

/// What integrating another line of history did to HEAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrationOutcome {
    /// Nothing to integrate.
    UpToDate,
    /// HEAD moved forward without a new commit.
    FastForward { head: Oid },
    /// A merge commit was created.
    Merged { commit: Oid },
    /// Local commits were replayed on top of the other history.
    Rebased { head: Oid },
    /// Stopped with these paths in conflict.
    Conflicts { paths: Vec<FileChange> },
}

impl IntegrationOutcome {
    pub fn has_conflicts(&self) -> bool {
        matches!(self, IntegrationOutcome::Conflicts { .. })
    }
}

enum Plan<'repo> {
    Done(IntegrationOutcome),
    Diverged(git2::AnnotatedCommit<'repo>),
}

impl Git {
    /// Merge the commit `refname` points at into HEAD. Short names such as
    /// `feature` or `origin/main` are accepted.
    pub fn merge_into_head(&self, refname: &str) -> Result<IntegrationOutcome, GitError> {
        let theirs = match self.plan_integration(refname)? {
            Plan::Done(outcome) => return Ok(outcome),
            Plan::Diverged(theirs) => theirs,
        };

        self.repo
            .merge(&[&theirs], None, None)
            .map_err(|e| self.with_blocking_paths(e, "merge"))?;

        let conflicts = self.conflict_changes()?;
        if !conflicts.is_empty() {
            return Ok(IntegrationOutcome::Conflicts { paths: conflicts });
        }

        let message = self
            .repo
            .message()
            .unwrap_or_else(|_| format!("Merge {refname}"));
        let commit = self.commit(&message)?;
        Ok(IntegrationOutcome::Merged { commit })
    }

    /// Replay local commits onto the commit `refname` points at.
    ///
    /// Refuses with [`GitError::CheckoutConflict`] while tracked files have
    /// uncommitted changes.
    pub fn rebase_onto(&self, refname: &str) -> Result<IntegrationOutcome, GitError> {
        let theirs = match self.plan_integration(refname)? {
            Plan::Done(outcome) => return Ok(outcome),
            Plan::Diverged(theirs) => theirs,
        };

        let status = self.status()?;
        if status.has_tracked_changes() {
            let paths = status
                .staged
                .iter()
                .chain(status.unstaged.iter())
                .filter(|c| c.kind != ChangeKind::Added || self.is_tracked(&c.path))
                .map(|c| c.path.clone())
                .collect();
            return Err(GitError::CheckoutConflict {
                paths,
                message: "cannot rebase with uncommitted changes".to_string(),
            });
        }

        let mut opts = git2::RebaseOptions::new();
        let mut rebase = self
            .repo
            .rebase(None, Some(&theirs), None, Some(&mut opts))
            .map_err(|e| GitError::from_git2(e, "rebase"))?;
        self.drive_rebase(&mut rebase)
    }

    /// Commit a merge whose conflicts have been resolved.
    pub fn continue_merge(&self) -> Result<Oid, GitError> {
        let state = self.state();
        if !state.is_merge() {
            return Err(GitError::NotInProgress {
                operation: "merge",
                state,
            });
        }
        let message = self
            .repo
            .message()
            .unwrap_or_else(|_| "Merge".to_string());
        self.commit(&message)
    }

    /// Throw away an in-progress merge, restoring HEAD's tree.
    pub fn abort_merge(&self) -> Result<(), GitError> {
        let state = self.state();
        if !state.is_merge() {
            return Err(GitError::NotInProgress {
                operation: "merge",
                state,
            });
        }
        let head = self.repo.head()?.peel_to_commit()?;
        self.repo
            .reset(head.as_object(), git2::ResetType::Hard, None)?;
        self.repo.cleanup_state()?;
        Ok(())
    }

    /// Commit the current rebase step and keep replaying.
    pub fn continue_rebase(&self) -> Result<IntegrationOutcome, GitError> {
        let state = self.state();
        if !state.is_rebase() {
            return Err(GitError::NotInProgress {
                operation: "rebase",
                state,
            });
        }
        let conflicts = self.conflicted_paths()?;
        if !conflicts.is_empty() {
            return Err(GitError::UnmergedEntries { paths: conflicts });
        }

        let mut rebase = self
            .repo
            .open_rebase(None)
            .map_err(|e| GitError::from_git2(e, "rebase"))?;
        let signature = self.repo.signature()?;
        if rebase.operation_current().is_some() {
            match rebase.commit(None, &signature, None) {
                Ok(_) => {}
                Err(e) if e.code() == git2::ErrorCode::Applied => {}
                Err(e) => return Err(GitError::from_git2(e, "rebase")),
            }
        }
        self.drive_rebase(&mut rebase)
    }

    /// Stop an in-progress rebase and restore the original branch.
    pub fn abort_rebase(&self) -> Result<(), GitError> {
        let state = self.state();
        if !state.is_rebase() {
            return Err(GitError::NotInProgress {
                operation: "rebase",
                state,
            });
        }
        let mut rebase = self
            .repo
            .open_rebase(None)
            .map_err(|e| GitError::from_git2(e, "rebase"))?;
        rebase.abort()?;
        Ok(())
    }

    /// Resolve a conflicted path by taking one side's version.
    ///
    /// When the chosen side deleted the file, the file is removed.
    pub fn resolve_using(&self, path: &str, side: ConflictSide) -> Result<(), GitError> {
        let mut index = self.repo.index()?;
        let conflict = index
            .conflicts()?
            .filter_map(Result::ok)
            .find(|c| {
                [&c.our, &c.their, &c.ancestor]
                    .into_iter()
                    .flatten()
                    .any(|entry| entry.path == path.as_bytes())
            })
            .ok_or_else(|| GitError::NotConflicted {
                path: path.to_string(),
            })?;

        let chosen = match side {
            ConflictSide::Ours => conflict.our,
            ConflictSide::Theirs => conflict.their,
        };
        let full = self.work_dir()?.join(path);
        let io_err = |source| GitError::Io {
            path: full.clone(),
            source,
        };

        match chosen {
            Some(entry) => {
                let blob = self.repo.find_blob(entry.id)?;
                if let Some(parent) = full.parent() {
                    std::fs::create_dir_all(parent).map_err(io_err)?;
                }
                std::fs::write(&full, blob.content()).map_err(io_err)?;
                index
                    .add_path(Path::new(path))
                    .map_err(|e| GitError::from_git2(e, path))?;
            }
            None => {
                if full.exists() {
                    std::fs::remove_file(&full).map_err(io_err)?;
                }
                index
                    .remove_path(Path::new(path))
                    .map_err(|e| GitError::from_git2(e, path))?;
            }
        }
        index.write()?;
        Ok(())
    }

    /// Mark a conflicted path resolved with its current working-tree content.
    pub fn mark_resolved(&self, path: &str) -> Result<(), GitError> {
        if !self.conflicted_paths()?.iter().any(|p| p == path) {
            return Err(GitError::NotConflicted {
                path: path.to_string(),
            });
        }
        let mut index = self.repo.index()?;
        if self.work_dir()?.join(path).exists() {
            index.add_path(Path::new(path))
        } else {
            index.remove_path(Path::new(path))
        }
        .map_err(|e| GitError::from_git2(e, path))?;
        index.write()?;
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Handle the cases that need no merge or rebase: up to date and fast
    /// forward. Anything else is returned for the caller to integrate.
    fn plan_integration(&self, refname: &str) -> Result<Plan<'_>, GitError> {
        let reference = self
            .repo
            .resolve_reference_from_short_name(refname)
            .map_err(|e| GitError::from_git2(e, refname))?;
        let theirs = self.repo.reference_to_annotated_commit(&reference)?;
        let (analysis, _) = self.repo.merge_analysis(&[&theirs])?;

        if analysis.is_up_to_date() {
            return Ok(Plan::Done(IntegrationOutcome::UpToDate));
        }
        if analysis.is_unborn() || analysis.is_fast_forward() {
            let head = self.fast_forward_to(theirs.id(), refname)?;
            return Ok(Plan::Done(IntegrationOutcome::FastForward { head }));
        }

        let ours = self.repo.head()?.peel_to_commit()?;
        self.single_merge_base(ours.id(), theirs.id())?;
        Ok(Plan::Diverged(theirs))
    }

    fn fast_forward_to(&self, target: git2::Oid, refname: &str) -> Result<Oid, GitError> {
        let commit = self.repo.find_commit(target)?;
        self.checkout_tree_safely(commit.as_object())?;

        let log = format!("fast-forward to {refname}");
        match self.repo.head() {
            Ok(mut head) => {
                head.set_target(target, &log)?;
            }
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                let head = self.repo.find_reference("HEAD")?;
                let branch = head.symbolic_target().ok_or_else(|| GitError::RefNotFound {
                    refname: "HEAD".to_string(),
                })?;
                self.repo.reference(branch, target, true, &log)?;
            }
            Err(e) => return Err(GitError::from_git2(e, "HEAD")),
        }
        to_oid(target)
    }

    fn drive_rebase(&self, rebase: &mut git2::Rebase<'_>) -> Result<IntegrationOutcome, GitError> {
        let signature = self.repo.signature()?;
        while let Some(step) = rebase.next() {
            if let Err(e) = step {
                return Err(self.with_blocking_paths(e, "rebase"));
            }
            if self.has_conflicts()? {
                return Ok(IntegrationOutcome::Conflicts {
                    paths: self.conflict_changes()?,
                });
            }
            match rebase.commit(None, &signature, None) {
                Ok(_) => {}
                // The step changed nothing on top of the new base.
                Err(e) if e.code() == git2::ErrorCode::Applied => {}
                Err(e) => return Err(GitError::from_git2(e, "rebase")),
            }
        }
        rebase.finish(Some(&signature))?;
        Ok(IntegrationOutcome::Rebased {
            head: self.head_oid()?,
        })
    }

    fn conflict_changes(&self) -> Result<Vec<FileChange>, GitError> {
        Ok(self
            .conflicted_paths()?
            .into_iter()
            .map(|path| FileChange::new(path, ChangeKind::Conflicted))
            .collect())
    }

    /// Attach the dirty paths to a checkout conflict raised mid-operation.
    fn with_blocking_paths(&self, err: git2::Error, context: &str) -> GitError {
        match GitError::from_git2(err, context) {
            GitError::CheckoutConflict { message, .. } => {
                let paths = self
                    .status()
                    .map(|s| {
                        s.staged
                            .iter()
                            .chain(s.unstaged.iter())
                            .map(|c| c.path.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                GitError::CheckoutConflict { paths, message }
            }
            other => other,
        }
    }

    fn is_tracked(&self, path: &str) -> bool {
        self.repo
            .index()
            .map(|index| index.get_path(Path::new(path), 0).is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_report_conflicts() {
        assert!(!IntegrationOutcome::UpToDate.has_conflicts());
        assert!(IntegrationOutcome::Conflicts { paths: Vec::new() }.has_conflicts());
    }
}
