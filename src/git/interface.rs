//! git::interface
//!
//! Git interface implementation using git2.
//!
//! This module provides the **single doorway** to the repository. The
//! scheduler's worker owns one [`Git`] for mutations; read-only state
//! queries open their own short-lived instance. No other module imports
//! `git2`.
//!
//! # Error Handling
//!
//! libgit2 failures are classified once, here, into [`GitError`] variants
//! that the engine maps onto its operation error taxonomy:
//! - [`GitError::CheckoutConflict`]: local changes would be overwritten
//! - [`GitError::UnmergedEntries`]: the index still has conflicts
//! - [`GitError::AuthFailed`] / [`GitError::Unreachable`]: remote transport
//! - [`GitError::Corrupt`]: object database damage
//!
//! # Example
//!
//! ```ignore
//! use stagehand::git::Git;
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("."))?;
//! let head = git.head_info()?;
//! println!("on {}", head);
//! ```

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::types::{
    BranchInfo, BranchName, ChangeKind, FileChange, Oid, ResetMode, TypeError,
};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not inside a Git repository.
    #[error("not a git repository: {path}")]
    NotARepo { path: PathBuf },

    /// Repository is bare (no working directory).
    #[error("bare repository not supported")]
    BareRepo,

    /// Requested ref or revision does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound { refname: String },

    #[error("invalid object id: {oid}")]
    InvalidOid { oid: String },

    #[error("invalid name: {message}")]
    InvalidName { message: String },

    /// Checkout refused because uncommitted changes would be overwritten.
    #[error("checkout conflict: {message}")]
    CheckoutConflict {
        /// Paths that block the checkout, when known.
        paths: Vec<String>,
        message: String,
    },

    /// The index has unresolved conflicts.
    #[error("unresolved conflicts in {} file(s)", paths.len())]
    UnmergedEntries { paths: Vec<String> },

    /// Path is not in conflict.
    #[error("no conflict recorded for {path}")]
    NotConflicted { path: String },

    #[error("stash entry not found: {reference}")]
    StashNotFound { reference: String },

    #[error("nothing to commit")]
    NothingToCommit,

    #[error("commit message is empty")]
    EmptyMessage,

    /// Refused to delete the branch HEAD points at.
    #[error("branch '{name}' is checked out")]
    BranchCheckedOut { name: String },

    #[error("branch '{name}' already exists")]
    BranchExists { name: String },

    /// Continue/abort requested with no matching operation in progress.
    #[error("no {operation} in progress (repository state: {state})")]
    NotInProgress {
        operation: &'static str,
        state: GitState,
    },

    /// More than one merge base; no resolution policy is applied.
    #[error("ambiguous merge base: {count} candidates")]
    AmbiguousMergeBase { count: usize },

    #[error("branch '{branch}' has no upstream")]
    NoUpstream { branch: String },

    /// The operation needs HEAD on a branch.
    #[error("cannot {operation} with a detached HEAD")]
    DetachedHead { operation: &'static str },

    #[error("authentication failed: {message}")]
    AuthFailed { message: String },

    #[error("remote unreachable: {message}")]
    Unreachable { message: String },

    /// The remote refused a ref update.
    #[error("push of {refname} rejected: {message}")]
    Rejected { refname: String, message: String },

    /// Object database or index damage.
    #[error("repository corrupt: {message}")]
    Corrupt { message: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Unclassified git2 error.
    #[error("git error: {message}")]
    Internal { message: String },
}

impl GitError {
    /// Classify a git2 error. `context` names what was being done or looked up.
    pub(crate) fn from_git2(err: git2::Error, context: &str) -> Self {
        use git2::{ErrorClass as Class, ErrorCode as Code};

        let message = if context.is_empty() {
            err.message().to_string()
        } else {
            format!("{}: {}", context, err.message())
        };

        match (err.code(), err.class()) {
            (Code::Auth | Code::Certificate, _) => GitError::AuthFailed { message },
            (_, Class::Net | Class::Http | Class::Ssh | Class::Ssl) => {
                GitError::Unreachable { message }
            }
            (Code::Conflict | Code::MergeConflict, _) => GitError::CheckoutConflict {
                paths: Vec::new(),
                message,
            },
            (Code::Unmerged, _) => GitError::UnmergedEntries { paths: Vec::new() },
            (Code::NotFound, Class::Stash) => GitError::StashNotFound {
                reference: context.to_string(),
            },
            (Code::HashsumMismatch, _) | (_, Class::Zlib) => GitError::Corrupt { message },
            (code, Class::Odb) if code != Code::NotFound => GitError::Corrupt { message },
            (Code::NotFound | Code::UnbornBranch, _) => GitError::RefNotFound {
                refname: context.to_string(),
            },
            (Code::InvalidSpec, _) => GitError::InvalidName { message },
            (Code::Locked, _) => GitError::Internal {
                message: format!("repository is locked: {}", err.message()),
            },
            _ => GitError::Internal { message },
        }
    }

    /// True for damage that makes further writes unsafe.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, GitError::Corrupt { .. })
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        GitError::from_git2(err, "")
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(oid) => GitError::InvalidOid { oid },
            other => GitError::InvalidName {
                message: other.to_string(),
            },
        }
    }
}

/// Information about a Git repository.
#[derive(Debug, Clone)]
pub struct RepoInfo {
    /// Path to .git directory
    pub git_dir: PathBuf,
    /// Path to working directory
    pub work_dir: PathBuf,
}

/// State of in-progress Git operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitState {
    /// No operation in progress.
    Clean,

    /// Rebase in progress.
    Rebase {
        /// Current step in the rebase (1-indexed), if available.
        current: Option<usize>,
        /// Total steps in the rebase, if available.
        total: Option<usize>,
    },

    /// Merge in progress.
    Merge,

    CherryPick,

    Revert,

    Bisect,

    ApplyMailbox,
}

impl GitState {
    /// Check if any operation is in progress.
    ///
    /// ```
    /// use stagehand::git::GitState;
    ///
    /// assert!(!GitState::Clean.is_in_progress());
    /// assert!(GitState::Merge.is_in_progress());
    /// ```
    pub fn is_in_progress(&self) -> bool {
        !matches!(self, GitState::Clean)
    }

    pub fn is_merge(&self) -> bool {
        matches!(self, GitState::Merge)
    }

    pub fn is_rebase(&self) -> bool {
        matches!(self, GitState::Rebase { .. })
    }

    pub fn description(&self) -> &'static str {
        match self {
            GitState::Clean => "clean",
            GitState::Rebase { .. } => "rebase",
            GitState::Merge => "merge",
            GitState::CherryPick => "cherry-pick",
            GitState::Revert => "revert",
            GitState::Bisect => "bisect",
            GitState::ApplyMailbox => "apply-mailbox",
        }
    }
}

impl std::fmt::Display for GitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitState::Rebase {
                current: Some(c),
                total: Some(t),
            } => write!(f, "rebase ({}/{})", c, t),
            _ => write!(f, "{}", self.description()),
        }
    }
}

/// Working tree status split into three disjoint sets.
///
/// A conflicted path appears only in `conflicted`. A path with working-tree
/// changes appears only in `unstaged`, even if it also has staged changes,
/// because staging it again is what the user would do next. A path appears
/// in `staged` only when its working-tree copy matches the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub staged: Vec<FileChange>,
    pub unstaged: Vec<FileChange>,
    pub conflicted: Vec<FileChange>,
    /// How many `unstaged` entries are untracked files.
    pub untracked: usize,
}

impl StatusSnapshot {
    /// No staged, unstaged, untracked or conflicted entries.
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty() && self.unstaged.is_empty() && self.conflicted.is_empty()
    }

    /// Changes to tracked files, staged or not. Untracked files excluded.
    pub fn has_tracked_changes(&self) -> bool {
        !self.staged.is_empty() || self.unstaged.len() > self.untracked
    }
}

/// Information about a commit.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub oid: Oid,
    /// First line of the commit message
    pub summary: String,
    pub author_name: String,
    pub author_time: chrono::DateTime<chrono::Utc>,
}

/// The Git interface.
///
/// Wraps one `git2::Repository`. Instances are `Send` but not `Sync`; the
/// scheduler worker keeps the writing instance and readers open their own.
pub struct Git {
    pub(super) repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

pub(super) fn to_oid(oid: git2::Oid) -> Result<Oid, GitError> {
    Ok(Oid::new(oid.to_string())?)
}

pub(super) fn to_git2_oid(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
}

impl Git {
    // =========================================================================
    // Repository Opening and Info
    // =========================================================================

    /// Open the repository containing `path`.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if no repository is found
    /// - [`GitError::BareRepo`] if the repository has no working directory
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::discover(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;

        if repo.is_bare() {
            return Err(GitError::BareRepo);
        }

        Ok(Self { repo })
    }

    /// Create a new repository at `path` and open it.
    pub fn init(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::init(path)
            .map_err(|e| GitError::from_git2(e, &path.display().to_string()))?;
        Ok(Self { repo })
    }

    pub fn info(&self) -> Result<RepoInfo, GitError> {
        Ok(RepoInfo {
            git_dir: self.repo.path().to_path_buf(),
            work_dir: self.work_dir()?.to_path_buf(),
        })
    }

    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    pub fn work_dir(&self) -> Result<&Path, GitError> {
        self.repo.workdir().ok_or(GitError::BareRepo)
    }

    // =========================================================================
    // State Detection
    // =========================================================================

    /// Get the current Git state (rebase, merge, etc.).
    pub fn state(&self) -> GitState {
        match self.repo.state() {
            git2::RepositoryState::Clean => GitState::Clean,
            git2::RepositoryState::Rebase
            | git2::RepositoryState::RebaseInteractive
            | git2::RepositoryState::RebaseMerge => {
                let (current, total) = self.read_rebase_progress();
                GitState::Rebase { current, total }
            }
            git2::RepositoryState::Merge => GitState::Merge,
            git2::RepositoryState::CherryPick | git2::RepositoryState::CherryPickSequence => {
                GitState::CherryPick
            }
            git2::RepositoryState::Revert | git2::RepositoryState::RevertSequence => {
                GitState::Revert
            }
            git2::RepositoryState::Bisect => GitState::Bisect,
            git2::RepositoryState::ApplyMailbox | git2::RepositoryState::ApplyMailboxOrRebase => {
                GitState::ApplyMailbox
            }
        }
    }

    /// Read rebase progress from .git/rebase-merge or .git/rebase-apply.
    fn read_rebase_progress(&self) -> (Option<usize>, Option<usize>) {
        let read = |dir: &Path, file: &str| -> Option<usize> {
            std::fs::read_to_string(dir.join(file))
                .ok()
                .and_then(|s| s.trim().parse().ok())
        };

        let merge_dir = self.repo.path().join("rebase-merge");
        if merge_dir.exists() {
            return (read(&merge_dir, "msgnum"), read(&merge_dir, "end"));
        }
        let apply_dir = self.repo.path().join("rebase-apply");
        if apply_dir.exists() {
            return (read(&apply_dir, "next"), read(&apply_dir, "last"));
        }
        (None, None)
    }

    /// Check if there are unresolved conflicts in the index.
    pub fn has_conflicts(&self) -> Result<bool, GitError> {
        Ok(self.repo.index()?.has_conflicts())
    }

    /// Paths with unresolved conflicts, sorted.
    pub fn conflicted_paths(&self) -> Result<Vec<String>, GitError> {
        let index = self.repo.index()?;
        let mut paths = Vec::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let entry = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref());
            if let Some(entry) = entry {
                paths.push(String::from_utf8_lossy(&entry.path).into_owned());
            }
        }
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    // =========================================================================
    // Working Tree Status
    // =========================================================================

    /// Classify every changed path into staged, unstaged or conflicted.
    ///
    /// Each path lands in exactly one list. A path with both index and
    /// worktree changes is reported as unstaged only.
    pub fn status(&self) -> Result<StatusSnapshot, GitError> {
        use git2::Status;

        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = self.repo.statuses(Some(&mut opts))?;
        let mut snapshot = StatusSnapshot::default();

        let worktree = Status::WT_NEW
            | Status::WT_MODIFIED
            | Status::WT_DELETED
            | Status::WT_RENAMED
            | Status::WT_TYPECHANGE;
        let staged = Status::INDEX_NEW
            | Status::INDEX_MODIFIED
            | Status::INDEX_DELETED
            | Status::INDEX_RENAMED
            | Status::INDEX_TYPECHANGE;

        for entry in statuses.iter() {
            let Some(path) = entry.path() else { continue };
            let status = entry.status();

            if status.is_conflicted() {
                snapshot
                    .conflicted
                    .push(FileChange::new(path, ChangeKind::Conflicted));
            } else if status.intersects(worktree) {
                let kind = if status.is_wt_deleted() {
                    ChangeKind::Deleted
                } else if status.is_wt_new() || status.is_index_new() {
                    ChangeKind::Added
                } else if status.is_wt_modified() || status.is_wt_renamed() {
                    ChangeKind::Modified
                } else {
                    ChangeKind::Unknown
                };
                if status == Status::WT_NEW {
                    snapshot.untracked += 1;
                }
                snapshot.unstaged.push(FileChange::new(path, kind));
            } else if status.intersects(staged) {
                let kind = if status.is_index_new() {
                    ChangeKind::Added
                } else if status.is_index_deleted() {
                    ChangeKind::Deleted
                } else if status.is_index_modified() || status.is_index_renamed() {
                    ChangeKind::Modified
                } else {
                    ChangeKind::Unknown
                };
                snapshot.staged.push(FileChange::new(path, kind));
            }
        }

        snapshot.staged.sort();
        snapshot.unstaged.sort();
        snapshot.conflicted.sort();
        Ok(snapshot)
    }

    // =========================================================================
    // HEAD and Revisions
    // =========================================================================

    /// Get HEAD commit OID.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if HEAD is unborn (new repository)
    pub fn head_oid(&self) -> Result<Oid, GitError> {
        let commit = self
            .repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|e| GitError::from_git2(e, "HEAD"))?;
        to_oid(commit.id())
    }

    /// HEAD commit OID, or `None` on an unborn branch.
    pub fn try_head_oid(&self) -> Result<Option<Oid>, GitError> {
        match self.head_oid() {
            Ok(oid) => Ok(Some(oid)),
            Err(GitError::RefNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolve any revision expression to a commit.
    pub fn resolve_revision(&self, rev: &str) -> Result<Oid, GitError> {
        let commit = self
            .repo
            .revparse_single(rev)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|e| GitError::from_git2(e, rev))?;
        to_oid(commit.id())
    }

    /// What HEAD points at: a branch (possibly unborn) or a commit.
    pub fn head_info(&self) -> Result<BranchInfo, GitError> {
        if self.repo.head_detached()? {
            return Ok(BranchInfo::detached(self.head_oid()?));
        }

        let head = self
            .repo
            .find_reference("HEAD")
            .map_err(|e| GitError::from_git2(e, "HEAD"))?;
        let target = head
            .symbolic_target()
            .ok_or_else(|| GitError::RefNotFound {
                refname: "HEAD".to_string(),
            })?;
        let name = target.strip_prefix("refs/heads/").unwrap_or(target);
        let branch = BranchName::new(name)?;
        Ok(BranchInfo::attached(&branch, self.try_head_oid()?))
    }

    pub fn is_head_detached(&self) -> Result<bool, GitError> {
        Ok(self.repo.head_detached()?)
    }

    /// Get the current branch name, if on a branch.
    pub fn current_branch(&self) -> Result<Option<BranchName>, GitError> {
        let info = self.head_info()?;
        match info.branch() {
            Some(name) => Ok(Some(BranchName::new(name)?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Branches
    // =========================================================================

    /// Local branch names, sorted.
    pub fn list_branches(&self) -> Result<Vec<BranchName>, GitError> {
        let mut names = Vec::new();
        for branch in self.repo.branches(Some(git2::BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                names.push(BranchName::new(name)?);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remote-tracking branch short names (`origin/main`), sorted.
    pub fn list_remote_branches(&self) -> Result<Vec<String>, GitError> {
        let mut names = Vec::new();
        for branch in self.repo.branches(Some(git2::BranchType::Remote))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                if !name.ends_with("/HEAD") {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn branch_exists(&self, name: &BranchName) -> bool {
        self.repo
            .find_branch(name.as_str(), git2::BranchType::Local)
            .is_ok()
    }

    /// Create a branch at `start` (a revision), or at HEAD.
    pub fn create_branch(&self, name: &BranchName, start: Option<&str>) -> Result<Oid, GitError> {
        if self.branch_exists(name) {
            return Err(GitError::BranchExists {
                name: name.to_string(),
            });
        }
        let target = self.resolve_revision(start.unwrap_or("HEAD"))?;
        let commit = self.repo.find_commit(to_git2_oid(&target)?)?;
        self.repo
            .branch(name.as_str(), &commit, false)
            .map_err(|e| GitError::from_git2(e, name.as_str()))?;
        Ok(target)
    }

    pub fn delete_branch(&self, name: &BranchName) -> Result<(), GitError> {
        if self.current_branch()?.as_ref() == Some(name) {
            return Err(GitError::BranchCheckedOut {
                name: name.to_string(),
            });
        }
        let mut branch = self
            .repo
            .find_branch(name.as_str(), git2::BranchType::Local)
            .map_err(|e| GitError::from_git2(e, name.as_str()))?;
        branch.delete()?;
        Ok(())
    }

    /// Full name of the upstream ref configured for `branch`, if any.
    pub fn upstream_of(&self, branch: &BranchName) -> Result<Option<String>, GitError> {
        match self
            .repo
            .branch_upstream_name(&format!("refs/heads/{}", branch))
        {
            Ok(buf) => Ok(buf.as_str().map(str::to_string)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, branch.as_str())),
        }
    }

    /// Point `branch` at `remote_branch` (e.g. `origin/main`) for pull/push.
    pub fn set_upstream(&self, branch: &BranchName, remote_branch: &str) -> Result<(), GitError> {
        let mut local = self
            .repo
            .find_branch(branch.as_str(), git2::BranchType::Local)
            .map_err(|e| GitError::from_git2(e, branch.as_str()))?;
        local
            .set_upstream(Some(remote_branch))
            .map_err(|e| GitError::from_git2(e, remote_branch))
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Switch to a local branch. Refuses, leaving everything untouched, when
    /// uncommitted changes would be overwritten.
    pub fn checkout_branch(&self, name: &BranchName) -> Result<BranchInfo, GitError> {
        let refname = format!("refs/heads/{}", name);
        let commit = self
            .repo
            .find_reference(&refname)
            .and_then(|r| r.peel_to_commit())
            .map_err(|e| GitError::from_git2(e, &refname))?;

        self.checkout_tree_safely(commit.as_object())?;
        self.repo
            .set_head(&refname)
            .map_err(|e| GitError::from_git2(e, &refname))?;
        self.head_info()
    }

    /// Detach HEAD at `rev`.
    pub fn checkout_detached(&self, rev: &str) -> Result<BranchInfo, GitError> {
        let oid = self.resolve_revision(rev)?;
        let commit = self.repo.find_commit(to_git2_oid(&oid)?)?;

        self.checkout_tree_safely(commit.as_object())?;
        self.repo.set_head_detached(commit.id())?;
        self.head_info()
    }

    /// Safe checkout of `target`, collecting the paths that block it.
    pub(super) fn checkout_tree_safely(&self, target: &git2::Object<'_>) -> Result<(), GitError> {
        let blocked = RefCell::new(Vec::new());
        let result = {
            let mut opts = git2::build::CheckoutBuilder::new();
            opts.safe()
                .notify_on(git2::CheckoutNotificationType::CONFLICT)
                .notify(|_, path, _, _, _| {
                    if let Some(path) = path {
                        blocked
                            .borrow_mut()
                            .push(path.to_string_lossy().replace('\\', "/"));
                    }
                    true
                });
            self.repo.checkout_tree(target, Some(&mut opts))
        };

        result.map_err(|e| match GitError::from_git2(e, "checkout") {
            GitError::CheckoutConflict { message, .. } => {
                let mut paths = blocked.into_inner();
                paths.sort();
                paths.dedup();
                GitError::CheckoutConflict { paths, message }
            }
            other => other,
        })
    }

    // =========================================================================
    // Index
    // =========================================================================

    /// Stage paths. Paths missing from the working tree are staged as deletions.
    pub fn stage(&self, paths: &[String]) -> Result<(), GitError> {
        let work_dir = self.work_dir()?.to_path_buf();
        let mut index = self.repo.index()?;
        for path in paths {
            let relative = Path::new(path);
            if work_dir.join(relative).exists() {
                index
                    .add_path(relative)
                    .map_err(|e| GitError::from_git2(e, path))?;
            } else {
                index
                    .remove_path(relative)
                    .map_err(|e| GitError::from_git2(e, path))?;
            }
        }
        index.write()?;
        Ok(())
    }

    /// Stage every change, deletions and untracked files included.
    pub fn stage_all(&self) -> Result<(), GitError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"], git2::IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"], None)?;
        index.write()?;
        Ok(())
    }

    /// Reset index entries for `paths` back to HEAD, keeping working-tree edits.
    pub fn unstage(&self, paths: &[String]) -> Result<(), GitError> {
        match self.repo.head().and_then(|h| h.peel_to_commit()) {
            Ok(head) => {
                self.repo
                    .reset_default(Some(head.as_object()), paths.iter().map(String::as_str))?;
            }
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                let mut index = self.repo.index()?;
                for path in paths {
                    index.remove_path(Path::new(path))?;
                }
                index.write()?;
            }
            Err(e) => return Err(GitError::from_git2(e, "HEAD")),
        }
        Ok(())
    }

    /// Throw away local changes to `paths`.
    ///
    /// Paths known to HEAD are restored from it, in the index and the
    /// working tree. Paths HEAD does not know are removed from the index and
    /// deleted from disk.
    pub fn discard(&self, paths: &[String]) -> Result<(), GitError> {
        let work_dir = self.work_dir()?.to_path_buf();
        let head_tree = match self.repo.head().and_then(|h| h.peel_to_tree()) {
            Ok(tree) => Some(tree),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => None,
            Err(e) => return Err(GitError::from_git2(e, "HEAD")),
        };

        let (tracked, untracked): (Vec<&String>, Vec<&String>) = paths.iter().partition(|p| {
            head_tree
                .as_ref()
                .is_some_and(|t| t.get_path(Path::new(p.as_str())).is_ok())
        });

        if !tracked.is_empty() {
            let mut opts = git2::build::CheckoutBuilder::new();
            opts.force();
            for path in &tracked {
                opts.path(path.as_str());
            }
            self.repo.checkout_head(Some(&mut opts))?;
        }

        if !untracked.is_empty() {
            let mut index = self.repo.index()?;
            for path in untracked {
                match index.remove_path(Path::new(path)) {
                    Ok(()) => {}
                    Err(e) if e.code() == git2::ErrorCode::NotFound => {}
                    Err(e) => return Err(GitError::from_git2(e, path)),
                }
                let full = work_dir.join(path);
                if full.exists() {
                    std::fs::remove_file(&full).map_err(|source| GitError::Io {
                        path: full.clone(),
                        source,
                    })?;
                }
            }
            index.write()?;
        }
        Ok(())
    }

    // =========================================================================
    // Commit and Reset
    // =========================================================================

    /// Commit the index on HEAD.
    ///
    /// While a merge is in progress the commit records every MERGE_HEAD as an
    /// extra parent and concludes the merge.
    pub fn commit(&self, message: &str) -> Result<Oid, GitError> {
        if message.trim().is_empty() {
            return Err(GitError::EmptyMessage);
        }
        let conflicts = self.conflicted_paths()?;
        if !conflicts.is_empty() {
            return Err(GitError::UnmergedEntries { paths: conflicts });
        }

        let mut index = self.repo.index()?;
        let tree = self.repo.find_tree(index.write_tree()?)?;
        let signature = self.repo.signature()?;

        let head = match self.repo.head().and_then(|h| h.peel_to_commit()) {
            Ok(commit) => Some(commit),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => None,
            Err(e) => return Err(GitError::from_git2(e, "HEAD")),
        };

        let merging = self.state().is_merge();
        let mut parents = Vec::new();
        if let Some(head) = head {
            if !merging && head.tree_id() == tree.id() {
                return Err(GitError::NothingToCommit);
            }
            parents.push(head);
        }
        if merging {
            for oid in self.merge_heads()? {
                parents.push(self.repo.find_commit(oid)?);
            }
        }
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parent_refs,
        )?;
        if merging {
            self.repo.cleanup_state()?;
        }
        to_oid(oid)
    }

    /// Commits recorded in MERGE_HEAD.
    pub(super) fn merge_heads(&self) -> Result<Vec<git2::Oid>, GitError> {
        // mergehead_foreach needs a mutable repository.
        let mut repo = git2::Repository::open(self.repo.path())?;
        let mut heads = Vec::new();
        repo.mergehead_foreach(|oid| {
            heads.push(*oid);
            true
        })?;
        Ok(heads)
    }

    /// Move the current branch to `rev`.
    pub fn reset(&self, rev: &str, mode: ResetMode) -> Result<Oid, GitError> {
        let oid = self.resolve_revision(rev)?;
        let object = self.repo.find_object(to_git2_oid(&oid)?, None)?;
        let kind = match mode {
            ResetMode::Soft => git2::ResetType::Soft,
            ResetMode::Mixed => git2::ResetType::Mixed,
            ResetMode::Hard => git2::ResetType::Hard,
        };
        self.repo.reset(&object, kind, None)?;
        Ok(oid)
    }

    // =========================================================================
    // Tags
    // =========================================================================

    pub fn list_tags(&self) -> Result<Vec<String>, GitError> {
        let names = self.repo.tag_names(None)?;
        let mut tags: Vec<String> = names.iter().flatten().map(String::from).collect();
        tags.sort();
        Ok(tags)
    }

    /// Tag HEAD. Annotated when `message` is given, lightweight otherwise.
    pub fn create_tag(&self, name: &str, message: Option<&str>) -> Result<Oid, GitError> {
        if !git2::Reference::is_valid_name(&format!("refs/tags/{name}")) {
            return Err(GitError::InvalidName {
                message: format!("invalid tag name '{name}'"),
            });
        }
        let head = self.repo.head()?.peel(git2::ObjectType::Commit)?;
        let oid = match message {
            Some(message) => {
                let tagger = self.repo.signature()?;
                self.repo.tag(name, &head, &tagger, message, false)
            }
            None => self.repo.tag_lightweight(name, &head, false),
        }
        .map_err(|e| GitError::from_git2(e, name))?;
        to_oid(oid)
    }

    pub fn delete_tag(&self, name: &str) -> Result<(), GitError> {
        self.repo
            .tag_delete(name)
            .map_err(|e| GitError::from_git2(e, &format!("refs/tags/{name}")))
    }

    // =========================================================================
    // Repository Config
    // =========================================================================

    pub fn config_get(&self, key: &str) -> Result<Option<String>, GitError> {
        let config = self.repo.config()?;
        match config.get_string(key) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, key)),
        }
    }

    /// Write `key` into the repository's own config file.
    pub fn config_set(&self, key: &str, value: &str) -> Result<(), GitError> {
        let mut config = self.repo.config()?.open_level(git2::ConfigLevel::Local)?;
        config
            .set_str(key, value)
            .map_err(|e| GitError::from_git2(e, key))
    }

    // =========================================================================
    // Ancestry Queries
    // =========================================================================

    /// The single merge base of two commits.
    ///
    /// Returns `None` for unrelated histories and
    /// [`GitError::AmbiguousMergeBase`] when there is more than one candidate.
    pub fn merge_base(&self, a: &Oid, b: &Oid) -> Result<Option<Oid>, GitError> {
        self.single_merge_base(to_git2_oid(a)?, to_git2_oid(b)?)?
            .map(to_oid)
            .transpose()
    }

    pub(super) fn single_merge_base(
        &self,
        a: git2::Oid,
        b: git2::Oid,
    ) -> Result<Option<git2::Oid>, GitError> {
        match self.repo.merge_bases(a, b) {
            Ok(bases) if bases.len() > 1 => Err(GitError::AmbiguousMergeBase { count: bases.len() }),
            Ok(bases) => Ok(bases.iter().next().copied()),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, "merge base")),
        }
    }

    /// Commits reachable from `local` but not `upstream`, and the reverse.
    pub fn ahead_behind(&self, local: &Oid, upstream: &Oid) -> Result<(usize, usize), GitError> {
        Ok(self
            .repo
            .graph_ahead_behind(to_git2_oid(local)?, to_git2_oid(upstream)?)?)
    }

    pub fn commit_info(&self, oid: &Oid) -> Result<CommitInfo, GitError> {
        let commit = self
            .repo
            .find_commit(to_git2_oid(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;
        let author = commit.author();
        let author_time = chrono::DateTime::from_timestamp(author.when().seconds(), 0)
            .unwrap_or_default();

        Ok(CommitInfo {
            oid: oid.clone(),
            summary: commit.summary().unwrap_or_default().to_string(),
            author_name: author.name().unwrap_or_default().to_string(),
            author_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod git_error {
        use super::*;
        use git2::{ErrorClass, ErrorCode};

        fn classify(code: ErrorCode, class: ErrorClass) -> GitError {
            GitError::from_git2(git2::Error::new(code, class, "boom"), "ctx")
        }

        #[test]
        fn auth_codes() {
            assert!(matches!(
                classify(ErrorCode::Auth, ErrorClass::Http),
                GitError::AuthFailed { .. }
            ));
            assert!(matches!(
                classify(ErrorCode::Certificate, ErrorClass::Ssl),
                GitError::AuthFailed { .. }
            ));
        }

        #[test]
        fn transport_classes() {
            for class in [ErrorClass::Net, ErrorClass::Http, ErrorClass::Ssh] {
                assert!(matches!(
                    classify(ErrorCode::GenericError, class),
                    GitError::Unreachable { .. }
                ));
            }
        }

        #[test]
        fn conflicts_and_unmerged() {
            assert!(matches!(
                classify(ErrorCode::Conflict, ErrorClass::Checkout),
                GitError::CheckoutConflict { .. }
            ));
            assert!(matches!(
                classify(ErrorCode::Unmerged, ErrorClass::Index),
                GitError::UnmergedEntries { .. }
            ));
        }

        #[test]
        fn stash_not_found_keeps_context() {
            match classify(ErrorCode::NotFound, ErrorClass::Stash) {
                GitError::StashNotFound { reference } => assert_eq!(reference, "ctx"),
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn corruption() {
            assert!(classify(ErrorCode::HashsumMismatch, ErrorClass::Odb).is_corrupt());
            assert!(classify(ErrorCode::GenericError, ErrorClass::Zlib).is_corrupt());
            assert!(classify(ErrorCode::GenericError, ErrorClass::Odb).is_corrupt());
            assert!(!classify(ErrorCode::NotFound, ErrorClass::Odb).is_corrupt());
        }

        #[test]
        fn everything_else_is_internal() {
            match classify(ErrorCode::GenericError, ErrorClass::Reference) {
                GitError::Internal { message } => assert_eq!(message, "ctx: boom"),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    mod git_state {
        use super::*;

        #[test]
        fn rebase_display_with_progress() {
            let state = GitState::Rebase {
                current: Some(2),
                total: Some(5),
            };
            assert_eq!(state.to_string(), "rebase (2/5)");
            assert!(state.is_rebase());
            assert!(!state.is_merge());
        }

        #[test]
        fn rebase_display_without_progress() {
            let state = GitState::Rebase {
                current: None,
                total: None,
            };
            assert_eq!(state.to_string(), "rebase");
        }
    }

    mod status_snapshot {
        use super::*;

        #[test]
        fn default_is_clean() {
            assert!(StatusSnapshot::default().is_clean());
        }

        #[test]
        fn untracked_only_is_not_tracked_change() {
            let snapshot = StatusSnapshot {
                unstaged: vec![FileChange::new("new.txt", ChangeKind::Added)],
                untracked: 1,
                ..Default::default()
            };
            assert!(!snapshot.is_clean());
            assert!(!snapshot.has_tracked_changes());
        }

        #[test]
        fn staged_is_tracked_change() {
            let snapshot = StatusSnapshot {
                staged: vec![FileChange::new("a.txt", ChangeKind::Modified)],
                ..Default::default()
            };
            assert!(snapshot.has_tracked_changes());
        }
    }
}
