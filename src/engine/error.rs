//! engine::error
//!
//! Error types for scheduling and for requested operations.
//!
//! [`OpError`] is what listeners see in a `Failed` event and what an
//! operation ticket resolves to. Library errors are classified into it
//! once, at the worker boundary, with the original [`GitError`] kept as the
//! source for diagnostics.

use thiserror::Error;

use crate::core::ops::LockError;
use crate::git::GitError;

/// Errors from the operation scheduler itself.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `shutdown()` was called; no new tasks are accepted.
    #[error("scheduler is closed")]
    Closed,

    /// The task was queued but dropped during a discarding shutdown.
    #[error("task discarded before it started")]
    Discarded,

    /// The task panicked. The worker survived.
    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("failed to start scheduler worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Why a requested operation failed.
#[derive(Debug, Error)]
pub enum OpError {
    #[error("no repository is open")]
    NoRepositoryOpen,

    #[error("operation queue is closed")]
    SchedulerClosed,

    /// Uncommitted changes would be overwritten; nothing was touched.
    #[error("local changes would be overwritten: {}", describe_paths(paths))]
    CheckoutConflict {
        paths: Vec<String>,
        #[source]
        source: GitError,
    },

    /// Conflicted paths must be resolved first.
    #[error("unresolved conflicts: {}", describe_paths(paths))]
    UnresolvedConflicts {
        paths: Vec<String>,
        #[source]
        source: Option<GitError>,
    },

    /// More than one common ancestor; no resolution policy is applied.
    #[error("ambiguous merge base ({count} candidates); merge manually")]
    MergeBaseAmbiguous { count: usize },

    #[error("stash entry not found: {reference}")]
    StashNotFound { reference: String },

    #[error("remote authentication failed")]
    RemoteAuthFailure(#[source] GitError),

    #[error("remote unreachable")]
    RemoteUnreachable(#[source] GitError),

    /// Fatal for the session: the handle accepts no further mutations.
    #[error("repository is corrupt: {message}")]
    RepositoryCorrupt {
        message: String,
        #[source]
        source: Option<GitError>,
    },

    /// The operation does not apply in the current repository state.
    #[error("{message}")]
    InvalidState { message: String },

    /// The working copy is already orchestrated by another process.
    #[error("working copy is in use")]
    WorkingCopyLocked(#[source] LockError),

    /// Dropped before it ran, either by choice or by a discarding shutdown.
    #[error("operation cancelled")]
    Cancelled,

    #[error("{message}")]
    GenericLibraryFailure {
        message: String,
        #[source]
        source: Option<GitError>,
    },
}

impl OpError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        OpError::InvalidState {
            message: message.into(),
        }
    }

    pub fn generic(message: impl Into<String>) -> Self {
        OpError::GenericLibraryFailure {
            message: message.into(),
            source: None,
        }
    }

    /// No further mutation should be attempted this session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OpError::RepositoryCorrupt { .. })
    }

    /// Worth retrying by hand once the network or credentials are fixed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OpError::RemoteAuthFailure(_) | OpError::RemoteUnreachable(_)
        )
    }

    /// Paths named by a conflict error.
    pub fn paths(&self) -> &[String] {
        match self {
            OpError::CheckoutConflict { paths, .. } | OpError::UnresolvedConflicts { paths, .. } => {
                paths.as_slice()
            }
            _ => &[],
        }
    }

    /// Stable short name, used in logs and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            OpError::NoRepositoryOpen => "no-repository",
            OpError::SchedulerClosed => "scheduler-closed",
            OpError::CheckoutConflict { .. } => "checkout-conflict",
            OpError::UnresolvedConflicts { .. } => "unresolved-conflicts",
            OpError::MergeBaseAmbiguous { .. } => "merge-base-ambiguous",
            OpError::StashNotFound { .. } => "stash-not-found",
            OpError::RemoteAuthFailure(_) => "remote-auth",
            OpError::RemoteUnreachable(_) => "remote-unreachable",
            OpError::RepositoryCorrupt { .. } => "repository-corrupt",
            OpError::InvalidState { .. } => "invalid-state",
            OpError::WorkingCopyLocked(_) => "working-copy-locked",
            OpError::Cancelled => "cancelled",
            OpError::GenericLibraryFailure { .. } => "library-failure",
        }
    }
}

impl From<GitError> for OpError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::CheckoutConflict { ref paths, .. } => OpError::CheckoutConflict {
                paths: paths.clone(),
                source: err,
            },
            GitError::UnmergedEntries { ref paths } => OpError::UnresolvedConflicts {
                paths: paths.clone(),
                source: Some(err),
            },
            GitError::AmbiguousMergeBase { count } => OpError::MergeBaseAmbiguous { count },
            GitError::StashNotFound { reference } => OpError::StashNotFound { reference },
            GitError::AuthFailed { .. } => OpError::RemoteAuthFailure(err),
            GitError::Unreachable { .. } => OpError::RemoteUnreachable(err),
            GitError::Corrupt { ref message } => OpError::RepositoryCorrupt {
                message: message.clone(),
                source: Some(err),
            },
            GitError::NotInProgress { .. }
            | GitError::NoUpstream { .. }
            | GitError::DetachedHead { .. }
            | GitError::NothingToCommit
            | GitError::BranchCheckedOut { .. } => OpError::InvalidState {
                message: err.to_string(),
            },
            other => OpError::GenericLibraryFailure {
                message: other.to_string(),
                source: Some(other),
            },
        }
    }
}

impl From<LockError> for OpError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::AlreadyLocked { .. } => OpError::WorkingCopyLocked(err),
            other => OpError::GenericLibraryFailure {
                message: other.to_string(),
                source: None,
            },
        }
    }
}

fn describe_paths(paths: &[String]) -> String {
    match paths.len() {
        0 => "(paths unknown)".to_string(),
        1..=5 => paths.join(", "),
        n => format!("{} and {} more", paths[..5].join(", "), n - 5),
    }
}
