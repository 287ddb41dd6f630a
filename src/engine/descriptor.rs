//! engine::descriptor
//!
//! What was requested and what came of it.
//!
//! An [`OperationDescriptor`] is created per request and travels with every
//! lifecycle event for that request. Its payload carries enough context for
//! a listener to react without re-querying, e.g. the branch a checkout left
//! so a view can roll its selection back when the checkout fails.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::OpError;
use crate::core::types::{BranchInfo, ConflictSide, FileChange, Oid, PullStrategy, ResetMode, StashEntry};
use crate::git::{IntegrationOutcome, PushReport};

/// Kinds of repository operation. Every kind mutates the repository and
/// therefore runs on the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    OpenWorkingCopy,
    CloseWorkingCopy,
    Checkout,
    Stage,
    Unstage,
    Discard,
    Commit,
    Push,
    Pull(PullStrategy),
    Merge,
    MergeContinue,
    MergeAbort,
    RebaseContinue,
    RebaseAbort,
    Resolve,
    StashCreate,
    StashApply,
    StashPop,
    StashDrop,
    StashDropAll,
    Reset,
    BranchCreate,
    BranchDelete,
    TagCreate,
    TagDelete,
    ConfigUpdate,
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::OpenWorkingCopy => "open",
            OperationKind::CloseWorkingCopy => "close",
            OperationKind::Checkout => "checkout",
            OperationKind::Stage => "stage",
            OperationKind::Unstage => "unstage",
            OperationKind::Discard => "discard",
            OperationKind::Commit => "commit",
            OperationKind::Push => "push",
            OperationKind::Pull(PullStrategy::Merge) => "pull (merge)",
            OperationKind::Pull(PullStrategy::Rebase) => "pull (rebase)",
            OperationKind::Merge => "merge",
            OperationKind::MergeContinue => "merge continue",
            OperationKind::MergeAbort => "merge abort",
            OperationKind::RebaseContinue => "rebase continue",
            OperationKind::RebaseAbort => "rebase abort",
            OperationKind::Resolve => "resolve",
            OperationKind::StashCreate => "stash",
            OperationKind::StashApply => "stash apply",
            OperationKind::StashPop => "stash pop",
            OperationKind::StashDrop => "stash drop",
            OperationKind::StashDropAll => "stash clear",
            OperationKind::Reset => "reset",
            OperationKind::BranchCreate => "branch create",
            OperationKind::BranchDelete => "branch delete",
            OperationKind::TagCreate => "tag create",
            OperationKind::TagDelete => "tag delete",
            OperationKind::ConfigUpdate => "config update",
        }
    }

    /// Operations that talk to a remote.
    pub fn is_remote(&self) -> bool {
        matches!(self, OperationKind::Push | OperationKind::Pull(_))
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies a stash entry by position or by its commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StashRef {
    Index(usize),
    Commit(Oid),
}

impl Default for StashRef {
    fn default() -> Self {
        StashRef::Index(0)
    }
}

impl fmt::Display for StashRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StashRef::Index(index) => write!(f, "stash@{{{}}}", index),
            StashRef::Commit(oid) => write!(f, "{}", oid.short(7)),
        }
    }
}

/// How a conflicted path is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Take one side's version.
    Take(ConflictSide),
    /// Keep the working-tree content as edited.
    AsEdited,
}

/// Request details, by operation kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationPayload {
    Open {
        path: PathBuf,
    },
    Checkout {
        /// Branch name or revision being switched to.
        target: String,
        /// Where HEAD was when the switch was requested.
        previous: Option<BranchInfo>,
        /// Uncommitted changes are stashed before switching.
        auto_stash: bool,
    },
    Paths {
        paths: Vec<String>,
    },
    Commit {
        message: String,
    },
    Remote {
        remote: String,
    },
    Merge {
        source: String,
    },
    Resolve {
        path: String,
        resolution: Resolution,
    },
    Stash {
        entry: Option<StashRef>,
        message: Option<String>,
    },
    Reset {
        revision: String,
        mode: ResetMode,
    },
    Branch {
        name: String,
        start: Option<String>,
    },
    Tag {
        name: String,
        message: Option<String>,
    },
    Config {
        key: String,
        value: String,
    },
}

/// One requested operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub id: Uuid,
    pub kind: OperationKind,
    pub payload: Option<OperationPayload>,
    pub requested_at: DateTime<Utc>,
}

impl OperationDescriptor {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload: None,
            requested_at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: OperationPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// The branch HEAD was on when a checkout was requested.
    pub fn previous_branch(&self) -> Option<&BranchInfo> {
        match &self.payload {
            Some(OperationPayload::Checkout { previous, .. }) => previous.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Some(OperationPayload::Checkout { target, .. }) => write!(f, "{} {}", self.kind, target),
            Some(OperationPayload::Branch { name, .. }) | Some(OperationPayload::Tag { name, .. }) => {
                write!(f, "{} {}", self.kind, name)
            }
            Some(OperationPayload::Merge { source }) => write!(f, "{} {}", self.kind, source),
            Some(OperationPayload::Stash {
                entry: Some(entry), ..
            }) => write!(f, "{} {}", self.kind, entry),
            _ => write!(f, "{}", self.kind),
        }
    }
}

/// What a pull did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOutcome {
    pub remote: String,
    pub strategy: PullStrategy,
    /// Remote-tracking ref that was integrated.
    pub source: String,
    pub result: IntegrationOutcome,
}

/// Result payload of a successful operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Completed with nothing further to report.
    Done,
    Opened {
        work_dir: PathBuf,
    },
    Committed {
        oid: Oid,
    },
    Switched {
        branch: BranchInfo,
        /// Stash created before switching, if any.
        stash: Option<StashEntry>,
    },
    /// `None` when there was nothing to stash.
    Stashed(Option<StashEntry>),
    StashApplied {
        entry: StashEntry,
        /// Paths left in conflict; empty on a clean apply.
        conflicts: Vec<FileChange>,
        /// Pop dropped the entry. Never true when `conflicts` is non-empty.
        dropped: bool,
    },
    StashDropped {
        entries: Vec<StashEntry>,
    },
    Pulled(PullOutcome),
    Pushed(PushReport),
    Integrated(IntegrationOutcome),
    Reset {
        head: Oid,
    },
    BranchCreated {
        name: String,
        head: Oid,
    },
    TagCreated {
        name: String,
        target: Oid,
    },
}

impl OperationOutcome {
    /// Conflicts the operation left behind, if any.
    pub fn conflicts(&self) -> &[FileChange] {
        match self {
            OperationOutcome::StashApplied { conflicts, .. } => conflicts.as_slice(),
            OperationOutcome::Pulled(PullOutcome {
                result: IntegrationOutcome::Conflicts { paths },
                ..
            })
            | OperationOutcome::Integrated(IntegrationOutcome::Conflicts { paths }) => {
                paths.as_slice()
            }
            _ => &[],
        }
    }
}

/// Pull result, classified for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullSummary {
    UpToDate,
    FastForward,
    Merged,
    Rebased,
    Conflicts(Vec<FileChange>),
    Failed(String),
}

impl PullSummary {
    pub fn from_result(result: &Result<OperationOutcome, OpError>) -> Self {
        match result {
            Ok(OperationOutcome::Pulled(pull)) => match &pull.result {
                IntegrationOutcome::UpToDate => PullSummary::UpToDate,
                IntegrationOutcome::FastForward { .. } => PullSummary::FastForward,
                IntegrationOutcome::Merged { .. } => PullSummary::Merged,
                IntegrationOutcome::Rebased { .. } => PullSummary::Rebased,
                IntegrationOutcome::Conflicts { paths } => PullSummary::Conflicts(paths.clone()),
            },
            Ok(other) => PullSummary::Failed(format!("unexpected outcome {other:?}")),
            Err(e) => PullSummary::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ChangeKind;

    fn oid(c: char) -> Oid {
        Oid::new(c.to_string().repeat(40)).unwrap()
    }

    #[test]
    fn descriptors_are_unique() {
        let a = OperationDescriptor::new(OperationKind::Commit);
        let b = OperationDescriptor::new(OperationKind::Commit);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn checkout_payload_exposes_previous_branch() {
        let previous = BranchInfo::detached(oid('a'));
        let descriptor =
            OperationDescriptor::new(OperationKind::Checkout).with_payload(OperationPayload::Checkout {
                target: "feature".into(),
                previous: Some(previous.clone()),
                auto_stash: true,
            });
        assert_eq!(descriptor.previous_branch(), Some(&previous));
        assert_eq!(descriptor.to_string(), "checkout feature");
    }

    #[test]
    fn stash_ref_display() {
        assert_eq!(StashRef::Index(2).to_string(), "stash@{2}");
        assert_eq!(StashRef::Commit(oid('b')).to_string(), "bbbbbbb");
    }

    #[test]
    fn pull_summary_classification() {
        let pulled = |result| {
            Ok(OperationOutcome::Pulled(PullOutcome {
                remote: "origin".into(),
                strategy: PullStrategy::Merge,
                source: "refs/remotes/origin/main".into(),
                result,
            }))
        };
        assert_eq!(
            PullSummary::from_result(&pulled(IntegrationOutcome::UpToDate)),
            PullSummary::UpToDate
        );
        let conflict = vec![FileChange::new("a.txt", ChangeKind::Conflicted)];
        assert_eq!(
            PullSummary::from_result(&pulled(IntegrationOutcome::Conflicts {
                paths: conflict.clone()
            })),
            PullSummary::Conflicts(conflict)
        );
        assert!(matches!(
            PullSummary::from_result(&Err(OpError::NoRepositoryOpen)),
            PullSummary::Failed(_)
        ));
    }

    #[test]
    fn outcome_conflicts() {
        let outcome = OperationOutcome::Integrated(IntegrationOutcome::Conflicts {
            paths: vec![FileChange::new("x", ChangeKind::Conflicted)],
        });
        assert_eq!(outcome.conflicts().len(), 1);
        assert!(OperationOutcome::Done.conflicts().is_empty());
    }
}
