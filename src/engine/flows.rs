//! engine::flows
//!
//! Composite operations: short protocols over several primitives.
//!
//! # Safe switch
//!
//! Switching with uncommitted changes asks the caller what to do before
//! anything is queued. On the stash path the checkout is a second step,
//! queued only once the stash exists; if the checkout then fails the stash
//! is kept and the descriptor still names the branch to roll back to.
//!
//! # Stash apply and pop
//!
//! Conflicts from an apply are an outcome, not an error. Pop drops the
//! entry in a separate step, and only when the apply was clean.
//!
//! # Remote operations
//!
//! Credentials are resolved on the caller's thread before the transfer is
//! queued, so a prompt never holds up the worker.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::descriptor::{
    OperationDescriptor, OperationKind, OperationOutcome, OperationPayload, PullOutcome, StashRef,
};
use super::error::OpError;
use super::handle::RepositoryHandle;
use super::orchestrator::{stash_index, OperationTicket, Orchestrator, Step};
use super::state::RepositoryStatus;
use crate::core::config::AutoStash;
use crate::core::types::{BranchInfo, BranchName, PullStrategy, StashEntry};
use crate::git::{Credentials, Git, GitError, IntegrationOutcome};

/// Where a switch goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchTarget {
    Branch(BranchName),
    /// Any revision; HEAD ends up detached.
    Detached(String),
}

impl SwitchTarget {
    fn is_current(&self, head: &BranchInfo) -> bool {
        match self {
            SwitchTarget::Branch(name) => head.branch() == Some(name.as_str()),
            SwitchTarget::Detached(_) => false,
        }
    }
}

impl fmt::Display for SwitchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchTarget::Branch(name) => write!(f, "{name}"),
            SwitchTarget::Detached(rev) => write!(f, "{rev}"),
        }
    }
}

/// The caller's answer when a switch would carry uncommitted changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchDecision {
    StashThenSwitch,
    /// Fails with `CheckoutConflict` if changes would be overwritten.
    SwitchAnyway,
    Cancel,
}

/// What the caller is asked to decide on.
#[derive(Debug)]
pub struct SwitchPrompt<'a> {
    pub target: &'a SwitchTarget,
    pub status: &'a RepositoryStatus,
}

/// Supplies credentials for remote operations. May prompt.
pub trait CredentialProvider {
    fn credentials(&self, remote: &str, url: &str) -> Option<Credentials>;
}

/// Never supplies credentials; transports fall back to ssh-agent and the
/// git credential helper.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn credentials(&self, _remote: &str, _url: &str) -> Option<Credentials> {
        None
    }
}

impl Orchestrator {
    // =========================================================================
    // Safe switch
    // =========================================================================

    /// Resolve a user-typed name: a local branch if one exists, otherwise
    /// any revision.
    pub fn switch_target(&self, name: &str) -> Result<SwitchTarget, OpError> {
        self.read(|git| {
            if let Ok(branch) = BranchName::new(name) {
                if git.branch_exists(&branch) {
                    return Ok(SwitchTarget::Branch(branch));
                }
            }
            git.resolve_revision(name)?;
            Ok(SwitchTarget::Detached(name.to_string()))
        })
    }

    /// Switch to `target`.
    ///
    /// When the working copy has changes a stash would save, is not
    /// conflicted, and `target` is not the current branch, the configured
    /// auto-stash policy decides; with `ask`, `decide` is called on this
    /// thread. Returns `None` if the caller cancelled.
    pub fn switch_branch<D>(&self, target: SwitchTarget, decide: D) -> Option<OperationTicket>
    where
        D: FnOnce(&SwitchPrompt<'_>) -> SwitchDecision,
    {
        let include_untracked = self.settings().stash_include_untracked;
        let status = self.status().ok();

        let decision = match &status {
            Some(status)
                if !target.is_current(&status.branch)
                    && !status.state.is_conflicted()
                    && status.has_stashable_changes(include_untracked) =>
            {
                match self.settings().auto_stash {
                    AutoStash::Always => SwitchDecision::StashThenSwitch,
                    AutoStash::Never => SwitchDecision::SwitchAnyway,
                    AutoStash::Ask => decide(&SwitchPrompt {
                        target: &target,
                        status,
                    }),
                }
            }
            _ => SwitchDecision::SwitchAnyway,
        };

        let auto_stash = match decision {
            SwitchDecision::Cancel => {
                debug!(%target, "switch cancelled");
                return None;
            }
            SwitchDecision::StashThenSwitch => true,
            SwitchDecision::SwitchAnyway => false,
        };

        let descriptor = OperationDescriptor::new(OperationKind::Checkout).with_payload(
            OperationPayload::Checkout {
                target: target.to_string(),
                previous: status.map(|s| s.branch),
                auto_stash,
            },
        );

        if !auto_stash {
            return Some(self.submit(descriptor, move |handle| checkout(handle, &target, None)));
        }

        let message = format!("stagehand: auto-stash before switching to {target}");
        Some(self.submit(descriptor, move |handle| {
            match handle.with_git(|git| git.stash_save(Some(&message), include_untracked)) {
                Ok(stash) => Step::then(move |handle| checkout(handle, &target, stash)),
                Err(e) => Step::Done(Err(e)),
            }
        }))
    }

    // =========================================================================
    // Stash apply and pop
    // =========================================================================

    /// Apply a stash entry, keeping it.
    pub fn apply_stash(&self, entry: StashRef) -> OperationTicket {
        self.apply_stash_entry(entry, false)
    }

    /// Apply a stash entry and drop it if the apply left no conflicts.
    pub fn pop_stash(&self, entry: StashRef) -> OperationTicket {
        self.apply_stash_entry(entry, true)
    }

    fn apply_stash_entry(&self, entry: StashRef, pop: bool) -> OperationTicket {
        let kind = if pop {
            OperationKind::StashPop
        } else {
            OperationKind::StashApply
        };
        let descriptor = OperationDescriptor::new(kind).with_payload(OperationPayload::Stash {
            entry: Some(entry.clone()),
            message: None,
        });

        self.submit(descriptor, move |handle| {
            let applied = handle.with_git(|git| {
                let index = stash_index(git, &entry)?;
                let stash = stash_entry(git, index)?;
                let conflicts = git.stash_apply(index)?;
                Ok((stash, conflicts))
            });
            let (stash, conflicts) = match applied {
                Ok(applied) => applied,
                Err(e) => return Step::Done(Err(e)),
            };

            if !pop || !conflicts.is_empty() {
                if pop {
                    warn!(stash = %stash, conflicts = conflicts.len(), "stash pop hit conflicts; entry kept");
                }
                return Step::Done(Ok(OperationOutcome::StashApplied {
                    entry: stash,
                    conflicts,
                    dropped: false,
                }));
            }

            // Indices may shift before the drop runs; find the entry by commit.
            Step::then(move |handle| {
                let dropped = handle.with_git(|git| {
                    let index = git.stash_index_of(&stash.oid)?;
                    git.stash_drop(index)
                });
                Step::Done(dropped.map(|entry| OperationOutcome::StashApplied {
                    entry,
                    conflicts,
                    dropped: true,
                }))
            })
        })
    }

    // =========================================================================
    // Remote
    // =========================================================================

    /// Fetch, then merge or rebase the current branch onto its upstream.
    /// `strategy` defaults to the configured one.
    pub fn pull(
        &self,
        strategy: Option<PullStrategy>,
        provider: &dyn CredentialProvider,
    ) -> OperationTicket {
        let strategy = strategy.unwrap_or(self.settings().pull_strategy);
        let remote = self.settings().remote.clone();
        let credentials = self.resolve_credentials(&remote, provider);

        let descriptor = OperationDescriptor::new(OperationKind::Pull(strategy)).with_payload(
            OperationPayload::Remote {
                remote: remote.clone(),
            },
        );

        self.submit(descriptor, move |handle| {
            let fetched = handle.with_git(|git| {
                let branch = attached_branch(git, "pull")?;
                git.fetch(&remote, credentials.as_ref())?;
                git.pull_source(&branch, &remote)
            });
            let source = match fetched {
                Ok(source) => source,
                Err(e) => return Step::Done(Err(e)),
            };
            debug!(%remote, %source, "fetched");

            Step::then(move |handle| {
                let result = handle.with_git(|git| match strategy {
                    PullStrategy::Merge => git.merge_into_head(&source),
                    PullStrategy::Rebase => git.rebase_onto(&source),
                });
                Step::Done(result.map(|result| {
                    OperationOutcome::Pulled(PullOutcome {
                        remote,
                        strategy,
                        source,
                        result,
                    })
                }))
            })
        })
    }

    /// Push the current branch to the configured remote.
    pub fn push(&self, provider: &dyn CredentialProvider) -> OperationTicket {
        let remote = self.settings().remote.clone();
        let credentials = self.resolve_credentials(&remote, provider);
        let descriptor = OperationDescriptor::new(OperationKind::Push).with_payload(
            OperationPayload::Remote {
                remote: remote.clone(),
            },
        );

        self.submit_git(descriptor, move |git| {
            let branch = attached_branch(git, "push")?;
            let report = git.push_branch(&remote, &branch, credentials.as_ref())?;
            info!(%branch, remote_ref = %report.remote_ref, "pushed");
            Ok(OperationOutcome::Pushed(report))
        })
    }

    /// Ask `provider` for credentials when `remote` is an HTTP(S) remote.
    fn resolve_credentials(
        &self,
        remote: &str,
        provider: &dyn CredentialProvider,
    ) -> Option<Credentials> {
        let url = self.read(|git| git.remote_url(remote)).ok().flatten()?;
        if url.starts_with("https://") || url.starts_with("http://") {
            provider.credentials(remote, &url)
        } else {
            None
        }
    }

    // =========================================================================
    // Continue and abort
    // =========================================================================

    /// Commit a merge whose conflicts are resolved.
    pub fn continue_merge(&self) -> OperationTicket {
        self.submit_git(
            OperationDescriptor::new(OperationKind::MergeContinue),
            |git| {
                let commit = git.continue_merge()?;
                Ok(OperationOutcome::Integrated(IntegrationOutcome::Merged {
                    commit,
                }))
            },
        )
    }

    pub fn abort_merge(&self) -> OperationTicket {
        self.submit_git(OperationDescriptor::new(OperationKind::MergeAbort), |git| {
            git.abort_merge()?;
            Ok(OperationOutcome::Done)
        })
    }

    /// Commit the current rebase step and replay the rest. May stop on
    /// conflicts again.
    pub fn continue_rebase(&self) -> OperationTicket {
        self.submit_git(
            OperationDescriptor::new(OperationKind::RebaseContinue),
            |git| Ok(OperationOutcome::Integrated(git.continue_rebase()?)),
        )
    }

    pub fn abort_rebase(&self) -> OperationTicket {
        self.submit_git(OperationDescriptor::new(OperationKind::RebaseAbort), |git| {
            git.abort_rebase()?;
            Ok(OperationOutcome::Done)
        })
    }

    /// Continue whichever of merge or rebase is in progress. With neither,
    /// the operation fails with `InvalidState`.
    pub fn continue_in_progress(&self) -> OperationTicket {
        if self.is_rebasing() {
            self.continue_rebase()
        } else {
            self.continue_merge()
        }
    }

    /// Abort whichever of merge or rebase is in progress.
    pub fn abort_in_progress(&self) -> OperationTicket {
        if self.is_rebasing() {
            self.abort_rebase()
        } else {
            self.abort_merge()
        }
    }

    fn is_rebasing(&self) -> bool {
        self.read(|git| Ok(git.state().is_rebase()))
            .unwrap_or(false)
    }
}

fn checkout(
    handle: &Arc<RepositoryHandle>,
    target: &SwitchTarget,
    stash: Option<StashEntry>,
) -> Step {
    let result = handle.with_git(|git| match target {
        SwitchTarget::Branch(name) => git.checkout_branch(name),
        SwitchTarget::Detached(rev) => git.checkout_detached(rev),
    });
    if let (Err(e), Some(stash)) = (&result, &stash) {
        warn!(%target, stash = %stash, error = %e, "switch failed after stashing; stash kept");
    }
    Step::Done(result.map(|branch| OperationOutcome::Switched { branch, stash }))
}

fn stash_entry(git: &mut Git, index: usize) -> Result<StashEntry, GitError> {
    git.stash_list()?
        .into_iter()
        .nth(index)
        .ok_or_else(|| GitError::StashNotFound {
            reference: format!("stash@{{{index}}}"),
        })
}

fn attached_branch(git: &Git, operation: &'static str) -> Result<BranchName, GitError> {
    git.current_branch()?
        .ok_or(GitError::DetachedHead { operation })
}
