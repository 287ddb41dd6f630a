//! engine::state
//!
//! The repository state model.
//!
//! State is never stored. Every query reads the repository afresh and
//! derives a new value, so no reader can observe a half-updated state.
//! [`derive_state`] is the pure core; the `read_*` functions gather its
//! inputs from a [`Git`] handle.
//!
//! # Flags
//!
//! Several flags can hold at once. `Clean` excludes uncommitted changes,
//! conflicts and an in-progress merge or rebase, but combines freely with
//! `DetachedHead` and `StashPresent`.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::core::types::{AheadBehind, BranchInfo, BranchName, FileChange};
use crate::git::{Git, GitError, GitState, StatusSnapshot};

/// One aspect of the repository's condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFlag {
    Clean,
    HasUncommittedChanges,
    Conflicted,
    Merging,
    Rebasing,
    DetachedHead,
    StashPresent,
}

impl StateFlag {
    pub fn name(&self) -> &'static str {
        match self {
            StateFlag::Clean => "clean",
            StateFlag::HasUncommittedChanges => "uncommitted changes",
            StateFlag::Conflicted => "conflicted",
            StateFlag::Merging => "merging",
            StateFlag::Rebasing => "rebasing",
            StateFlag::DetachedHead => "detached HEAD",
            StateFlag::StashPresent => "stash present",
        }
    }
}

/// The set of flags that hold right now.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RepositoryState {
    flags: BTreeSet<StateFlag>,
}

impl RepositoryState {
    pub fn from_flags(flags: impl IntoIterator<Item = StateFlag>) -> Self {
        Self {
            flags: flags.into_iter().collect(),
        }
    }

    pub fn contains(&self, flag: StateFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn flags(&self) -> impl Iterator<Item = StateFlag> + '_ {
        self.flags.iter().copied()
    }

    pub fn is_clean(&self) -> bool {
        self.contains(StateFlag::Clean)
    }

    pub fn is_conflicted(&self) -> bool {
        self.contains(StateFlag::Conflicted)
    }

    pub fn is_merging(&self) -> bool {
        self.contains(StateFlag::Merging)
    }

    pub fn is_rebasing(&self) -> bool {
        self.contains(StateFlag::Rebasing)
    }

    pub fn is_detached(&self) -> bool {
        self.contains(StateFlag::DetachedHead)
    }

    pub fn has_uncommitted_changes(&self) -> bool {
        self.contains(StateFlag::HasUncommittedChanges)
    }
}

impl fmt::Display for RepositoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.flags.iter().map(StateFlag::name).collect();
        f.write_str(&names.join(", "))
    }
}

/// Raw facts [`derive_state`] works from.
#[derive(Debug, Clone, Default)]
pub struct StateInputs {
    pub git_state: Option<GitState>,
    pub detached: bool,
    pub staged: usize,
    pub unstaged: usize,
    pub conflicted: usize,
    pub stash_count: usize,
}

/// Classify the repository from raw facts.
pub fn derive_state(inputs: &StateInputs) -> RepositoryState {
    let mut flags = BTreeSet::new();

    let merging = matches!(inputs.git_state, Some(GitState::Merge));
    let rebasing = matches!(inputs.git_state, Some(GitState::Rebase { .. }));
    let dirty = inputs.staged + inputs.unstaged > 0;
    let conflicted = inputs.conflicted > 0;

    if merging {
        flags.insert(StateFlag::Merging);
    }
    if rebasing {
        flags.insert(StateFlag::Rebasing);
    }
    if conflicted {
        flags.insert(StateFlag::Conflicted);
    }
    if dirty {
        flags.insert(StateFlag::HasUncommittedChanges);
    }
    if !(merging || rebasing || conflicted || dirty) {
        flags.insert(StateFlag::Clean);
    }
    if inputs.detached {
        flags.insert(StateFlag::DetachedHead);
    }
    if inputs.stash_count > 0 {
        flags.insert(StateFlag::StashPresent);
    }

    RepositoryState { flags }
}

/// Everything a status view renders, read at one moment.
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryStatus {
    pub branch: BranchInfo,
    pub state: RepositoryState,
    pub staged: Vec<FileChange>,
    pub unstaged: Vec<FileChange>,
    pub conflicted: Vec<FileChange>,
    pub untracked: usize,
    pub stash_count: usize,
    pub ahead_behind: AheadBehind,
}

impl RepositoryStatus {
    /// Uncommitted changes that a stash would save, untracked files
    /// counted only when `include_untracked`.
    pub fn has_stashable_changes(&self, include_untracked: bool) -> bool {
        let tracked_unstaged = self.unstaged.len().saturating_sub(self.untracked);
        !self.staged.is_empty() || tracked_unstaged > 0 || (include_untracked && self.untracked > 0)
    }
}

fn inputs_from(git: &mut Git, status: &StatusSnapshot) -> Result<StateInputs, GitError> {
    Ok(StateInputs {
        git_state: Some(git.state()),
        detached: git.is_head_detached()?,
        staged: status.staged.len(),
        unstaged: status.unstaged.len(),
        conflicted: status.conflicted.len(),
        stash_count: git.stash_list()?.len(),
    })
}

/// Current repository state.
pub fn read_state(git: &mut Git) -> Result<RepositoryState, GitError> {
    let status = git.status()?;
    Ok(derive_state(&inputs_from(git, &status)?))
}

/// Full status snapshot.
pub fn read_status(git: &mut Git) -> Result<RepositoryStatus, GitError> {
    let snapshot = git.status()?;
    let state = derive_state(&inputs_from(git, &snapshot)?);
    let branch = git.head_info()?;
    let ahead_behind = read_current_ahead_behind(git)?;
    let stash_count = git.stash_list()?.len();

    Ok(RepositoryStatus {
        branch,
        state,
        staged: snapshot.staged,
        unstaged: snapshot.unstaged,
        conflicted: snapshot.conflicted,
        untracked: snapshot.untracked,
        stash_count,
        ahead_behind,
    })
}

/// Ahead/behind of `local` against `upstream`, or against its configured
/// upstream when `upstream` is `None`.
///
/// `Unknown` when there is no upstream, or when the upstream's tracking ref
/// has never been fetched.
pub fn read_ahead_behind(
    git: &Git,
    local: &BranchName,
    upstream: Option<&str>,
) -> Result<AheadBehind, GitError> {
    let upstream = match upstream {
        Some(name) => name.to_string(),
        None => match git.upstream_of(local)? {
            Some(name) => name,
            None => return Ok(AheadBehind::Unknown),
        },
    };

    let local_oid = match git.resolve_revision(&format!("refs/heads/{local}")) {
        Ok(oid) => oid,
        Err(GitError::RefNotFound { .. }) => return Ok(AheadBehind::Unknown),
        Err(e) => return Err(e),
    };
    let upstream_oid = match git.resolve_revision(&upstream) {
        Ok(oid) => oid,
        Err(GitError::RefNotFound { .. }) => return Ok(AheadBehind::Unknown),
        Err(e) => return Err(e),
    };

    let (ahead, behind) = git.ahead_behind(&local_oid, &upstream_oid)?;
    Ok(AheadBehind::Known { ahead, behind })
}

/// Ahead/behind for the checked-out branch; `Unknown` when detached.
pub fn read_current_ahead_behind(git: &Git) -> Result<AheadBehind, GitError> {
    match git.current_branch()? {
        Some(branch) => read_ahead_behind(git, &branch, None),
        None => Ok(AheadBehind::Unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(inputs: StateInputs) -> RepositoryState {
        derive_state(&inputs)
    }

    mod derive {
        use super::*;

        #[test]
        fn empty_inputs_are_clean() {
            let s = state(StateInputs::default());
            assert!(s.is_clean());
            assert_eq!(s.flags().count(), 1);
        }

        #[test]
        fn changes_are_not_clean() {
            let s = state(StateInputs {
                unstaged: 2,
                ..Default::default()
            });
            assert!(!s.is_clean());
            assert!(s.has_uncommitted_changes());
        }

        #[test]
        fn merging_with_conflicts() {
            let s = state(StateInputs {
                git_state: Some(GitState::Merge),
                conflicted: 1,
                ..Default::default()
            });
            assert!(s.is_merging());
            assert!(s.is_conflicted());
            assert!(!s.is_clean());
            assert!(!s.has_uncommitted_changes());
        }

        #[test]
        fn rebasing_is_not_clean_even_without_changes() {
            let s = state(StateInputs {
                git_state: Some(GitState::Rebase {
                    current: Some(1),
                    total: Some(3),
                }),
                ..Default::default()
            });
            assert!(s.is_rebasing());
            assert!(!s.is_clean());
        }

        #[test]
        fn overlay_flags_combine_with_clean() {
            let s = state(StateInputs {
                detached: true,
                stash_count: 2,
                ..Default::default()
            });
            assert!(s.is_clean());
            assert!(s.is_detached());
            assert!(s.contains(StateFlag::StashPresent));
        }

        #[test]
        fn detached_and_conflicted_together() {
            let s = state(StateInputs {
                detached: true,
                conflicted: 3,
                ..Default::default()
            });
            assert_eq!(
                s,
                RepositoryState::from_flags([StateFlag::Conflicted, StateFlag::DetachedHead])
            );
        }
    }

    mod display {
        use super::*;

        #[test]
        fn lists_flags_in_order() {
            let s = RepositoryState::from_flags([StateFlag::StashPresent, StateFlag::Clean]);
            assert_eq!(s.to_string(), "clean, stash present");
        }
    }

    mod status {
        use super::*;
        use crate::core::types::ChangeKind;

        fn status(staged: usize, unstaged: Vec<FileChange>, untracked: usize) -> RepositoryStatus {
            RepositoryStatus {
                branch: BranchInfo {
                    name: "main".into(),
                    is_detached: false,
                    head: None,
                },
                state: RepositoryState::default(),
                staged: (0..staged)
                    .map(|i| FileChange::new(format!("s{i}"), ChangeKind::Modified))
                    .collect(),
                unstaged,
                conflicted: Vec::new(),
                untracked,
                stash_count: 0,
                ahead_behind: AheadBehind::Unknown,
            }
        }

        #[test]
        fn untracked_only_counts_when_included() {
            let s = status(0, vec![FileChange::new("new.txt", ChangeKind::Added)], 1);
            assert!(!s.has_stashable_changes(false));
            assert!(s.has_stashable_changes(true));
        }

        #[test]
        fn staged_is_stashable() {
            assert!(status(1, Vec::new(), 0).has_stashable_changes(false));
        }
    }
}
