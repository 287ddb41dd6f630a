//! core::types
//!
//! Strong types for the values the orchestrator hands to its callers.
//!
//! # Types
//!
//! - [`BranchName`] - Validated Git branch name
//! - [`Oid`] - Git object identifier (SHA)
//! - [`BranchInfo`] - What HEAD points at, as of the moment it was read
//! - [`FileChange`] / [`ChangeKind`] - One entry of a status listing
//! - [`StashEntry`] - One entry of the stash stack
//! - [`AheadBehind`] - Divergence from an upstream, or "unknown"
//! - [`PullStrategy`], [`ResetMode`], [`ConflictSide`] - Operation parameters
//!
//! # Validation
//!
//! Names and ids are validated at construction time, so an invalid branch
//! name never reaches the repository layer.
//!
//! # Examples
//!
//! ```
//! use stagehand::core::types::{BranchName, Oid};
//!
//! let branch = BranchName::new("feature/my-branch").unwrap();
//! let oid = Oid::new("abc123def4567890abc123def4567890abc12345").unwrap();
//! assert_eq!(oid.short(7), "abc123d");
//!
//! assert!(BranchName::new("invalid..name").is_err());
//! assert!(Oid::new("not-a-sha").is_err());
//! # let _ = branch;
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("unknown {kind} '{value}', expected one of: {expected}")]
    UnknownVariant {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// A validated Git branch name.
///
/// Follows `git check-ref-format --branch`: no empty names, no leading `.`
/// or `-`, no trailing `/` or `.lock`, none of `..`, `@{`, `//`, no spaces,
/// control characters or any of `~^:\?*[`, and not exactly `@`.
///
/// ```
/// use stagehand::core::types::BranchName;
///
/// assert!(BranchName::new("user@feature").is_ok());
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new("branch.lock").is_err());
/// assert!(BranchName::new("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    const FORBIDDEN_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];
    const FORBIDDEN_SEQUENCES: [&'static str; 3] = ["..", "@{", "//"];

    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` describing the first rule violated.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::check(&name).map_err(|reason| TypeError::InvalidBranchName(reason.to_string()))?;
        Ok(Self(name))
    }

    fn check(name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err("branch name cannot be empty".into());
        }
        if name == "@" {
            return Err("branch name cannot be '@'".into());
        }
        if name.starts_with('-') {
            return Err("branch name cannot start with '-'".into());
        }
        if name.ends_with('/') {
            return Err("branch name cannot end with '/'".into());
        }
        if let Some(seq) = Self::FORBIDDEN_SEQUENCES.iter().find(|s| name.contains(*s)) {
            return Err(format!("branch name cannot contain '{seq}'"));
        }
        if let Some(c) = name
            .chars()
            .find(|c| Self::FORBIDDEN_CHARS.contains(c) || c.is_ascii_control())
        {
            return Err(format!("branch name cannot contain {c:?}"));
        }
        for component in name.split('/') {
            if component.starts_with('.') {
                return Err(format!("component '{component}' cannot start with '.'"));
            }
            if component.ends_with(".lock") {
                return Err(format!("component '{component}' cannot end with '.lock'"));
            }
        }
        Ok(())
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A Git object identifier: 40 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Create a new validated object id. Uppercase hex is normalized.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        if oid.len() != 40 || !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(oid));
        }
        Ok(Self(oid))
    }

    /// Abbreviated form for display.
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What HEAD points at.
///
/// `name` is the short branch name when attached, or the full commit id when
/// detached. A value is only valid as of the moment it was computed; it is
/// never updated in place and callers should not keep it across an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    /// Branch name, or commit id when detached.
    pub name: String,
    /// True when HEAD points at a commit rather than a branch.
    pub is_detached: bool,
    /// Commit HEAD resolves to. `None` on an unborn branch.
    pub head: Option<Oid>,
}

impl BranchInfo {
    /// HEAD attached to `branch`.
    pub fn attached(branch: &BranchName, head: Option<Oid>) -> Self {
        Self {
            name: branch.to_string(),
            is_detached: false,
            head,
        }
    }

    /// HEAD detached at `commit`.
    pub fn detached(commit: Oid) -> Self {
        Self {
            name: commit.to_string(),
            is_detached: true,
            head: Some(commit),
        }
    }

    /// The branch name, if attached.
    pub fn branch(&self) -> Option<&str> {
        (!self.is_detached).then_some(self.name.as_str())
    }
}

impl fmt::Display for BranchInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_detached {
            write!(f, "(detached at {})", &self.name[..self.name.len().min(7)])
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Kind of change a status entry reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Conflicted,
    Unknown,
}

impl ChangeKind {
    /// Single-letter marker used by the status listing.
    pub fn marker(self) -> char {
        match self {
            ChangeKind::Added => 'A',
            ChangeKind::Modified => 'M',
            ChangeKind::Deleted => 'D',
            ChangeKind::Conflicted => 'U',
            ChangeKind::Unknown => '?',
        }
    }
}

/// One path with its change kind. Paths are relative to the working copy
/// root and use `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

impl fmt::Display for FileChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.marker(), self.path)
    }
}

/// One entry of the stash stack. Index 0 is the most recent entry; indices
/// shift down when an entry above them is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashEntry {
    pub index: usize,
    pub message: String,
    /// The stash commit.
    pub oid: Oid,
}

impl fmt::Display for StashEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stash@{{{}}}: {}", self.index, self.message)
    }
}

/// Commits a local branch has that its upstream lacks, and the reverse.
///
/// `Unknown` means no upstream is configured or its tracking ref has not
/// been fetched. It is not the same as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AheadBehind {
    Known { ahead: usize, behind: usize },
    Unknown,
}

impl AheadBehind {
    pub fn is_known(&self) -> bool {
        matches!(self, AheadBehind::Known { .. })
    }
}

impl fmt::Display for AheadBehind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AheadBehind::Known { ahead, behind } => write!(f, "ahead {ahead}, behind {behind}"),
            AheadBehind::Unknown => f.write_str("no upstream"),
        }
    }
}

/// How pull integrates the fetched tip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullStrategy {
    #[default]
    Merge,
    Rebase,
}

impl FromStr for PullStrategy {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(PullStrategy::Merge),
            "rebase" => Ok(PullStrategy::Rebase),
            other => Err(TypeError::UnknownVariant {
                kind: "pull strategy",
                value: other.to_string(),
                expected: "merge, rebase",
            }),
        }
    }
}

impl fmt::Display for PullStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PullStrategy::Merge => "merge",
            PullStrategy::Rebase => "rebase",
        })
    }
}

/// Reset flavour, as in `git reset --soft|--mixed|--hard`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetMode {
    Soft,
    #[default]
    Mixed,
    Hard,
}

/// Which side of a conflict to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSide {
    Ours,
    Theirs,
}
