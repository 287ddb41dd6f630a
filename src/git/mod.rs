//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **only doorway** to Git. Every repository read and
//! write flows through [`Git`]; no other module imports `git2`.
//!
//! # Responsibilities
//!
//! - Repository discovery, opening and initialisation
//! - Status, HEAD and in-progress state detection
//! - Index, commit, branch, tag and reset operations
//! - The stash stack
//! - Fetch, push, merge and rebase
//! - Conflict resolution
//!
//! # Invariants
//!
//! - Checkouts are safe: they never overwrite uncommitted changes
//! - Conflicts from merge, rebase and stash apply are outcomes, not errors
//! - All operations return strong types (`Oid`, `BranchName`, `FileChange`)
//!
//! # Example
//!
//! ```ignore
//! use stagehand::git::Git;
//! use std::path::Path;
//!
//! let mut git = Git::open(Path::new("."))?;
//! if let Some(entry) = git.stash_save(Some("wip"), false)? {
//!     println!("saved {}", entry);
//! }
//! ```

mod integrate;
mod interface;
mod remote;
mod stash;

pub use integrate::IntegrationOutcome;
pub use interface::{CommitInfo, Git, GitError, GitState, RepoInfo, StatusSnapshot};
pub use remote::{Credentials, PushReport};
