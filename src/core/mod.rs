//! core
//!
//! Domain types, configuration, and storage routing for stagehand.
//!
//! # Modules
//!
//! - [`types`] - Strong types: BranchName, Oid, BranchInfo, FileChange, etc.
//! - [`config`] - Configuration schema and loading
//! - [`paths`] - Centralized path routing for stagehand storage
//! - [`ops`] - Working-copy lock
//!
//! Nothing in `core` touches the repository; it is shared vocabulary for
//! the [`crate::git`] and [`crate::engine`] layers.

pub mod config;
pub mod ops;
pub mod paths;
pub mod types;
