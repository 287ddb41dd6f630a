//! core::ops
//!
//! Cross-process ownership of a working copy.
//!
//! # Modules
//!
//! - [`lock`] - Exclusive working-copy lock held while a repository is open
//!
//! In-process serialization of mutations is the scheduler's job
//! (see [`crate::engine::scheduler`]); this module only guards against a
//! second process driving the same repository.

pub mod lock;

pub use lock::{LockError, WorkingCopyLock};
