//! Stagehand - serialized repository operations for interactive git front-ends
//!
//! Stagehand sits between a front-end (a CLI, an editor panel, a status
//! view) and a git working copy. Every mutating request runs on one worker,
//! in submission order, and every listener hears when it starts and how it
//! ended.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - Scheduler, state model, orchestrator, listener registry
//! - [`core`] - Domain types, configuration, paths and the working-copy lock
//! - [`git`] - Single interface for all Git operations
//! - [`ui`] - User interaction utilities
//!
//! # Correctness Invariants
//!
//! 1. At most one repository operation executes at any instant
//! 2. Operations start in the order they were submitted
//! 3. Every operation that announced its start announces exactly one outcome
//! 4. Repository state is read fresh, never cached

pub mod cli;
pub mod core;
pub mod engine;
pub mod git;
pub mod ui;
