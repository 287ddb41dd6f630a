//! index commands - stage, unstage, discard, commit, reset

use anyhow::{bail, Result};

use super::Session;
use crate::cli::Context;
use crate::core::types::ResetMode;
use crate::ui::{output, prompts};

/// Stage paths, or everything with `all`.
pub fn stage(ctx: &Context, paths: &[String], all: bool) -> Result<()> {
    let session = Session::open(ctx)?;
    let ticket = if all {
        session.orchestrator.stage_all()
    } else {
        session.orchestrator.stage(session.repo_paths(paths)?)
    };
    session.finish(ticket)?;
    Ok(())
}

pub fn unstage(ctx: &Context, paths: &[String]) -> Result<()> {
    let session = Session::open(ctx)?;
    let ticket = session.orchestrator.unstage(session.repo_paths(paths)?);
    session.finish(ticket)?;
    Ok(())
}

/// Throw away working-tree changes. Asks first when interactive.
pub fn discard(ctx: &Context, paths: &[String]) -> Result<()> {
    let session = Session::open(ctx)?;
    let paths = session.repo_paths(paths)?;

    if session.interactive {
        let question = format!(
            "Discard changes to {} path(s)? This cannot be undone.",
            paths.len()
        );
        if !prompts::confirm(&question, false, true)? {
            output::print("Nothing discarded.", session.verbosity);
            return Ok(());
        }
    }

    let ticket = session.orchestrator.discard(paths);
    session.finish(ticket)?;
    Ok(())
}

pub fn commit(ctx: &Context, message: &str) -> Result<()> {
    if message.trim().is_empty() {
        bail!("Commit message cannot be empty");
    }
    let session = Session::open(ctx)?;
    let ticket = session.orchestrator.commit(message);
    session.finish(ticket)?;
    Ok(())
}

/// Move the current branch. A hard reset asks first when interactive.
pub fn reset(ctx: &Context, revision: &str, mode: ResetMode) -> Result<()> {
    let session = Session::open(ctx)?;

    if mode == ResetMode::Hard && session.interactive {
        let question = format!(
            "Hard reset to {} discards all uncommitted changes. Continue?",
            revision
        );
        if !prompts::confirm(&question, false, true)? {
            output::print("Reset cancelled.", session.verbosity);
            return Ok(());
        }
    }

    let ticket = session.orchestrator.reset(revision, mode);
    session.finish(ticket)?;
    Ok(())
}
