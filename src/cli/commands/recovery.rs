//! merge, resolve, continue and abort commands
//!
//! A merge or rebase that stops on conflicts leaves the repository paused.
//! `resolve` settles one path at a time; `continue` commits the result and
//! `abort` restores the pre-operation state.

use anyhow::{bail, Result};

use super::Session;
use crate::cli::Context;
use crate::core::types::ConflictSide;
use crate::engine::{OperationOutcome, Resolution};
use crate::git::IntegrationOutcome;

/// Merge `source` into HEAD. Exits non-zero when the merge stops on
/// conflicts.
pub fn merge(ctx: &Context, source: &str) -> Result<()> {
    let session = Session::open(ctx)?;
    let ticket = session.orchestrator.merge(source);
    stop_on_conflicts(session.finish(ticket)?)
}

/// Resolve one conflicted path by taking a side, or as edited.
pub fn resolve(ctx: &Context, path: &str, side: Option<ConflictSide>) -> Result<()> {
    let session = Session::open(ctx)?;
    let path = session
        .repo_paths(&[path.to_string()])?
        .pop()
        .unwrap_or_default();
    let resolution = match side {
        Some(side) => Resolution::Take(side),
        None => Resolution::AsEdited,
    };
    let ticket = session.orchestrator.resolve(path, resolution);
    session.finish(ticket)?;
    Ok(())
}

/// Continue the merge or rebase in progress.
pub fn continue_op(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let state = session.orchestrator.repository_state()?;
    if !state.is_merging() && !state.is_rebasing() {
        bail!("No merge or rebase in progress");
    }
    if state.is_conflicted() {
        let paths = session.orchestrator.conflicting_files()?;
        bail!(
            "{} path(s) are still conflicted; resolve them first",
            paths.len()
        );
    }

    let ticket = session.orchestrator.continue_in_progress();
    stop_on_conflicts(session.finish(ticket)?)
}

/// Abort the merge or rebase in progress.
pub fn abort(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let state = session.orchestrator.repository_state()?;
    if !state.is_merging() && !state.is_rebasing() {
        bail!("No merge or rebase in progress");
    }

    let ticket = session.orchestrator.abort_in_progress();
    session.finish(ticket)?;
    Ok(())
}

fn stop_on_conflicts(outcome: OperationOutcome) -> Result<()> {
    match outcome {
        OperationOutcome::Integrated(IntegrationOutcome::Conflicts { paths }) => {
            bail!("Stopped on {} conflicted path(s)", paths.len())
        }
        _ => Ok(()),
    }
}
