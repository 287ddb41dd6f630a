//! pull and push commands

use anyhow::{bail, Result};

use super::Session;
use crate::cli::Context;
use crate::core::types::PullStrategy;
use crate::engine::{OperationOutcome, PullSummary};
use crate::ui::prompts::TerminalCredentials;

/// Fetch, then merge or rebase. `strategy` overrides the configured one.
///
/// A pull that stops on conflicts exits non-zero; the console listener has
/// already listed the paths.
pub fn pull(ctx: &Context, strategy: Option<PullStrategy>) -> Result<()> {
    let session = Session::open(ctx)?;
    let credentials = TerminalCredentials::new(session.interactive);
    let ticket = session.orchestrator.pull(strategy, &credentials);
    let outcome = session.finish(ticket)?;

    if let PullSummary::Conflicts(paths) = PullSummary::from_result(&Ok(outcome)) {
        bail!("Pull stopped on {} conflicted path(s)", paths.len());
    }
    Ok(())
}

pub fn push(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let credentials = TerminalCredentials::new(session.interactive);
    let ticket = session.orchestrator.push(&credentials);
    if let OperationOutcome::Pushed(report) = session.finish(ticket)? {
        tracing::debug!(remote_ref = %report.remote_ref, "push finished");
    }
    Ok(())
}
