//! branch and switch commands

use std::cell::Cell;

use anyhow::{bail, Context as _, Result};

use super::Session;
use crate::cli::Context;
use crate::core::config::AutoStash;
use crate::core::types::BranchName;
use crate::engine::SwitchDecision;
use crate::ui::output;
use crate::ui::prompts::{self, PromptError};

/// List branches, marking the current one.
pub fn branch_list(ctx: &Context, remotes: bool) -> Result<()> {
    let session = Session::open(ctx)?;
    let orchestrator = &session.orchestrator;
    let head = orchestrator.current_branch()?;

    for branch in orchestrator.branches()? {
        let marker = if head.branch() == Some(branch.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{} {}", marker, branch);
    }
    if head.is_detached {
        println!("* {}", head);
    }

    if remotes {
        for branch in orchestrator.read(|git| git.list_remote_branches())? {
            println!("  remotes/{}", branch);
        }
    }
    Ok(())
}

pub fn branch_create(ctx: &Context, name: &str, start: Option<&str>) -> Result<()> {
    let name = BranchName::new(name).context("Invalid branch name")?;
    let session = Session::open(ctx)?;
    let ticket = session
        .orchestrator
        .create_branch(name, start.map(str::to_string));
    session.finish(ticket)?;
    Ok(())
}

pub fn branch_delete(ctx: &Context, name: &str) -> Result<()> {
    let name = BranchName::new(name).context("Invalid branch name")?;
    let session = Session::open(ctx)?;
    let ticket = session.orchestrator.delete_branch(name);
    session.finish(ticket)?;
    Ok(())
}

/// Switch to a branch or revision.
///
/// `stash` and `force` override the configured auto-stash policy. With the
/// `ask` policy and no terminal, the switch is refused instead of guessing.
pub fn switch(ctx: &Context, target: &str, stash: bool, force: bool) -> Result<()> {
    let session = Session::open_with(ctx, |settings| {
        if stash {
            settings.auto_stash = AutoStash::Always;
        } else if force {
            settings.auto_stash = AutoStash::Never;
        }
    })?;
    let orchestrator = &session.orchestrator;

    let target = orchestrator
        .switch_target(target)
        .with_context(|| format!("Unknown branch or revision '{}'", target))?;

    let interactive = session.interactive;
    let refused = Cell::new(false);
    let ticket = orchestrator.switch_branch(target, |prompt| {
        match prompts::switch_decision(prompt, interactive) {
            Ok(decision) => decision,
            Err(PromptError::NotInteractive) => {
                refused.set(true);
                SwitchDecision::Cancel
            }
            Err(_) => SwitchDecision::Cancel,
        }
    });

    match ticket {
        Some(ticket) => {
            session.finish(ticket)?;
            Ok(())
        }
        None if refused.get() => {
            bail!("Uncommitted changes would be carried over; rerun with --stash or --force")
        }
        None => {
            output::print("Switch cancelled.", session.verbosity);
            Ok(())
        }
    }
}
