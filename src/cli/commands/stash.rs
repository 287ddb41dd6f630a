//! stash command - Save, list, apply and drop stashes

use anyhow::{bail, Result};

use super::Session;
use crate::cli::Context;
use crate::core::types::Oid;
use crate::engine::StashRef;
use crate::ui::{output, prompts};

/// Parse `0`, `stash@{0}` or a full stash commit id.
pub(crate) fn parse_entry(entry: Option<&str>) -> Result<StashRef> {
    let Some(entry) = entry else {
        return Ok(StashRef::default());
    };
    let index = entry
        .strip_prefix("stash@{")
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(entry);
    if let Ok(index) = index.parse::<usize>() {
        return Ok(StashRef::Index(index));
    }
    match Oid::new(entry) {
        Ok(oid) => Ok(StashRef::Commit(oid)),
        Err(_) => bail!("'{}' is neither a stash index nor a stash commit id", entry),
    }
}

pub fn stash_push(ctx: &Context, message: Option<String>, include_untracked: bool) -> Result<()> {
    let session = Session::open(ctx)?;
    // The flag only ever widens the configured default.
    let include_untracked = include_untracked.then_some(true);
    let ticket = session.orchestrator.create_stash(message, include_untracked);
    session.finish(ticket)?;
    Ok(())
}

pub fn stash_list(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    for entry in session.orchestrator.stash_list()? {
        println!("{}", entry);
    }
    Ok(())
}

pub fn stash_apply(ctx: &Context, entry: Option<&str>) -> Result<()> {
    let entry = parse_entry(entry)?;
    let session = Session::open(ctx)?;
    let ticket = session.orchestrator.apply_stash(entry);
    session.finish(ticket)?;
    Ok(())
}

pub fn stash_pop(ctx: &Context, entry: Option<&str>) -> Result<()> {
    let entry = parse_entry(entry)?;
    let session = Session::open(ctx)?;
    let ticket = session.orchestrator.pop_stash(entry);
    session.finish(ticket)?;
    Ok(())
}

pub fn stash_drop(ctx: &Context, entry: Option<&str>) -> Result<()> {
    let entry = parse_entry(entry)?;
    let session = Session::open(ctx)?;
    let ticket = session.orchestrator.drop_stash(entry);
    session.finish(ticket)?;
    Ok(())
}

/// Drop every entry. Asks first when interactive.
pub fn stash_clear(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let count = session.orchestrator.stash_list()?.len();
    if count == 0 {
        output::print("No stash entries.", session.verbosity);
        return Ok(());
    }

    if session.interactive {
        let question = format!("Drop all {} stash entries?", count);
        if !prompts::confirm(&question, false, true)? {
            output::print("Nothing dropped.", session.verbosity);
            return Ok(());
        }
    }

    let ticket = session.orchestrator.drop_all_stashes();
    session.finish(ticket)?;
    Ok(())
}
