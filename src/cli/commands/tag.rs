//! tag command - List, create or delete tags

use anyhow::Result;

use super::Session;
use crate::cli::Context;

pub fn tag_list(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    for tag in session.orchestrator.tags()? {
        println!("{}", tag);
    }
    Ok(())
}

/// Tag HEAD; annotated when `message` is given.
pub fn tag_create(ctx: &Context, name: &str, message: Option<String>) -> Result<()> {
    let session = Session::open(ctx)?;
    let ticket = session.orchestrator.create_tag(name, message);
    session.finish(ticket)?;
    Ok(())
}

pub fn tag_delete(ctx: &Context, name: &str) -> Result<()> {
    let session = Session::open(ctx)?;
    let ticket = session.orchestrator.delete_tag(name);
    session.finish(ticket)?;
    Ok(())
}
