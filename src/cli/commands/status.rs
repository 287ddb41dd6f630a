//! status command - Show branch, state flags and changes

use anyhow::{Context as _, Result};

use super::Session;
use crate::cli::Context;
use crate::ui::output;

/// Print a fresh status read, as text or JSON.
///
/// Printed even in quiet mode; it is the command's only output.
pub fn status(ctx: &Context, json: bool) -> Result<()> {
    let session = Session::open(ctx)?;
    let status = session
        .orchestrator
        .status()
        .context("Failed to read repository status")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", output::render_status(&status));
    }
    Ok(())
}
