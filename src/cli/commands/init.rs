//! init command - Create a repository and open it

use std::path::Path;

use anyhow::{Context as _, Result};

use super::Session;
use crate::cli::Context;
use crate::core::config::Config;
use crate::engine::{OperationOutcome, OrchestratorSettings};
use crate::ui::output;

/// Create a repository at `path` (default: the current directory).
///
/// Re-running in an existing repository reinitializes it, which leaves
/// history untouched.
pub fn init(ctx: &Context, path: Option<&Path>) -> Result<()> {
    let cwd = ctx.cwd()?;
    let target = match path {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => cwd.join(path),
        None => cwd.clone(),
    };
    std::fs::create_dir_all(&target)
        .with_context(|| format!("Failed to create {}", target.display()))?;

    // No repository scope exists yet.
    let config = Config::load(None).context("Failed to load config")?;
    let settings = OrchestratorSettings::from_config(&config);
    let session = Session::start(ctx, config, settings, cwd)?;

    let ticket = session.orchestrator.init_working_copy(&target);
    if let OperationOutcome::Opened { work_dir } = session.finish(ticket)? {
        output::print(
            format!("Initialized repository in {}", work_dir.display()),
            session.verbosity,
        );
    }
    Ok(())
}
