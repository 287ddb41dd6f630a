//! config command - Get, set, or list configuration values
//!
//! Keys name stagehand settings (`pull_strategy`, `shutdown.wait`, ...).
//! Keys prefixed with `git.` read and write the repository's git config
//! instead, e.g. `git.user.name`.

use anyhow::{bail, Context as _, Result};

use super::Session;
use crate::cli::Context;
use crate::core::config::{Config, GlobalConfig, OperationDefaults};
use crate::ui::output;

const GIT_PREFIX: &str = "git.";

/// Get a configuration value.
pub fn get(ctx: &Context, key: &str) -> Result<()> {
    let session = Session::open(ctx)?;

    let value = match key.strip_prefix(GIT_PREFIX) {
        Some(git_key) => session.orchestrator.git_config(git_key)?,
        None => Some(
            session
                .config
                .effective(key)
                .with_context(|| format!("Unknown configuration key: {}", key))?,
        ),
    };

    // Unset git keys print nothing.
    if let Some(value) = value {
        println!("{}", value);
    }
    Ok(())
}

/// Set a configuration value in the repository scope, or the user scope
/// with `global`.
pub fn set(ctx: &Context, key: &str, value: &str, global: bool) -> Result<()> {
    if let Some(git_key) = key.strip_prefix(GIT_PREFIX) {
        if global {
            bail!("git.* keys are written to the repository's git config only");
        }
        let session = Session::open(ctx)?;
        let ticket = session.orchestrator.update_config(git_key, value);
        session.finish(ticket)?;
        return Ok(());
    }

    let verbosity = ctx.verbosity();
    if global {
        if !GlobalConfig::KEYS.contains(&key) {
            bail!("Unknown configuration key: {}", key);
        }
        let mut config = Config::load(None).context("Failed to load config")?.global;
        config.set(key, value)?;
        let path = Config::write_global(&config).context("Failed to write config")?;
        output::print(format!("Set {} = {} in {}", key, value, path.display()), verbosity);
        return Ok(());
    }

    if !OperationDefaults::KEYS.contains(&key) {
        if GlobalConfig::KEYS.contains(&key) {
            bail!("{} can only be set globally; use --global", key);
        }
        bail!("Unknown configuration key: {}", key);
    }
    let session = Session::open(ctx)?;
    let handle = session
        .orchestrator
        .handle()
        .context("No working copy is open")?;
    let mut config = session.config.repo.clone().unwrap_or_default();
    config.set(key, value)?;
    let path = Config::write_repo(handle.paths(), &config).context("Failed to write config")?;
    output::print(format!("Set {} = {} in {}", key, value, path.display()), verbosity);
    Ok(())
}

/// List every stagehand key with its effective value and where it came from.
pub fn list(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let config = &session.config;

    for key in GlobalConfig::KEYS {
        let source = if config.repo.as_ref().and_then(|r| r.get(key)).is_some() {
            "repo"
        } else if config.global.get(key).is_some() {
            "global"
        } else {
            "default"
        };
        if let Some(value) = config.effective(key) {
            println!("{} = {}  # {}", key, value, source);
        }
    }

    if let Some(path) = config.global_config_loaded_from() {
        output::print(format!("# global: {}", path.display()), session.verbosity);
    }
    if let Some(path) = config.repo_config_loaded_from() {
        output::print(format!("# repo: {}", path.display()), session.verbosity);
    }
    Ok(())
}
