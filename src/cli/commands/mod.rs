//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Validates command-specific arguments
//! 2. Requests the operation from the orchestrator held by its [`Session`]
//! 3. Waits for the ticket; the console listener prints the result
//!
//! Handlers do NOT perform repository mutations directly.

mod branch;
mod config_cmd;
mod index;
mod init;
mod recovery;
mod remote;
mod stash;
mod status;
mod tag;

pub use branch::{branch_create, branch_delete, branch_list, switch};
pub use config_cmd::{get as config_get, list as config_list, set as config_set};
pub use index::{commit, discard, reset, stage, unstage};
pub use init::init;
pub use recovery::{abort, continue_op, merge, resolve};
pub use remote::{pull, push};
pub use stash::{stash_apply, stash_clear, stash_drop, stash_list, stash_pop, stash_push};
pub use status::status;
pub use tag::{tag_create, tag_delete, tag_list};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};

use super::args::{BranchAction, Command, ConfigAction, StashAction, TagAction};
use super::Context;
use crate::core::config::Config;
use crate::core::paths::StagehandPaths;
use crate::engine::{OperationOutcome, OperationTicket, Orchestrator, OrchestratorSettings};
use crate::git::Git;
use crate::ui::output::{ConsoleReporter, Verbosity};

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Init { path } => init::init(ctx, path.as_deref()),
        Command::Status { json } => status::status(ctx, json),

        Command::Stage { paths, all } => index::stage(ctx, &paths, all),
        Command::Unstage { paths } => index::unstage(ctx, &paths),
        Command::Discard { paths } => index::discard(ctx, &paths),
        Command::Commit { message } => index::commit(ctx, &message),
        Command::Reset { revision, mode } => index::reset(ctx, &revision, mode.mode()),

        Command::Branch { action } => match action {
            None => branch::branch_list(ctx, false),
            Some(BranchAction::List { remotes }) => branch::branch_list(ctx, remotes),
            Some(BranchAction::Create { name, start }) => {
                branch::branch_create(ctx, &name, start.as_deref())
            }
            Some(BranchAction::Delete { name }) => branch::branch_delete(ctx, &name),
        },
        Command::Switch {
            target,
            stash,
            force,
        } => branch::switch(ctx, &target, stash, force),

        Command::Stash { action } => match action {
            None => stash::stash_push(ctx, None, false),
            Some(StashAction::Push {
                message,
                include_untracked,
            }) => stash::stash_push(ctx, message, include_untracked),
            Some(StashAction::List) => stash::stash_list(ctx),
            Some(StashAction::Apply { entry }) => stash::stash_apply(ctx, entry.as_deref()),
            Some(StashAction::Pop { entry }) => stash::stash_pop(ctx, entry.as_deref()),
            Some(StashAction::Drop { entry }) => stash::stash_drop(ctx, entry.as_deref()),
            Some(StashAction::Clear) => stash::stash_clear(ctx),
        },

        Command::Merge { source } => recovery::merge(ctx, &source),
        Command::Pull { strategy } => remote::pull(ctx, strategy.strategy()),
        Command::Push => remote::push(ctx),
        Command::Continue => recovery::continue_op(ctx),
        Command::Abort => recovery::abort(ctx),
        Command::Resolve { path, side } => recovery::resolve(ctx, &path, side.side()),

        Command::Tag { action } => match action {
            None | Some(TagAction::List) => tag::tag_list(ctx),
            Some(TagAction::Create { name, message }) => tag::tag_create(ctx, &name, message),
            Some(TagAction::Delete { name }) => tag::tag_delete(ctx, &name),
        },

        Command::Config { action } => match action {
            ConfigAction::Get { key } => config_cmd::get(ctx, &key),
            ConfigAction::Set { key, value, global } => config_cmd::set(ctx, &key, &value, global),
            ConfigAction::List => config_cmd::list(ctx),
        },
    }
}

/// An orchestrator with the working copy at the command's directory open.
///
/// Shuts the orchestrator down when dropped.
pub(crate) struct Session {
    pub orchestrator: Orchestrator,
    pub config: Config,
    pub verbosity: Verbosity,
    pub interactive: bool,
    cwd: PathBuf,
}

impl Session {
    pub fn open(ctx: &Context) -> Result<Self> {
        Self::open_with(ctx, |_| {})
    }

    /// Open, letting command flags override configured settings.
    pub fn open_with(ctx: &Context, adjust: impl FnOnce(&mut OrchestratorSettings)) -> Result<Self> {
        let cwd = ctx.cwd()?;
        let info = Git::open(&cwd)
            .and_then(|git| git.info())
            .context("Not inside a git repository")?;
        let paths = StagehandPaths::from_repo_info(&info);
        let config = Config::load(Some(&paths)).context("Failed to load config")?;

        let mut settings = OrchestratorSettings::from_config(&config);
        adjust(&mut settings);

        let session = Self::start(ctx, config, settings, cwd)?;
        session
            .orchestrator
            .open_working_copy(&session.cwd)
            .wait()
            .context("Failed to open the working copy")?;
        Ok(session)
    }

    /// A session with no working copy open yet.
    pub fn start(
        ctx: &Context,
        config: Config,
        settings: OrchestratorSettings,
        cwd: PathBuf,
    ) -> Result<Self> {
        let orchestrator = Orchestrator::new(settings).context("Failed to start the scheduler")?;
        let verbosity = ctx.verbosity();
        orchestrator.subscribe(Arc::new(ConsoleReporter::new(verbosity)));

        Ok(Self {
            orchestrator,
            interactive: ctx.interactive && config.interactive(),
            config,
            verbosity,
            cwd,
        })
    }

    /// Wait for `ticket`, turning a failed operation into an error.
    pub fn finish(&self, ticket: OperationTicket) -> Result<OperationOutcome> {
        let kind = ticket.kind();
        ticket.wait().with_context(|| format!("{} failed", kind))
    }

    /// Turn paths typed relative to the current directory into paths
    /// relative to the working copy root.
    pub fn repo_paths(&self, paths: &[String]) -> Result<Vec<String>> {
        let work_dir = self
            .orchestrator
            .work_dir()
            .context("No working copy is open")?;
        let offset = relative_offset(&self.cwd, &work_dir);

        paths
            .iter()
            .map(|path| {
                let joined = offset.join(path);
                let handle = self.orchestrator.handle().context("No working copy is open")?;
                handle
                    .relativize(&joined)
                    .with_context(|| format!("'{}' is outside the working copy", path))
            })
            .collect()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.orchestrator.shutdown();
    }
}

/// Where `cwd` sits below `work_dir`; empty when it is the root or outside.
fn relative_offset(cwd: &Path, work_dir: &Path) -> PathBuf {
    let canonical = |p: &Path| p.canonicalize().unwrap_or_else(|_| p.to_path_buf());
    canonical(cwd)
        .strip_prefix(canonical(work_dir))
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn offset_of_subdirectory() {
        let temp = TempDir::new().unwrap();
        let sub = temp.path().join("src/nested");
        std::fs::create_dir_all(&sub).unwrap();
        assert_eq!(relative_offset(&sub, temp.path()), PathBuf::from("src/nested"));
        assert_eq!(relative_offset(temp.path(), temp.path()), PathBuf::new());
    }
}
