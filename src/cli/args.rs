//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--cwd <path>`: Run as if in that directory
//! - `--debug`: Enable debug logging
//! - `--interactive` / `--no-interactive`: Control prompts
//! - `--quiet` / `-q`: Minimal output

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::core::types::{ConflictSide, PullStrategy, ResetMode};

/// Stagehand - serialized git operations for interactive front-ends
#[derive(Parser, Debug)]
#[command(name = "stagehand")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run as if stagehand was started in this directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output; implies --no-interactive
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable interactive prompts
    #[arg(long = "interactive", global = true, conflicts_with = "no_interactive")]
    pub interactive_flag: bool,

    /// Disable interactive prompts
    #[arg(long, global = true)]
    pub no_interactive: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// Determine if interactive mode is enabled.
    ///
    /// Returns true if:
    /// - `--interactive` was explicitly set, OR
    /// - Neither `--no-interactive` nor `--quiet` was set AND stdin is a TTY
    pub fn interactive(&self) -> bool {
        if self.interactive_flag {
            true
        } else if self.no_interactive || self.quiet {
            false
        } else {
            std::io::stdin().is_terminal()
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a repository and open it
    Init {
        /// Directory to create the repository in (default: current)
        path: Option<PathBuf>,
    },

    /// Show branch, state flags and changes
    #[command(
        long_about = "Show the current branch, its ahead/behind counts, the repository \
            state flags, and the staged, unstaged and conflicted paths.\n\n\
            State is read fresh on every call; several flags can hold at once, \
            e.g. `merging, conflicted, stash present`."
    )]
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stage paths for the next commit
    Stage {
        /// Paths to stage; deleted paths are staged as removals
        #[arg(required_unless_present = "all")]
        paths: Vec<String>,

        /// Stage every change, including untracked files
        #[arg(short, long, conflicts_with = "paths")]
        all: bool,
    },

    /// Remove paths from the index, keeping working-tree changes
    Unstage {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Throw away working-tree changes to paths
    Discard {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Commit the index
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,
    },

    /// List, create or delete branches
    Branch {
        #[command(subcommand)]
        action: Option<BranchAction>,
    },

    /// Switch to a branch or commit
    #[command(
        long_about = "Switch to a branch, or detach HEAD at any revision.\n\n\
            With uncommitted changes you are asked whether to stash them first, \
            switch anyway, or cancel. The stash is created before the switch; if \
            the switch then fails, the stash is kept.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Switch, deciding interactively what to do with local changes
    stagehand switch feature

    # Stash local changes without asking
    stagehand switch feature --stash

    # Inspect an old commit
    stagehand switch 3f2a9c1"
    )]
    Switch {
        /// Branch name or revision
        target: String,

        /// Stash uncommitted changes before switching
        #[arg(long, conflicts_with = "force")]
        stash: bool,

        /// Switch without stashing
        #[arg(long)]
        force: bool,
    },

    /// Save, list, apply and drop stashes
    Stash {
        #[command(subcommand)]
        action: Option<StashAction>,
    },

    /// Merge a branch into HEAD
    Merge {
        /// Branch or remote-tracking branch to merge
        source: String,
    },

    /// Fetch, then merge or rebase onto the upstream
    #[command(
        after_help = "\
RESULTS:
    Up to date, fast-forward, merged and rebased pulls finish on their own.
    A pull that stops on conflicts leaves the repository merging or rebasing:
        stagehand status                      # see what is conflicted
        stagehand resolve <path> --theirs     # or --ours, or edit and --mark
        stagehand continue                    # or: stagehand abort"
    )]
    Pull {
        #[command(flatten)]
        strategy: StrategyArgs,
    },

    /// Push the current branch
    Push,

    /// Continue the merge or rebase in progress
    Continue,

    /// Abort the merge or rebase in progress
    Abort,

    /// Resolve a conflicted path
    Resolve {
        path: String,

        #[command(flatten)]
        side: ResolveArgs,
    },

    /// List, create or delete tags
    Tag {
        #[command(subcommand)]
        action: Option<TagAction>,
    },

    /// Move the current branch to a revision
    Reset {
        revision: String,

        #[command(flatten)]
        mode: ResetArgs,
    },

    /// Get, set or list configuration values
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum BranchAction {
    /// List local branches
    List {
        /// Also list remote-tracking branches
        #[arg(short, long)]
        remotes: bool,
    },
    /// Create a branch
    Create {
        name: String,
        /// Start point (default: HEAD)
        #[arg(long)]
        start: Option<String>,
    },
    /// Delete a branch; the current branch cannot be deleted
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
pub enum StashAction {
    /// Stash uncommitted changes
    Push {
        #[arg(short, long)]
        message: Option<String>,
        /// Include untracked files
        #[arg(short = 'u', long)]
        include_untracked: bool,
    },
    /// List stash entries
    List,
    /// Apply an entry, keeping it
    Apply {
        /// Index or stash commit id (default: 0)
        entry: Option<String>,
    },
    /// Apply an entry and drop it if it applied cleanly
    Pop { entry: Option<String> },
    /// Drop an entry
    Drop { entry: Option<String> },
    /// Drop every entry
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum TagAction {
    /// List tags
    List,
    /// Tag HEAD; annotated when a message is given
    Create {
        name: String,
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Delete a tag
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },
    /// Set a configuration value in the repository scope
    Set {
        /// Configuration key
        key: String,
        /// Value to set
        value: String,
        /// Write the user-level config instead
        #[arg(long)]
        global: bool,
    },
    /// List all configuration values
    List,
}

#[derive(Args, Debug)]
#[group(multiple = false)]
pub struct StrategyArgs {
    /// Rebase local commits onto the upstream
    #[arg(long)]
    rebase: bool,
    /// Merge the upstream into the local branch
    #[arg(long)]
    merge: bool,
}

impl StrategyArgs {
    /// The strategy asked for, if any.
    pub fn strategy(&self) -> Option<PullStrategy> {
        if self.rebase {
            Some(PullStrategy::Rebase)
        } else if self.merge {
            Some(PullStrategy::Merge)
        } else {
            None
        }
    }
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct ResolveArgs {
    /// Keep our side
    #[arg(long)]
    ours: bool,
    /// Keep their side
    #[arg(long)]
    theirs: bool,
    /// Keep the working-tree file as edited
    #[arg(long)]
    mark: bool,
}

impl ResolveArgs {
    /// The side to take; `None` means keep the file as edited.
    pub fn side(&self) -> Option<ConflictSide> {
        if self.ours {
            Some(ConflictSide::Ours)
        } else if self.theirs {
            Some(ConflictSide::Theirs)
        } else {
            None
        }
    }
}

#[derive(Args, Debug)]
#[group(multiple = false)]
pub struct ResetArgs {
    #[arg(long)]
    soft: bool,
    #[arg(long)]
    mixed: bool,
    #[arg(long)]
    hard: bool,
}

impl ResetArgs {
    pub fn mode(&self) -> ResetMode {
        if self.soft {
            ResetMode::Soft
        } else if self.hard {
            ResetMode::Hard
        } else {
            ResetMode::Mixed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("stagehand").chain(args.iter().copied()))
    }

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn pull_strategy_flags() {
        let cli = parse(&["pull", "--rebase"]).unwrap();
        let Command::Pull { strategy } = cli.command else {
            panic!("expected pull");
        };
        assert_eq!(strategy.strategy(), Some(PullStrategy::Rebase));
        assert!(parse(&["pull", "--rebase", "--merge"]).is_err());
    }

    #[test]
    fn resolve_needs_exactly_one_side() {
        assert!(parse(&["resolve", "a.txt"]).is_err());
        assert!(parse(&["resolve", "a.txt", "--ours", "--theirs"]).is_err());
        let cli = parse(&["resolve", "a.txt", "--mark"]).unwrap();
        let Command::Resolve { side, .. } = cli.command else {
            panic!("expected resolve");
        };
        assert_eq!(side.side(), None);
    }

    #[test]
    fn switch_stash_and_force_conflict() {
        assert!(parse(&["switch", "main", "--stash", "--force"]).is_err());
    }

    #[test]
    fn quiet_implies_non_interactive() {
        let cli = parse(&["-q", "status"]).unwrap();
        assert!(!cli.interactive());
    }

    #[test]
    fn status_json_flag() {
        let cli = parse(&["status", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Status { json: true }));
    }

    #[test]
    fn stage_needs_paths_or_all() {
        assert!(parse(&["stage"]).is_err());
        assert!(parse(&["stage", "--all"]).is_ok());
    }
}
