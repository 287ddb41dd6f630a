//! ui::output
//!
//! Output formatting and display.
//!
//! # Design
//!
//! Output respects the quiet flag. Operation results reach the terminal
//! through [`ConsoleReporter`], a listener like any other front-end view;
//! commands themselves only print what they queried.

use std::fmt::{Display, Write as _};

use crate::core::types::{FileChange, Oid};
use crate::engine::{
    Listener, OperationDescriptor, OperationEvent, OperationKind, OperationOutcome, PullSummary,
    RepositoryStatus,
};
use crate::git::IntegrationOutcome;

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Quiet mode - minimal output
    Quiet,
    /// Normal mode - standard output
    Normal,
    /// Debug mode - verbose output
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

/// Print a message (respects quiet mode).
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Print a warning message (respects quiet mode).
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        eprintln!("warning: {}", message);
    }
}

/// Format a list of items.
pub fn format_list<T: Display>(items: &[T], prefix: &str) -> String {
    items
        .iter()
        .map(|item| format!("{}{}", prefix, item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn short(oid: &Oid) -> &str {
    oid.short(7)
}

fn conflict_hint(paths: &[FileChange]) -> String {
    format!(
        "conflicts in:\n{}\nresolve them, then run `stagehand continue` (or `stagehand abort`)",
        format_list(paths, "  ")
    )
}

fn describe_integration(outcome: &IntegrationOutcome, source: &str) -> String {
    match outcome {
        IntegrationOutcome::UpToDate => "Already up to date".to_string(),
        IntegrationOutcome::FastForward { head } => {
            format!("Fast-forwarded to {} ({})", source, short(head))
        }
        IntegrationOutcome::Merged { commit } => format!("Merged {} ({})", source, short(commit)),
        IntegrationOutcome::Rebased { head } => format!("Rebased onto {} ({})", source, short(head)),
        IntegrationOutcome::Conflicts { paths } => {
            format!("Stopped on {}", conflict_hint(paths))
        }
    }
}

/// One-paragraph summary of a finished operation.
pub fn describe_outcome(descriptor: &OperationDescriptor, outcome: &OperationOutcome) -> String {
    match outcome {
        OperationOutcome::Done => format!("{}: done", descriptor),
        OperationOutcome::Opened { work_dir } => format!("Opened {}", work_dir.display()),
        OperationOutcome::Committed { oid } => format!("Committed {}", short(oid)),
        OperationOutcome::Switched { branch, stash } => match stash {
            Some(stash) => format!("Switched to {} (local changes saved as {})", branch, stash),
            None => format!("Switched to {}", branch),
        },
        OperationOutcome::Stashed(Some(entry)) => format!("Saved {}", entry),
        OperationOutcome::Stashed(None) => "No local changes to save".to_string(),
        OperationOutcome::StashApplied {
            entry,
            conflicts,
            dropped,
        } => {
            if !conflicts.is_empty() {
                let kept = if descriptor.kind == OperationKind::StashPop {
                    "; the entry was kept"
                } else {
                    ""
                };
                format!(
                    "Applied {} with conflicts in:\n{}\nresolve them, then stage the files{}",
                    entry,
                    format_list(conflicts, "  "),
                    kept
                )
            } else if *dropped {
                format!("Popped {}", entry)
            } else {
                format!("Applied {}", entry)
            }
        }
        OperationOutcome::StashDropped { entries } => match entries.as_slice() {
            [single] => format!("Dropped {}", single),
            many => format!("Dropped {} stash entries", many.len()),
        },
        OperationOutcome::Pulled(pull) => {
            match PullSummary::from_result(&Ok(outcome.clone())) {
                PullSummary::Conflicts(paths) => format!(
                    "Pull ({}) from {} stopped on {}",
                    pull.strategy,
                    pull.source,
                    conflict_hint(&paths)
                ),
                _ => describe_integration(&pull.result, &pull.source),
            }
        }
        OperationOutcome::Pushed(report) => match &report.upstream_set {
            Some(upstream) => format!("Pushed to {} (tracking {})", report.remote_ref, upstream),
            None => format!("Pushed to {}", report.remote_ref),
        },
        OperationOutcome::Integrated(result) => {
            let source = match &descriptor.payload {
                Some(crate::engine::OperationPayload::Merge { source }) => source.as_str(),
                _ => "the in-progress operation",
            };
            describe_integration(result, source)
        }
        OperationOutcome::Reset { head } => format!("HEAD is now at {}", short(head)),
        OperationOutcome::BranchCreated { name, head } => {
            format!("Created branch {} at {}", name, short(head))
        }
        OperationOutcome::TagCreated { name, target } => {
            format!("Created tag {} at {}", name, short(target))
        }
    }
}

/// Multi-line status view.
pub fn render_status(status: &RepositoryStatus) -> String {
    let mut out = String::new();
    if status.branch.is_detached {
        let _ = writeln!(out, "HEAD {}", status.branch);
    } else {
        let _ = writeln!(out, "On branch {} ({})", status.branch, status.ahead_behind);
    }
    let _ = writeln!(out, "State: {}", status.state);

    for (title, changes) in [
        ("Conflicted", &status.conflicted),
        ("Staged", &status.staged),
        ("Unstaged", &status.unstaged),
    ] {
        if !changes.is_empty() {
            let _ = writeln!(out, "{}:\n{}", title, format_list(changes, "  "));
        }
    }
    if status.stash_count > 0 {
        let _ = writeln!(out, "Stashes: {}", status.stash_count);
    }
    out.trim_end().to_string()
}

/// Prints the result of every finished operation.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleReporter {
    verbosity: Verbosity,
}

impl ConsoleReporter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }
}

impl Listener for ConsoleReporter {
    fn on_event(&self, event: &OperationEvent) -> anyhow::Result<()> {
        match event {
            OperationEvent::AboutToStart { descriptor } => {
                if self.verbosity == Verbosity::Debug {
                    eprintln!("[debug] {} ({})", descriptor, descriptor.id);
                }
            }
            // Opening is plumbing; only the operations after it are news.
            OperationEvent::Succeeded { descriptor, .. }
                if descriptor.kind == OperationKind::OpenWorkingCopy
                    && self.verbosity != Verbosity::Debug => {}
            OperationEvent::Succeeded {
                descriptor,
                outcome,
                ..
            } => print(describe_outcome(descriptor, outcome), self.verbosity),
            OperationEvent::Failed {
                descriptor, state, ..
            } => {
                // The error itself is reported by the command.
                if let Some(state) = state.as_ref().filter(|s| !s.is_clean()) {
                    warn(
                        format!("after {}, the repository is {}", descriptor, state),
                        self.verbosity,
                    );
                }
            }
        }
        Ok(())
    }
}
