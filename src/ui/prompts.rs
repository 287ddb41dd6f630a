//! ui::prompts
//!
//! Interactive prompts and confirmations.
//!
//! # Design
//!
//! Prompts are only shown in interactive mode. In non-interactive mode,
//! operations requiring user input must either have defaults or fail
//! with a clear error message.

use std::io::{self, BufRead, Write};

use thiserror::Error;
use tracing::warn;

use crate::engine::{CredentialProvider, SwitchDecision, SwitchPrompt};
use crate::git::Credentials;

/// Errors from prompts.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt cancelled by user")]
    Cancelled,

    #[error("not in interactive mode")]
    NotInteractive,

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

fn read_line(message: &str) -> Result<String, PromptError> {
    eprint!("{}", message);
    io::stderr().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(PromptError::Cancelled);
    }
    Ok(line.trim().to_string())
}

/// Prompt for confirmation (yes/no).
///
/// An empty answer takes `default`.
pub fn confirm(message: &str, default: bool, interactive: bool) -> Result<bool, PromptError> {
    if !interactive {
        return Err(PromptError::NotInteractive);
    }
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        match read_line(&format!("{} {} ", message, hint))?.to_lowercase().as_str() {
            "" => return Ok(default),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => eprintln!("Please answer y or n."),
        }
    }
}

/// Prompt for text input. An empty answer takes `default` when given.
pub fn input(
    message: &str,
    default: Option<&str>,
    interactive: bool,
) -> Result<String, PromptError> {
    if !interactive {
        return Err(PromptError::NotInteractive);
    }
    let prompt = match default {
        Some(default) => format!("{} [{}]: ", message, default),
        None => format!("{}: ", message),
    };
    let answer = read_line(&prompt)?;
    match (answer.is_empty(), default) {
        (true, Some(default)) => Ok(default.to_string()),
        _ => Ok(answer),
    }
}

/// Prompt to select from a list of options.
///
/// Returns the index of the selected option.
pub fn select<T: AsRef<str>>(
    message: &str,
    options: &[T],
    default: Option<usize>,
    interactive: bool,
) -> Result<usize, PromptError> {
    if !interactive {
        return Err(PromptError::NotInteractive);
    }
    eprintln!("{}", message);
    for (i, option) in options.iter().enumerate() {
        let marker = if Some(i) == default { "*" } else { " " };
        eprintln!("{} {}) {}", marker, i + 1, option.as_ref());
    }

    loop {
        let answer = read_line("> ")?;
        if answer.is_empty() {
            if let Some(default) = default {
                return Ok(default);
            }
        }
        match answer.parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) => return Ok(n - 1),
            _ => eprintln!("Enter a number from 1 to {}.", options.len()),
        }
    }
}

/// Prompt for masked input (e.g., passwords, tokens).
///
/// The input is not echoed to the terminal.
pub fn password(message: &str, interactive: bool) -> Result<String, PromptError> {
    if !interactive {
        return Err(PromptError::NotInteractive);
    }
    Ok(rpassword::prompt_password(format!("{}: ", message))?)
}

/// The three-way question asked before switching with local changes.
pub fn switch_decision(
    prompt: &SwitchPrompt<'_>,
    interactive: bool,
) -> Result<SwitchDecision, PromptError> {
    let status = prompt.status;
    let changed = status.staged.len() + status.unstaged.len();
    let message = format!(
        "{} has {} uncommitted change(s). Switch to {}?",
        status.branch, changed, prompt.target
    );
    let options = [
        "Stash the changes, then switch",
        "Switch anyway (fails if changes would be overwritten)",
        "Cancel",
    ];

    Ok(match select(&message, &options, Some(0), interactive)? {
        0 => SwitchDecision::StashThenSwitch,
        1 => SwitchDecision::SwitchAnyway,
        _ => SwitchDecision::Cancel,
    })
}

/// Asks on the terminal for HTTPS credentials.
#[derive(Debug, Clone, Copy)]
pub struct TerminalCredentials {
    interactive: bool,
}

impl TerminalCredentials {
    pub fn new(interactive: bool) -> Self {
        Self { interactive }
    }
}

impl CredentialProvider for TerminalCredentials {
    fn credentials(&self, remote: &str, url: &str) -> Option<Credentials> {
        if !self.interactive {
            return None;
        }
        let asked = input(&format!("Username for {} ({})", remote, url), None, true)
            .and_then(|username| {
                let secret = password(&format!("Password for {}", username), true)?;
                Ok(Credentials::new(username, secret))
            });
        match asked {
            Ok(credentials) if !credentials.username.is_empty() => Some(credentials),
            Ok(_) => None,
            Err(e) => {
                warn!(remote, error = %e, "no credentials entered");
                None
            }
        }
    }
}
