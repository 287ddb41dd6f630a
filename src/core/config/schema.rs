//! core::config::schema
//!
//! Configuration schema types.
//!
//! Both scopes share the operation defaults; repository values win over
//! global ones. Values are validated after parsing, so an unknown pull
//! strategy or an empty remote name is reported at load time instead of
//! at the first pull.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::PullStrategy;

/// What a branch switch does when the working copy has uncommitted changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoStash {
    /// Ask the caller every time.
    #[default]
    Ask,
    /// Stash, then switch.
    Always,
    /// Switch without stashing; the switch fails if changes would be lost.
    Never,
}

impl FromStr for AutoStash {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ask" => Ok(AutoStash::Ask),
            "always" => Ok(AutoStash::Always),
            "never" => Ok(AutoStash::Never),
            other => Err(ConfigError::InvalidValue(format!(
                "invalid auto_stash_on_switch '{other}', must be one of: ask, always, never"
            ))),
        }
    }
}

impl fmt::Display for AutoStash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AutoStash::Ask => "ask",
            AutoStash::Always => "always",
            AutoStash::Never => "never",
        })
    }
}

/// Settings that apply to every repository operation. This is the whole of
/// the repository scope and a subset of the global one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct OperationDefaults {
    /// Remote used by pull and push (default: "origin")
    pub remote: Option<String>,

    /// How pull integrates fetched commits
    pub pull_strategy: Option<PullStrategy>,

    /// Whether stashes include untracked files
    pub stash_include_untracked: Option<bool>,

    /// Branch switch behaviour with a dirty working copy
    pub auto_stash_on_switch: Option<AutoStash>,
}

impl OperationDefaults {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(remote) = &self.remote {
            if remote.trim().is_empty() || remote.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid remote name '{remote}'"
                )));
            }
        }
        Ok(())
    }

    /// Apply `key = value` to this scope.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "remote" => self.remote = Some(value.to_string()),
            "pull_strategy" => {
                self.pull_strategy = Some(
                    value
                        .parse()
                        .map_err(|e| ConfigError::InvalidValue(format!("{e}")))?,
                )
            }
            "stash_include_untracked" => self.stash_include_untracked = Some(parse_bool(key, value)?),
            "auto_stash_on_switch" => self.auto_stash_on_switch = Some(value.parse()?),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        self.validate()
    }

    /// Read `key` from this scope, if set.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "remote" => self.remote.clone(),
            "pull_strategy" => self.pull_strategy.map(|s| s.to_string()),
            "stash_include_untracked" => self.stash_include_untracked.map(|b| b.to_string()),
            "auto_stash_on_switch" => self.auto_stash_on_switch.map(|a| a.to_string()),
            _ => None,
        }
    }
}

/// Scheduler shutdown behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ShutdownConfig {
    /// Block the caller until the queue is drained (default: true)
    pub wait: Option<bool>,

    /// Drop queued tasks that have not started (default: false)
    pub discard_pending: Option<bool>,
}

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// interactive = true
/// pull_strategy = "rebase"
///
/// [shutdown]
/// wait = true
/// discard_pending = false
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default interactive mode
    pub interactive: Option<bool>,

    /// Remote used by pull and push
    pub remote: Option<String>,

    /// How pull integrates fetched commits
    pub pull_strategy: Option<PullStrategy>,

    /// Whether stashes include untracked files
    pub stash_include_untracked: Option<bool>,

    /// Branch switch behaviour with a dirty working copy
    pub auto_stash_on_switch: Option<AutoStash>,

    /// Scheduler shutdown behaviour
    pub shutdown: Option<ShutdownConfig>,
}

impl GlobalConfig {
    /// Keys accepted by `config set --global`.
    pub const KEYS: &'static [&'static str] = &[
        "interactive",
        "remote",
        "pull_strategy",
        "stash_include_untracked",
        "auto_stash_on_switch",
        "shutdown.wait",
        "shutdown.discard_pending",
    ];

    /// The operation defaults this scope sets.
    pub fn defaults(&self) -> OperationDefaults {
        OperationDefaults {
            remote: self.remote.clone(),
            pull_strategy: self.pull_strategy,
            stash_include_untracked: self.stash_include_untracked,
            auto_stash_on_switch: self.auto_stash_on_switch,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.defaults().validate()
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "interactive" => self.interactive = Some(parse_bool(key, value)?),
            "shutdown.wait" => {
                self.shutdown.get_or_insert_with(Default::default).wait =
                    Some(parse_bool(key, value)?)
            }
            "shutdown.discard_pending" => {
                self.shutdown
                    .get_or_insert_with(Default::default)
                    .discard_pending = Some(parse_bool(key, value)?)
            }
            _ => {
                let mut defaults = self.defaults();
                defaults.set(key, value)?;
                self.remote = defaults.remote;
                self.pull_strategy = defaults.pull_strategy;
                self.stash_include_untracked = defaults.stash_include_untracked;
                self.auto_stash_on_switch = defaults.auto_stash_on_switch;
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let shutdown = self.shutdown.as_ref();
        match key {
            "interactive" => self.interactive.map(|b| b.to_string()),
            "shutdown.wait" => shutdown.and_then(|s| s.wait).map(|b| b.to_string()),
            "shutdown.discard_pending" => shutdown
                .and_then(|s| s.discard_pending)
                .map(|b| b.to_string()),
            _ => self.defaults().get(key),
        }
    }
}

/// Repository configuration.
///
/// Holds only operation defaults; the file lives at
/// `<git_dir>/stagehand/config.toml`.
///
/// # Example
///
/// ```toml
/// remote = "upstream"
/// pull_strategy = "merge"
/// auto_stash_on_switch = "always"
/// ```
pub type RepoConfig = OperationDefaults;

impl OperationDefaults {
    /// Keys accepted by `config set`.
    pub const KEYS: &'static [&'static str] = &[
        "remote",
        "pull_strategy",
        "stash_include_untracked",
        "auto_stash_on_switch",
    ];
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue(format!(
            "{key} expects a boolean, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod parsing {
        use super::*;

        #[test]
        fn global_with_all_fields() {
            let config: GlobalConfig = toml::from_str(
                r#"
                interactive = false
                remote = "upstream"
                pull_strategy = "rebase"
                stash_include_untracked = true
                auto_stash_on_switch = "always"

                [shutdown]
                wait = false
                discard_pending = true
                "#,
            )
            .unwrap();

            assert_eq!(config.interactive, Some(false));
            assert_eq!(config.pull_strategy, Some(PullStrategy::Rebase));
            assert_eq!(config.auto_stash_on_switch, Some(AutoStash::Always));
            assert_eq!(config.shutdown.unwrap().discard_pending, Some(true));
        }

        #[test]
        fn empty_is_default() {
            let config: RepoConfig = toml::from_str("").unwrap();
            assert_eq!(config, RepoConfig::default());
        }

        #[test]
        fn unknown_strategy_rejected() {
            let parsed: Result<RepoConfig, _> = toml::from_str("pull_strategy = \"octopus\"");
            assert!(parsed.is_err());
        }
    }

    mod validation {
        use super::*;

        #[test]
        fn empty_remote_rejected() {
            let config = RepoConfig {
                remote: Some(" ".into()),
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }
    }

    mod set_get {
        use super::*;

        #[test]
        fn repo_round_trip() {
            let mut config = RepoConfig::default();
            config.set("pull_strategy", "rebase").unwrap();
            config.set("stash_include_untracked", "yes").unwrap();
            assert_eq!(config.get("pull_strategy").as_deref(), Some("rebase"));
            assert_eq!(config.get("stash_include_untracked").as_deref(), Some("true"));
        }

        #[test]
        fn global_nested_keys() {
            let mut config = GlobalConfig::default();
            config.set("shutdown.wait", "false").unwrap();
            assert_eq!(config.get("shutdown.wait").as_deref(), Some("false"));
            assert_eq!(config.get("shutdown.discard_pending"), None);
        }

        #[test]
        fn unknown_key_rejected() {
            let mut config = RepoConfig::default();
            assert!(matches!(
                config.set("interactive", "true"),
                Err(ConfigError::UnknownKey(_))
            ));
        }

        #[test]
        fn global_shared_key_lands_on_global() {
            let mut config = GlobalConfig::default();
            config.set("remote", "upstream").unwrap();
            assert_eq!(config.remote.as_deref(), Some("upstream"));
        }

        #[test]
        fn bad_bool_rejected() {
            let mut config = GlobalConfig::default();
            assert!(config.set("interactive", "maybe").is_err());
        }
    }
}
