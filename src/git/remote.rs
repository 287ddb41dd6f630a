//! git::remote
//!
//! Fetch and push.
//!
//! Credentials are resolved by the caller before a transfer starts; the
//! transfer itself never prompts. A rejected credential is not retried
//! beyond a few attempts, so a wrong password surfaces as
//! [`GitError::AuthFailed`] instead of looping inside libgit2.

use std::cell::{Cell, RefCell};
use std::fmt;

use tracing::warn;

use super::interface::{Git, GitError};
use crate::core::types::BranchName;

const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

/// Username and password for an HTTPS remote.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Result of a successful push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReport {
    /// Remote-side ref that was updated.
    pub remote_ref: String,
    /// Upstream newly recorded for the branch, if it had none.
    pub upstream_set: Option<String>,
}

fn callbacks<'a>(
    credentials: Option<&'a Credentials>,
    attempts: &'a Cell<usize>,
) -> git2::RemoteCallbacks<'a> {
    let mut callbacks = git2::RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, allowed| {
        attempts.set(attempts.get() + 1);
        if attempts.get() > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::new(
                git2::ErrorCode::Auth,
                git2::ErrorClass::Net,
                "credentials rejected",
            ));
        }

        if allowed.contains(git2::CredentialType::USER_PASS_PLAINTEXT) {
            if let Some(creds) = credentials {
                return git2::Cred::userpass_plaintext(&creds.username, &creds.password);
            }
        }
        if allowed.contains(git2::CredentialType::SSH_KEY) {
            let user = username_from_url
                .or(credentials.map(|c| c.username.as_str()))
                .unwrap_or("git");
            return git2::Cred::ssh_key_from_agent(user);
        }
        git2::Cred::default()
    });
    callbacks
}

impl Git {
    pub fn remote_url(&self, name: &str) -> Result<Option<String>, GitError> {
        match self.repo.find_remote(name) {
            Ok(remote) => Ok(remote.url().map(String::from)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, name)),
        }
    }

    pub fn list_remotes(&self) -> Result<Vec<String>, GitError> {
        let remotes = self.repo.remotes()?;
        Ok(remotes.iter().flatten().map(String::from).collect())
    }

    /// Fetch `remote` with its configured refspecs, updating tracking refs.
    pub fn fetch(&self, remote: &str, credentials: Option<&Credentials>) -> Result<(), GitError> {
        let mut handle = self
            .repo
            .find_remote(remote)
            .map_err(|e| GitError::from_git2(e, &format!("remote {remote}")))?;

        let attempts = Cell::new(0);
        let mut options = git2::FetchOptions::new();
        options.remote_callbacks(callbacks(credentials, &attempts));

        handle
            .fetch(&[] as &[&str], Some(&mut options), None)
            .map_err(|e| GitError::from_git2(e, &format!("fetch {remote}")))
    }

    /// Remote-tracking ref pull integrates for `branch`: the configured
    /// upstream, else `refs/remotes/<remote>/<branch>`.
    pub fn pull_source(&self, branch: &BranchName, remote: &str) -> Result<String, GitError> {
        if let Some(upstream) = self.upstream_of(branch)? {
            return Ok(upstream);
        }
        let fallback = format!("refs/remotes/{remote}/{branch}");
        if self.repo.find_reference(&fallback).is_ok() {
            Ok(fallback)
        } else {
            Err(GitError::NoUpstream {
                branch: branch.to_string(),
            })
        }
    }

    /// Push `branch` to the same name on `remote`, recording the upstream
    /// when the branch had none.
    pub fn push_branch(
        &self,
        remote: &str,
        branch: &BranchName,
        credentials: Option<&Credentials>,
    ) -> Result<PushReport, GitError> {
        let mut handle = self
            .repo
            .find_remote(remote)
            .map_err(|e| GitError::from_git2(e, &format!("remote {remote}")))?;

        let refname = format!("refs/heads/{branch}");
        let refspec = format!("{refname}:{refname}");
        let attempts = Cell::new(0);
        let rejection = RefCell::new(None);

        {
            let mut cbs = callbacks(credentials, &attempts);
            cbs.push_update_reference(|reference, status| {
                if let Some(message) = status {
                    *rejection.borrow_mut() = Some((reference.to_string(), message.to_string()));
                }
                Ok(())
            });
            let mut options = git2::PushOptions::new();
            options.remote_callbacks(cbs);
            handle
                .push(&[refspec.as_str()], Some(&mut options))
                .map_err(|e| GitError::from_git2(e, &format!("push {remote}")))?;
        }

        if let Some((refname, message)) = rejection.into_inner() {
            return Err(GitError::Rejected { refname, message });
        }

        let upstream_set = if self.upstream_of(branch)?.is_none() {
            let tracking = format!("{remote}/{branch}");
            match self.set_upstream(branch, &tracking) {
                Ok(()) => Some(tracking),
                Err(e) => {
                    warn!(branch = %branch, error = %e, "pushed but could not record upstream");
                    None
                }
            }
        } else {
            None
        };

        Ok(PushReport {
            remote_ref: refname,
            upstream_set,
        })
    }
}
