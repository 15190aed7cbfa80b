//! Git operations
//!
//! Lists the branch heads of remote repositories with `git ls-remote`.
//! Transient failures (network hiccups, rate limits) are retried with
//! exponential backoff.

use backoff::ExponentialBackoffBuilder;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::config::defaults;
use crate::core::revision::{BranchLister, RemoteBranch};
use crate::error::GitError;

/// Branch lister backed by the `git` executable
#[derive(Debug, Clone)]
pub struct GitLsRemote {
    /// Path to the git binary
    git: PathBuf,
    /// Give up retrying after this long
    max_elapsed: Duration,
}

impl GitLsRemote {
    /// Use the given git binary
    pub fn new(git: PathBuf) -> Self {
        Self {
            git,
            max_elapsed: Duration::from_secs(defaults::LS_REMOTE_MAX_ELAPSED_SECS),
        }
    }

    /// Find git in PATH
    pub fn locate() -> Result<Self, GitError> {
        which::which("git")
            .map(Self::new)
            .map_err(|_| GitError::GitNotFound)
    }

    /// Set the retry budget
    #[must_use]
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    /// Get the git binary path
    pub fn git_path(&self) -> &Path {
        &self.git
    }

    /// Single ls-remote attempt without retry
    fn ls_remote_once(&self, repo: &str) -> Result<String, GitError> {
        let output = Command::new(&self.git)
            .args(["ls-remote", "--heads", repo])
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| GitError::LsRemoteFailed {
                repo: repo.to_string(),
                error: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(GitError::LsRemoteFailed {
                repo: repo.to_string(),
                error: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl BranchLister for GitLsRemote {
    fn list_branches(&self, repo: &str) -> Result<Vec<RemoteBranch>, GitError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build();

        let output = backoff::retry(policy, || {
            self.ls_remote_once(repo).map_err(|e| {
                tracing::debug!("ls-remote of {repo} failed, retrying: {e}");
                backoff::Error::transient(e)
            })
        })
        .map_err(|e| match e {
            backoff::Error::Permanent(err) | backoff::Error::Transient { err, .. } => err,
        })?;

        parse_ls_remote(repo, &output)
    }
}

/// Parse `git ls-remote --heads` output into branches, in listing order
pub fn parse_ls_remote(repo: &str, output: &str) -> Result<Vec<RemoteBranch>, GitError> {
    let re = Regex::new(r"^([0-9a-fA-F]{7,64})\s+refs/heads/(\S+)$").map_err(|e| {
        GitError::MalformedOutput {
            repo: repo.to_string(),
            line: format!("Invalid regex: {e}"),
        }
    })?;

    let mut branches = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let caps = re.captures(line).ok_or_else(|| GitError::MalformedOutput {
            repo: repo.to_string(),
            line: line.to_string(),
        })?;
        branches.push(RemoteBranch::new(&caps[2], &caps[1].to_lowercase()));
    }
    Ok(branches)
}
