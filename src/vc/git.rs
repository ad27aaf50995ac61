// src/vc/git.rs

//! Git backend driving the `git` executable
//!
//! Recipe fields understood:
//! - `repo`: `user/name` on a known forge, or a full URL or path
//! - `host`: `github` (default), `gitlab`, `codeberg`, `sourcehut`, or any
//!   other hostname
//! - `branch`: branch to track
//! - `remote`: name of the primary remote (default `origin`)
//! - `upstream`: `user/name` or URL of an upstream to pull from
//! - `depth`: shallow clone depth

use super::VcBackend;
use crate::error::{Error, Result};
use crate::host::interrupted;
use crate::recipe::Recipe;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

const KEYWORDS: &[&str] = &["branch", "depth", "host", "remote", "repo", "upstream"];
const DEFAULT_REMOTE: &str = "origin";
const UPSTREAM_REMOTE: &str = "upstream";

/// Git via the command-line client
#[derive(Debug, Clone)]
pub struct GitBackend {
    executable: String,
}

impl Default for GitBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GitBackend {
    pub fn new() -> Self {
        Self {
            executable: "git".to_string(),
        }
    }

    /// Use a different `git` binary
    pub fn with_executable(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Clone URL for the recipe's primary repository
    pub fn clone_url(recipe: &Recipe) -> Result<String> {
        let repo = recipe.field_str("repo").ok_or_else(|| {
            Error::InvalidRecipe(format!("{}: git recipes need a 'repo' field", recipe.package))
        })?;
        Ok(expand_url(repo, recipe.field_str("host")))
    }

    fn remote_name(recipe: &Recipe) -> &str {
        recipe.field_str("remote").unwrap_or(DEFAULT_REMOTE)
    }

    fn run(&self, repo_dir: &Path, cwd: Option<&Path>, args: &[&str]) -> Result<String> {
        debug!("{} {}", self.executable, args.join(" "));

        let mut command = Command::new(&self.executable);
        command.args(args);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|e| {
            Error::CommandFailed(format!("Failed to run {}: {}", self.executable, e))
        })?;

        if interrupted(&output.status) {
            return Err(Error::Aborted(format!("git {} interrupted", args.join(" "))));
        }
        if !output.status.success() {
            return Err(Error::VcError {
                backend: "git".to_string(),
                repo: repo_dir.display().to_string(),
                reason: format!(
                    "git {} exited with {}: {}",
                    args.first().copied().unwrap_or_default(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn in_repo(&self, repo_dir: &Path, args: &[&str]) -> Result<String> {
        self.run(repo_dir, Some(repo_dir), args)
    }
}

/// Expand a `repo` field into a clone URL
fn expand_url(repo: &str, host: Option<&str>) -> String {
    if repo.contains("://") || repo.starts_with("git@") || repo.starts_with('/') {
        return repo.to_string();
    }

    match host.unwrap_or("github") {
        "github" => format!("https://github.com/{}.git", repo),
        "gitlab" => format!("https://gitlab.com/{}.git", repo),
        "codeberg" => format!("https://codeberg.org/{}.git", repo),
        "sourcehut" => format!("https://git.sr.ht/~{}", repo.trim_start_matches('~')),
        other => format!("https://{}/{}.git", other, repo),
    }
}

impl VcBackend for GitBackend {
    fn name(&self) -> &str {
        "git"
    }

    fn clone_repo(&self, recipe: &Recipe, repo_dir: &Path, commit: Option<&str>) -> Result<()> {
        let url = Self::clone_url(recipe)?;
        let target = repo_dir.to_string_lossy().into_owned();
        info!("Cloning {} into {}", url, repo_dir.display());

        if let Some(parent) = repo_dir.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let depth = recipe
            .field("depth")
            .and_then(|v| v.as_u64().map(|d| d.to_string()).or_else(|| v.as_str().map(String::from)));

        let mut args: Vec<&str> = vec!["clone", "--origin", Self::remote_name(recipe)];
        // A pinned commit may be older than a shallow history reaches
        if commit.is_none() {
            if let Some(depth) = depth.as_deref() {
                args.extend(["--depth", depth]);
            }
        }
        if let Some(branch) = recipe.field_str("branch") {
            args.extend(["--branch", branch]);
        }
        args.extend([url.as_str(), target.as_str()]);
        self.run(repo_dir, None, &args)?;

        if let Some(upstream) = recipe.field_str("upstream") {
            let upstream_url = expand_url(upstream, recipe.field_str("host"));
            self.in_repo(repo_dir, &["remote", "add", UPSTREAM_REMOTE, &upstream_url])?;
        }

        if let Some(commit) = commit {
            self.checkout_commit(repo_dir, commit)?;
        }
        Ok(())
    }

    fn ensure_local_state_matches(&self, recipe: &Recipe, repo_dir: &Path) -> Result<bool> {
        let remote = Self::remote_name(recipe);
        let url = Self::clone_url(recipe)?;
        let mut changed = false;

        let current = self.in_repo(repo_dir, &["remote", "get-url", remote]).ok();
        match current {
            Some(current) if current == url => {}
            Some(_) => {
                debug!("Updating {} remote of {}", remote, repo_dir.display());
                self.in_repo(repo_dir, &["remote", "set-url", remote, &url])?;
                changed = true;
            }
            None => {
                self.in_repo(repo_dir, &["remote", "add", remote, &url])?;
                changed = true;
            }
        }

        if let Some(branch) = recipe.field_str("branch") {
            let head = self.in_repo(repo_dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
            if head != branch {
                debug!("Switching {} to branch {}", repo_dir.display(), branch);
                self.in_repo(repo_dir, &["checkout", "--quiet", branch])?;
                changed = true;
            }
        }

        Ok(changed)
    }

    fn pull(&self, recipe: &Recipe, repo_dir: &Path, from_upstream: bool) -> Result<()> {
        let remote = if from_upstream {
            if recipe.field_str("upstream").is_none() {
                return Err(Error::VcError {
                    backend: "git".to_string(),
                    repo: recipe.local_repo.clone(),
                    reason: "no upstream configured".to_string(),
                });
            }
            UPSTREAM_REMOTE
        } else {
            Self::remote_name(recipe)
        };

        info!("Pulling {} from {}", recipe.local_repo, remote);
        let mut args = vec!["pull", "--ff-only", remote];
        if let Some(branch) = recipe.field_str("branch") {
            args.push(branch);
        }
        self.in_repo(repo_dir, &args)?;
        Ok(())
    }

    fn push(&self, recipe: &Recipe, repo_dir: &Path) -> Result<()> {
        let remote = Self::remote_name(recipe);
        info!("Pushing {} to {}", recipe.local_repo, remote);
        self.in_repo(repo_dir, &["push", remote, "HEAD"])?;
        Ok(())
    }

    fn checkout_commit(&self, repo_dir: &Path, commit: &str) -> Result<()> {
        debug!("Checking out {} in {}", commit, repo_dir.display());
        self.in_repo(repo_dir, &["checkout", "--quiet", commit])?;
        Ok(())
    }

    fn current_commit(&self, repo_dir: &Path) -> Result<String> {
        self.in_repo(repo_dir, &["rev-parse", "HEAD"])
    }

    fn derive_repo_name(&self, recipe: &Recipe) -> Option<String> {
        let repo = recipe.field_str("repo")?;
        let last = repo
            .trim_end_matches('/')
            .rsplit(['/', ':'])
            .next()?
            .trim_start_matches('~');
        let name = last.strip_suffix(".git").unwrap_or(last);
        (!name.is_empty()).then(|| name.to_string())
    }

    fn relevant_keywords(&self) -> &'static [&'static str] {
        KEYWORDS
    }
}
