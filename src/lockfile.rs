// src/lockfile.rs

//! Version lockfiles
//!
//! A lockfile pins each repository of a profile to a commit. `freeze` writes
//! one from the current checkouts, cloning consults it, and `thaw` checks the
//! pinned commits out again.
//!
//! ```toml
//! version = 1
//! generated_at = "2024-05-01T12:00:00Z"
//!
//! [repos]
//! magit = "4a1c2b..."
//! "dash.el" = "9f3e1d..."
//! ```

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const LOCKFILE_VERSION: u32 = 1;

/// Repository → commit pins for one profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lockfile {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub repos: BTreeMap<String, String>,
}

impl Default for Lockfile {
    fn default() -> Self {
        Self {
            version: LOCKFILE_VERSION,
            generated_at: None,
            repos: BTreeMap::new(),
        }
    }
}

impl Lockfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pinned commit for a repository
    pub fn commit(&self, repo: &str) -> Option<&str> {
        self.repos.get(repo).map(String::as_str)
    }

    pub fn pin(&mut self, repo: impl Into<String>, commit: impl Into<String>) {
        self.repos.insert(repo.into(), commit.into());
    }
}

/// Load a lockfile; `Ok(None)` when it does not exist
pub fn load_lockfile(path: &Path) -> Result<Option<Lockfile>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|e| {
        Error::IoError(format!("Failed to read lockfile {}: {}", path.display(), e))
    })?;
    let lockfile: Lockfile = toml::from_str(&content)
        .map_err(|e| Error::ParseError(format!("Invalid lockfile {}: {}", path.display(), e)))?;

    if lockfile.version != LOCKFILE_VERSION {
        return Err(Error::ParseError(format!(
            "Lockfile {} has unsupported version {}",
            path.display(),
            lockfile.version
        )));
    }
    Ok(Some(lockfile))
}

/// Save a lockfile atomically (write to temp, then rename)
pub fn save_lockfile(path: &Path, lockfile: &Lockfile) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(lockfile)?;
    let tmp = path.with_extension("toml.tmp");
    fs::write(&tmp, content)
        .map_err(|e| Error::IoError(format!("Failed to write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path).map_err(|e| {
        Error::IoError(format!(
            "Failed to rename {} to {}: {}",
            tmp.display(),
            path.display(),
            e
        ))
    })?;
    Ok(())
}
