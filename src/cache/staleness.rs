// src/cache/staleness.rs

//! Staleness detection
//!
//! A package needs rebuilding when it has never been built, when its last
//! build never finished, when a build-relevant recipe field changed, or when
//! a file in its repository is newer than its last build.
//!
//! Walking a repository is the expensive part. Repositories of the packages
//! used by the previous run are scanned once per top-level operation and the
//! newest modification time of each is kept in a [`ModificationScan`].

use crate::cache::BuildCacheEntry;
use crate::error::{Error, Result};
use crate::recipe::Recipe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Version-control metadata directories skipped while scanning
pub const VC_METADATA_DIRS: &[&str] = &[".git", ".hg", ".svn", "_darcs", ".bzr"];

/// Whether source modifications are checked at all
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModificationCheck {
    /// Scan repositories once per top-level operation
    #[default]
    FindAtStartup,
    /// Only recipe changes and missing builds make a package stale
    Never,
}

/// How a repository missing from the batched scan is handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UncoveredRepoPolicy {
    /// Scan it on its own for every query
    #[default]
    Individual,
    /// Scan it once and remember the result for the rest of the operation
    FoldIntoBatch,
}

/// Why a package is stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    NeverBuilt,
    IncompleteBuild,
    RecipeChanged { field: String },
    SourcesModified,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NeverBuilt => write!(f, "never built"),
            Self::IncompleteBuild => write!(f, "last build did not finish"),
            Self::RecipeChanged { field } => write!(f, "recipe {} changed", field),
            Self::SourcesModified => write!(f, "sources modified since last build"),
        }
    }
}

/// Outcome of the checks that need no filesystem access
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Stale(StaleReason),
    Fresh,
    /// Compare the repository's newest modification against this build time
    NeedsScan(DateTime<Utc>),
}

/// Evaluate a package against its cache entry
pub fn assess(
    entry: Option<&BuildCacheEntry>,
    recipe: &Recipe,
    check: ModificationCheck,
) -> Verdict {
    let Some(entry) = entry else {
        return Verdict::Stale(StaleReason::NeverBuilt);
    };
    let Some(built) = entry.last_build_time else {
        return Verdict::Stale(StaleReason::IncompleteBuild);
    };
    if let Some((field, _, _)) = entry.recipe.build_difference(recipe) {
        return Verdict::Stale(StaleReason::RecipeChanged { field });
    }
    match check {
        ModificationCheck::Never => Verdict::Fresh,
        ModificationCheck::FindAtStartup => Verdict::NeedsScan(built),
    }
}

/// Newest modification time of any file in `repo_dir`, ignoring VC metadata
///
/// Returns `None` for a missing or empty directory.
pub fn newest_modification(repo_dir: &Path) -> Result<Option<DateTime<Utc>>> {
    if !repo_dir.is_dir() {
        return Ok(None);
    }

    let mut newest: Option<DateTime<Utc>> = None;
    let walker = WalkDir::new(repo_dir).min_depth(1).into_iter().filter_entry(|e| {
        !(e.file_type().is_dir()
            && VC_METADATA_DIRS
                .iter()
                .any(|name| e.file_name() == std::ffi::OsStr::new(name)))
    });

    for entry in walker {
        let entry = entry.map_err(|e| {
            Error::IoError(format!("Failed to scan {}: {}", repo_dir.display(), e))
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let metadata = entry.metadata().map_err(|e| {
            Error::IoError(format!("Failed to stat {}: {}", entry.path().display(), e))
        })?;
        let modified: DateTime<Utc> = metadata.modified()?.into();
        if newest.is_none_or(|n| modified > n) {
            newest = Some(modified);
        }
    }

    Ok(newest)
}

/// Per-operation memo of repository modification times
#[derive(Debug, Default, Clone)]
pub struct ModificationScan {
    newest: BTreeMap<String, Option<DateTime<Utc>>>,
}

impl ModificationScan {
    /// Scan each named repository under `repos_dir`
    pub fn scan<'a>(repos_dir: &Path, repos: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut scan = Self::default();
        for repo in repos {
            if scan.covers(repo) {
                continue;
            }
            let newest = newest_modification(&repos_dir.join(repo))?;
            scan.record(repo, newest);
        }
        debug!("Scanned {} repositories for modifications", scan.newest.len());
        Ok(scan)
    }

    pub fn covers(&self, repo: &str) -> bool {
        self.newest.contains_key(repo)
    }

    /// Newest modification recorded for a covered repository
    pub fn newest(&self, repo: &str) -> Option<DateTime<Utc>> {
        self.newest.get(repo).copied().flatten()
    }

    pub fn record(&mut self, repo: &str, newest: Option<DateTime<Utc>>) {
        self.newest.insert(repo.to_string(), newest);
    }

    pub fn len(&self) -> usize {
        self.newest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.newest.is_empty()
    }
}

/// Whether a repository changed after a build
pub fn modified_since(newest: Option<DateTime<Utc>>, built: DateTime<Utc>) -> bool {
    newest.is_some_and(|n| n > built)
}
