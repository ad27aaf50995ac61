// src/cache/mod.rs

//! Persistent build cache
//!
//! One entry per package: when it was last built successfully, which
//! dependencies the build declared, and the recipe it was built from. The
//! whole table is written as a single JSON snapshot.
//!
//! A cache file that fails validation is never fatal: the session starts from
//! an empty cache and rebuilds what it needs.

pub mod staleness;

pub use staleness::{
    ModificationCheck, ModificationScan, StaleReason, UncoveredRepoPolicy, Verdict,
    VC_METADATA_DIRS,
};

use crate::error::{Error, Result};
use crate::recipe::Recipe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Current on-disk format version
pub const CACHE_VERSION: u32 = 1;

/// Build record for one package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildCacheEntry {
    /// Completion time of the last successful build; `None` while a build
    /// has started but not finished
    pub last_build_time: Option<DateTime<Utc>>,
    /// Dependencies declared by the last build, in declaration order
    pub dependencies: Vec<String>,
    /// Recipe the last build used
    pub recipe: Recipe,
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    version: u32,
    entries: &'a BTreeMap<String, BuildCacheEntry>,
    eager: &'a BTreeSet<String>,
}

#[derive(Deserialize)]
struct CacheFile {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, BuildCacheEntry>,
    #[serde(default)]
    eager: BTreeSet<String>,
}

/// In-memory build cache
#[derive(Debug, Default)]
pub struct BuildCache {
    entries: BTreeMap<String, BuildCacheEntry>,
    eager: BTreeSet<String>,
    dirty: bool,
    load_warning: Option<String>,
}

impl BuildCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the cache from `path`
    ///
    /// A missing file yields an empty cache. An unreadable or structurally
    /// invalid file also yields an empty cache, with a warning available
    /// through [`take_load_warning`](Self::take_load_warning).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No build cache at {}", path.display());
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read build cache {}: {}", path.display(), e))
        })?;

        match Self::parse(&content) {
            Ok(cache) => {
                debug!(
                    "Loaded build cache with {} entries from {}",
                    cache.entries.len(),
                    path.display()
                );
                Ok(cache)
            }
            Err(reason) => {
                let message = format!(
                    "Build cache {} is invalid ({}); starting with an empty cache",
                    path.display(),
                    reason
                );
                warn!("{}", message);
                Ok(Self {
                    dirty: true,
                    load_warning: Some(message),
                    ..Self::default()
                })
            }
        }
    }

    fn parse(content: &str) -> std::result::Result<Self, String> {
        let file: CacheFile = serde_json::from_str(content).map_err(|e| e.to_string())?;

        if file.version != CACHE_VERSION {
            return Err(format!("unsupported version {}", file.version));
        }
        if let Some((key, entry)) = file.entries.iter().find(|(k, e)| **k != e.recipe.package) {
            return Err(format!(
                "entry '{}' holds a recipe for '{}'",
                key, entry.recipe.package
            ));
        }

        Ok(Self {
            entries: file.entries,
            eager: file.eager,
            dirty: false,
            load_warning: None,
        })
    }

    /// Write the cache to `path` if it changed since it was loaded
    ///
    /// The snapshot goes to a temporary file that is then renamed over the
    /// old one, so readers never see a partial cache.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if !self.dirty && path.exists() {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&CacheFileRef {
            version: CACHE_VERSION,
            entries: &self.entries,
            eager: &self.eager,
        })?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| {
            Error::IoError(format!("Failed to write build cache {}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, path).map_err(|e| {
            Error::IoError(format!("Failed to replace build cache {}: {}", path.display(), e))
        })?;

        self.dirty = false;
        debug!("Saved build cache with {} entries", self.entries.len());
        Ok(())
    }

    /// Warning produced when the loaded file had to be discarded
    pub fn take_load_warning(&mut self) -> Option<String> {
        self.load_warning.take()
    }

    pub fn get(&self, package: &str) -> Option<&BuildCacheEntry> {
        self.entries.get(package)
    }

    /// Cached dependency list for a package
    pub fn dependencies(&self, package: &str) -> Option<&[String]> {
        self.entries.get(package).map(|e| e.dependencies.as_slice())
    }

    /// Drop the build time of a package whose build output is about to be
    /// replaced
    ///
    /// Until [`finalize_build`](Self::finalize_build) runs the entry reads as
    /// an incomplete build, so a failure anywhere in between is retried.
    pub fn mark_incomplete(&mut self, package: &str) {
        if let Some(entry) = self.entries.get_mut(package) {
            if entry.last_build_time.take().is_some() {
                self.dirty = true;
            }
        }
    }

    /// Record a package's dependencies before they are resolved
    ///
    /// An existing entry keeps its build time and recipe snapshot; a new one
    /// starts without a build time, so it stays stale until finalized.
    pub fn set_dependencies(&mut self, package: &str, recipe: &Recipe, dependencies: Vec<String>) {
        match self.entries.get_mut(package) {
            Some(entry) => entry.dependencies = dependencies,
            None => {
                self.entries.insert(
                    package.to_string(),
                    BuildCacheEntry {
                        last_build_time: None,
                        dependencies,
                        recipe: recipe.clone(),
                    },
                );
            }
        }
        self.dirty = true;
    }

    /// Record a successful build completing now
    pub fn finalize_build(&mut self, package: &str, recipe: &Recipe, dependencies: Vec<String>) {
        self.finalize_build_at(package, recipe, dependencies, Utc::now());
    }

    /// Record a successful build completing at `time`
    pub fn finalize_build_at(
        &mut self,
        package: &str,
        recipe: &Recipe,
        dependencies: Vec<String>,
        time: DateTime<Utc>,
    ) {
        self.entries.insert(
            package.to_string(),
            BuildCacheEntry {
                last_build_time: Some(time),
                dependencies,
                recipe: recipe.clone(),
            },
        );
        self.dirty = true;
    }

    pub fn remove(&mut self, package: &str) -> Option<BuildCacheEntry> {
        let removed = self.entries.remove(package);
        if removed.is_some() {
            self.eager.remove(package);
            self.dirty = true;
        }
        removed
    }

    /// Cached package names
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Packages used by the last completed top-level operation
    pub fn eager(&self) -> &BTreeSet<String> {
        &self.eager
    }

    pub fn set_eager(&mut self, packages: impl IntoIterator<Item = String>) {
        let eager: BTreeSet<String> = packages.into_iter().collect();
        if eager != self.eager {
            self.eager = eager;
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}
