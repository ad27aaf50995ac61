// src/vc/mod.rs

//! Version-control backends
//!
//! Each recipe names a backend by tag. The backend owns everything about the
//! repository itself: cloning, pulling, pinning commits, and which recipe
//! fields describe the repository. The rest of the crate only sees the
//! [`VcBackend`] trait, looked up through a [`BackendRegistry`].

mod git;

pub use git::GitBackend;

use crate::error::{Error, Result};
use crate::recipe::Recipe;
use std::collections::BTreeMap;
use std::path::Path;

/// Operations the core needs from a version-control system
pub trait VcBackend {
    /// Tag recipes use to select this backend
    fn name(&self) -> &str;

    /// Create a checkout of the recipe's repository at `repo_dir`, checking
    /// out `commit` when one is pinned
    fn clone_repo(&self, recipe: &Recipe, repo_dir: &Path, commit: Option<&str>) -> Result<()>;

    /// Make the checkout match the recipe (remote URL, branch). Returns
    /// whether anything changed.
    fn ensure_local_state_matches(&self, recipe: &Recipe, repo_dir: &Path) -> Result<bool>;

    /// Fetch and merge new commits; `from_upstream` pulls from the upstream
    /// remote instead of the primary one
    fn pull(&self, recipe: &Recipe, repo_dir: &Path, from_upstream: bool) -> Result<()>;

    /// Publish local commits to the primary remote
    fn push(&self, recipe: &Recipe, repo_dir: &Path) -> Result<()>;

    fn checkout_commit(&self, repo_dir: &Path, commit: &str) -> Result<()>;

    /// Identifier of the commit currently checked out
    fn current_commit(&self, repo_dir: &Path) -> Result<String>;

    /// Checkout directory name implied by the recipe's fields, if any
    fn derive_repo_name(&self, recipe: &Recipe) -> Option<String>;

    /// Recipe fields that describe the repository; two recipes sharing a
    /// checkout must agree on all of them
    fn relevant_keywords(&self) -> &'static [&'static str];
}

/// Backends available to a session, by tag
#[derive(Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Box<dyn VcBackend>>,
}

impl BackendRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in backends
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GitBackend::new()));
        registry
    }

    /// Add a backend, replacing any backend with the same tag
    pub fn register(&mut self, backend: Box<dyn VcBackend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    pub fn get(&self, name: &str) -> Result<&dyn VcBackend> {
        self.backends
            .get(name)
            .map(|b| b.as_ref())
            .ok_or_else(|| Error::UnknownBackend(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.backends.keys()).finish()
    }
}
