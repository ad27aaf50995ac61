// src/operations.rs

//! Batch operations over the registered packages
//!
//! Everything the command line offers beyond a single `use`: rebuilding,
//! staleness checks, repository maintenance, lockfiles and cache pruning.
//! Operations that visit many packages keep going after a failure and report
//! every failure at the end.

use crate::cache::StaleReason;
use crate::error::{Error, Result};
use crate::lockfile::{Lockfile, load_lockfile, save_lockfile};
use crate::pipeline::{UseOptions, UseOutcome};
use crate::recipe::{Normalized, Recipe, RecipeSpec};
use crate::session::Session;
use chrono::Utc;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Per-item results of a batch operation
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, Error)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn push(&mut self, name: &str, result: Result<()>) {
        match result {
            Ok(()) => self.succeeded.push(name.to_string()),
            Err(e) => {
                warn!("{}: {}", name, e);
                self.failed.push((name.to_string(), e));
            }
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded.len(), self.failed.len())?;
        for (name, error) in &self.failed {
            write!(f, "\n  {}: {}", name, error)?;
        }
        Ok(())
    }
}

impl Session {
    /// Register every package declared in the config under the session
    /// profile
    pub fn register_configured(&mut self) -> Result<()> {
        let specs = self.config.packages.clone();
        self.mirrors_config = true;
        let result = specs.iter().try_for_each(|spec| match self.normalize(spec)? {
            Normalized::Recipe(recipe) => self.register(recipe),
            Normalized::Unresolvable => {
                self.reporter.warning(&format!(
                    "No recipe found for configured package {}",
                    spec.package()
                ));
                Ok(())
            }
        });
        self.mirrors_config = false;
        result
    }

    /// Use several packages in one operation, continuing past failures
    pub fn use_packages(&mut self, specs: &[RecipeSpec], options: &UseOptions) -> Result<BatchReport> {
        self.operation(|session| {
            let mut report = BatchReport::default();
            for spec in specs {
                let result = session.use_in_operation(spec, options).map(|outcome| {
                    debug!("{}: {:?}", spec.package(), outcome);
                });
                report.push(spec.package(), result);
            }
            Ok(report)
        })
    }

    /// Use every package declared in the config
    pub fn use_configured(&mut self, options: &UseOptions) -> Result<BatchReport> {
        self.register_configured()?;
        let specs = self.config.packages.clone();
        self.use_packages(&specs, options)
    }

    /// Rebuild one package even when it is fresh
    pub fn rebuild_package(&mut self, package: &str) -> Result<UseOutcome> {
        self.operation(|session| {
            session.rebuild_requested.insert(package.to_string());
            session.use_in_operation(&RecipeSpec::Name(package.to_string()), &UseOptions::default().required())
        })
    }

    /// Rebuild every registered package; shared dependencies are rebuilt once
    pub fn rebuild_all(&mut self) -> Result<BatchReport> {
        let packages: Vec<String> = self.registry.recipes().map(|r| r.package.clone()).collect();
        self.operation(|session| {
            session.rebuild_all = true;
            let mut report = BatchReport::default();
            for package in &packages {
                let spec = RecipeSpec::Name(package.clone());
                let result = session.use_in_operation(&spec, &UseOptions::default()).map(|_| ());
                report.push(package, result);
            }
            Ok(report)
        })
    }

    /// Why a package needs rebuilding, `None` when it is up to date
    pub fn check_package(&mut self, package: &str) -> Result<Option<StaleReason>> {
        self.operation(|session| {
            let recipe = session.resolve_registered(package)?;
            session.staleness(&recipe)
        })
    }

    /// Every registered package whose build is stale
    pub fn check_all(&mut self) -> Result<Vec<(String, StaleReason)>> {
        let recipes: Vec<Recipe> = self.registry.recipes().cloned().collect();
        self.operation(|session| {
            let mut stale = Vec::new();
            for recipe in &recipes {
                if recipe.no_build || recipe.is_builtin() {
                    continue;
                }
                if let Some(reason) = session.staleness(recipe)? {
                    stale.push((recipe.package.clone(), reason));
                }
            }
            Ok(stale)
        })
    }

    /// Make a package's checkout match its recipe; returns whether anything
    /// changed
    pub fn normalize_package(&mut self, package: &str) -> Result<bool> {
        let recipe = self.resolve_registered(package)?;
        self.normalize_checkout(&recipe)
    }

    /// Normalize every registered repository once
    pub fn normalize_all(&mut self) -> Result<BatchReport> {
        self.for_each_repo(|session, recipe| session.normalize_checkout(recipe).map(|_| ()))
    }

    /// Pull new commits for a package's repository
    pub fn pull_package(&mut self, package: &str, from_upstream: bool) -> Result<()> {
        let recipe = self.resolve_registered(package)?;
        self.pull_checkout(&recipe, from_upstream)
    }

    /// Pull every registered repository once
    pub fn pull_all(&mut self, from_upstream: bool) -> Result<BatchReport> {
        self.for_each_repo(|session, recipe| session.pull_checkout(recipe, from_upstream))
    }

    /// Push a package's repository
    pub fn push_package(&mut self, package: &str) -> Result<()> {
        let recipe = self.resolve_registered(package)?;
        self.push_checkout(&recipe)
    }

    /// Push every registered repository once
    pub fn push_all(&mut self) -> Result<BatchReport> {
        self.for_each_repo(|session, recipe| session.push_checkout(recipe))
    }

    /// Write the lockfile of `profile` from the current checkouts
    pub fn freeze(&mut self, profile: &str) -> Result<PathBuf> {
        if self.registry.profiles_possibly_stale() {
            self.reporter.warning(
                "Packages were registered outside the config; the frozen profile may be incomplete",
            );
        }

        let recipes: Vec<Recipe> = self.registry.recipes_in_profile(profile).cloned().collect();
        let mut lockfile = Lockfile::new();
        lockfile.generated_at = Some(Utc::now());

        for recipe in &recipes {
            if recipe.is_builtin() || lockfile.commit(&recipe.local_repo).is_some() {
                continue;
            }
            let repo_dir = self.config.repo_path(&recipe.local_repo);
            if !repo_dir.exists() {
                debug!("{} has no checkout, not freezing it", recipe.local_repo);
                continue;
            }
            let commit = self.backends.get(&recipe.backend)?.current_commit(&repo_dir)?;
            lockfile.pin(recipe.local_repo.clone(), commit);
        }

        let path = self.config.lockfile_path(profile);
        save_lockfile(&path, &lockfile)?;
        self.invalidate_lockfiles();
        info!("Froze {} repositories to {}", lockfile.repos.len(), path.display());
        Ok(path)
    }

    /// Check out the commits pinned in the lockfile of `profile`
    pub fn thaw(&mut self, profile: &str) -> Result<BatchReport> {
        let path = self.config.lockfile_path(profile);
        let lockfile = load_lockfile(&path)?
            .ok_or_else(|| Error::NotFound(format!("no lockfile at {}", path.display())))?;

        let mut report = BatchReport::default();
        for (repo, commit) in &lockfile.repos {
            let Some(recipe) = self.registry.recipe_for_repo(repo).cloned() else {
                self.reporter
                    .warning(&format!("Lockfile pins unknown repository {}", repo));
                continue;
            };
            let repo_dir = self.config.repo_path(repo);
            if !repo_dir.exists() {
                debug!("{} has no checkout, nothing to thaw", repo);
                continue;
            }
            let result = self
                .backends
                .get(&recipe.backend)
                .and_then(|vc| vc.checkout_commit(&repo_dir, commit));
            report.push(repo, result);
        }
        Ok(report)
    }

    /// Remove cache entries and build output of packages that are no longer
    /// registered
    pub fn prune_build_cache(&mut self) -> Result<Vec<String>> {
        self.operation(|session| {
            let stale: Vec<String> = session
                .cache
                .packages()
                .filter(|package| !session.registry.contains(package))
                .map(String::from)
                .collect();

            for package in &stale {
                session.cache.remove(package);
                let build_dir = session.config.package_build_path(package);
                if build_dir.exists() {
                    fs::remove_dir_all(&build_dir).map_err(|e| {
                        Error::IoError(format!(
                            "Failed to remove {}: {}",
                            build_dir.display(),
                            e
                        ))
                    })?;
                }
                info!("Pruned {}", package);
            }
            Ok(stale)
        })
    }

    fn for_each_repo<F>(&mut self, mut f: F) -> Result<BatchReport>
    where
        F: FnMut(&mut Session, &Recipe) -> Result<()>,
    {
        let recipes: Vec<Recipe> = self
            .registry
            .repos()
            .map(|(_, recipe)| recipe)
            .filter(|r| !r.is_builtin())
            .cloned()
            .collect();

        let mut report = BatchReport::default();
        for recipe in &recipes {
            let result = f(self, recipe);
            report.push(&recipe.local_repo, result);
        }
        Ok(report)
    }

    fn checkout_dir(&self, recipe: &Recipe) -> Result<PathBuf> {
        let dir = self.config.repo_path(&recipe.local_repo);
        if dir.exists() {
            Ok(dir)
        } else {
            Err(Error::NotFound(format!(
                "repository {} is not checked out",
                recipe.local_repo
            )))
        }
    }

    fn normalize_checkout(&mut self, recipe: &Recipe) -> Result<bool> {
        let dir = self.checkout_dir(recipe)?;
        let changed = self
            .backends
            .get(&recipe.backend)?
            .ensure_local_state_matches(recipe, &dir)?;
        if changed {
            self.reporter
                .status(&format!("Normalized {}", recipe.local_repo));
        }
        Ok(changed)
    }

    fn pull_checkout(&mut self, recipe: &Recipe, from_upstream: bool) -> Result<()> {
        let dir = self.checkout_dir(recipe)?;
        self.reporter.status(&format!("Pulling {}...", recipe.local_repo));
        self.backends
            .get(&recipe.backend)?
            .pull(recipe, &dir, from_upstream)
    }

    fn push_checkout(&mut self, recipe: &Recipe) -> Result<()> {
        let dir = self.checkout_dir(recipe)?;
        self.reporter.status(&format!("Pushing {}...", recipe.local_repo));
        self.backends.get(&recipe.backend)?.push(recipe, &dir)
    }
}
