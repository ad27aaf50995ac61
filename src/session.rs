// src/session.rs

//! Session context
//!
//! A [`Session`] owns everything one run of tendril works with: the recipe
//! registry, the build cache, the modification scan and the per-operation
//! bookkeeping of the build pipeline. Nothing lives in globals, so two
//! sessions over different base directories never interfere.
//!
//! Expensive work is coalesced through the session's [`Transaction`]:
//! - `operation-state`: per-operation sets, cleared at the end
//! - `load-build-cache`: load on first use, save once at the end; the
//!   eager set is replaced only when the operation succeeded
//! - `find-modified-repos`: one modification scan per operation

use crate::cache::{
    self, BuildCache, ModificationScan, StaleReason, UncoveredRepoPolicy, Verdict,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::host::{Host, ProcessHost};
use crate::lockfile::{Lockfile, load_lockfile};
use crate::progress::{LogStatus, StatusReporter};
use crate::recipe::{
    DirectorySource, Normalized, Normalizer, Recipe, RecipeSource, RecipeSpec, Registry,
};
use crate::transaction::{self, Transaction, Transactional};
use crate::vc::BackendRegistry;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a package got to in the current operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    Unresolved,
    Registered,
    CheckedOut,
    /// Build skipped on request or by recipe
    Skipped,
    /// Build is up to date
    Fresh,
    Built,
    Activated,
    /// Unresolvable or provided by the host
    NotInstalled,
    /// Checkout missing and cloning was declined
    NotCheckedOut,
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unresolved => "unresolved",
            Self::Registered => "registered",
            Self::CheckedOut => "checked-out",
            Self::Skipped => "skipped",
            Self::Fresh => "fresh",
            Self::Built => "built",
            Self::Activated => "activated",
            Self::NotInstalled => "not-installed",
            Self::NotCheckedOut => "not-checked-out",
        };
        f.write_str(name)
    }
}

/// One state transition, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEvent {
    pub package: String,
    pub state: PackageState,
}

/// Context for all package operations
pub struct Session {
    pub(crate) config: Config,
    pub(crate) backends: BackendRegistry,
    pub(crate) sources: Vec<Box<dyn RecipeSource>>,
    pub(crate) host: Box<dyn Host>,
    pub(crate) reporter: Arc<dyn StatusReporter>,

    pub(crate) registry: Registry,
    pub(crate) cache: BuildCache,
    txn: Transaction<Session>,
    scan: Option<ModificationScan>,
    lockfiles: Option<Vec<Lockfile>>,

    // Per-operation state, cleared by the `operation-state` teardown
    pub(crate) in_progress: HashSet<String>,
    pub(crate) activated: HashSet<String>,
    pub(crate) rebuild_requested: HashSet<String>,
    pub(crate) rebuild_all: bool,
    pub(crate) rebuild_applied: HashSet<String>,
    pub(crate) used_packages: BTreeSet<String>,
    operation_failed: bool,

    pub(crate) mirrors_config: bool,
    load_path: Vec<PathBuf>,
    trace: Vec<PackageEvent>,
}

impl Transactional for Session {
    fn transaction(&mut self) -> &mut Transaction<Self> {
        &mut self.txn
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_dir", &self.config.base_dir)
            .field("profile", &self.config.profile)
            .field("backends", &self.backends)
            .field("registry", &self.registry)
            .field("txn", &self.txn)
            .finish()
    }
}

impl Session {
    /// Session with the built-in backends, one directory source per
    /// configured recipe directory, and a process host
    pub fn new(config: Config) -> Self {
        let sources: Vec<Box<dyn RecipeSource>> = config
            .recipe_dirs
            .iter()
            .map(|dir| Box::new(DirectorySource::new(dir)) as Box<dyn RecipeSource>)
            .collect();
        let host = Box::new(ProcessHost::new(&config.host));

        Self {
            config,
            backends: BackendRegistry::with_defaults(),
            sources,
            host,
            reporter: Arc::new(LogStatus::new("tendril")),
            registry: Registry::new(),
            cache: BuildCache::new(),
            txn: Transaction::new(),
            scan: None,
            lockfiles: None,
            in_progress: HashSet::new(),
            activated: HashSet::new(),
            rebuild_requested: HashSet::new(),
            rebuild_all: false,
            rebuild_applied: HashSet::new(),
            used_packages: BTreeSet::new(),
            operation_failed: false,
            mirrors_config: false,
            load_path: Vec::new(),
            trace: Vec::new(),
        }
    }

    pub fn with_backends(mut self, backends: BackendRegistry) -> Self {
        self.backends = backends;
        self
    }

    /// Replace the recipe sources
    pub fn with_sources(mut self, sources: Vec<Box<dyn RecipeSource>>) -> Self {
        self.sources = sources;
        self
    }

    /// Append a recipe source after the existing ones
    pub fn add_source(&mut self, source: Box<dyn RecipeSource>) {
        self.sources.push(source);
    }

    pub fn with_host(mut self, host: Box<dyn Host>) -> Self {
        self.host = host;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cache(&self) -> &BuildCache {
        &self.cache
    }

    pub fn reporter(&self) -> &Arc<dyn StatusReporter> {
        &self.reporter
    }

    /// Build directories of activated packages, in activation order
    pub fn load_path(&self) -> &[PathBuf] {
        &self.load_path
    }

    /// Every state transition recorded so far
    pub fn trace(&self) -> &[PackageEvent] {
        &self.trace
    }

    /// Hand back and clear the trace
    pub fn take_trace(&mut self) -> Vec<PackageEvent> {
        std::mem::take(&mut self.trace)
    }

    pub(crate) fn record(&mut self, package: &str, state: PackageState) {
        debug!("{}: {}", package, state);
        self.trace.push(PackageEvent {
            package: package.to_string(),
            state,
        });
    }

    pub(crate) fn push_load_path(&mut self, dir: &Path) {
        if !self.load_path.iter().any(|p| p == dir) {
            self.load_path.push(dir.to_path_buf());
        }
    }

    /// Forget every registered recipe
    pub fn reset_registry(&mut self) {
        self.registry.reset();
    }

    /// Normalize a recipe spec against this session's sources and registry
    pub fn normalize(&self, spec: &RecipeSpec) -> Result<Normalized> {
        Normalizer {
            default_backend: &self.config.default_backend,
            sources: &self.sources,
            backends: &self.backends,
            registry: &self.registry,
        }
        .normalize(spec)
    }

    /// Register a normalized recipe under the session profile, reporting any
    /// conflict warnings
    pub fn register(&mut self, recipe: Recipe) -> Result<()> {
        let keywords: &[&str] = if recipe.is_builtin() {
            &[]
        } else {
            self.backends.get(&recipe.backend)?.relevant_keywords()
        };

        let warnings = self.registry.register(
            recipe,
            keywords,
            &self.config.profile,
            self.mirrors_config,
        );
        for warning in warnings {
            self.reporter.warning(&warning.to_string());
        }
        Ok(())
    }

    /// Run `body` as one top-level operation
    ///
    /// Nested calls join the enclosing operation. The build cache is loaded
    /// on entry and saved once when the outermost operation exits.
    pub fn operation<T, F>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(&mut Session) -> Result<T>,
    {
        transaction::within(self, |session| {
            session.begin_operation()?;
            session.load_build_cache()?;
            // Stays set if the body fails or panics
            let failed_before = std::mem::replace(&mut session.operation_failed, true);
            let result = body(session);
            if result.is_ok() {
                session.operation_failed = failed_before;
            }
            result
        })
    }

    fn begin_operation(&mut self) -> Result<bool> {
        transaction::perform(
            self,
            "operation-state",
            |_| Ok(()),
            Some(Box::new(|session: &mut Session| {
                session.in_progress.clear();
                session.activated.clear();
                session.rebuild_requested.clear();
                session.rebuild_all = false;
                session.rebuild_applied.clear();
                session.used_packages.clear();
                session.operation_failed = false;
                Ok(())
            })),
        )
    }

    pub(crate) fn load_build_cache(&mut self) -> Result<bool> {
        transaction::perform(
            self,
            "load-build-cache",
            |session| {
                let path = session.config.build_cache_path();
                session.cache = BuildCache::load(&path)?;
                if let Some(message) = session.cache.take_load_warning() {
                    session.reporter.warning(&message);
                }
                Ok(())
            },
            Some(Box::new(|session: &mut Session| {
                // Only a completed operation replaces the eager set
                if !session.operation_failed && !session.used_packages.is_empty() {
                    let used = session.used_packages.iter().cloned();
                    session.cache.set_eager(used);
                }
                let path = session.config.build_cache_path();
                session.cache.save(&path)
            })),
        )
    }

    fn find_modified_repos(&mut self) -> Result<bool> {
        transaction::perform(
            self,
            "find-modified-repos",
            |session| {
                session.load_build_cache()?;
                let repos: BTreeSet<String> = session
                    .cache
                    .eager()
                    .iter()
                    .filter_map(|package| {
                        session
                            .registry
                            .recipe(package)
                            .or_else(|| session.cache.get(package).map(|e| &e.recipe))
                            .map(|r| r.local_repo.clone())
                    })
                    .collect();
                let scan = ModificationScan::scan(
                    &session.config.repos_dir(),
                    repos.iter().map(String::as_str),
                )?;
                session.scan = Some(scan);
                Ok(())
            },
            Some(Box::new(|session: &mut Session| {
                session.scan = None;
                Ok(())
            })),
        )
    }

    /// Why a package needs rebuilding, or `None` when its build is current
    pub fn staleness(&mut self, recipe: &Recipe) -> Result<Option<StaleReason>> {
        self.load_build_cache()?;
        let verdict = cache::staleness::assess(
            self.cache.get(&recipe.package),
            recipe,
            self.config.modification_check,
        );

        let built = match verdict {
            Verdict::Stale(reason) => return Ok(Some(reason)),
            Verdict::Fresh => return Ok(None),
            Verdict::NeedsScan(built) => built,
        };

        self.find_modified_repos()?;
        let repo = recipe.local_repo.as_str();
        let newest = match self.scan.as_ref().filter(|scan| scan.covers(repo)) {
            Some(scan) => scan.newest(repo),
            None => {
                debug!("Repository {} not covered by the batched scan", repo);
                let newest = cache::staleness::newest_modification(&self.config.repo_path(repo))?;
                if self.config.uncovered_repo_policy == UncoveredRepoPolicy::FoldIntoBatch {
                    if let Some(scan) = self.scan.as_mut() {
                        scan.record(repo, newest);
                    }
                }
                newest
            }
        };

        Ok(cache::staleness::modified_since(newest, built).then_some(StaleReason::SourcesModified))
    }

    /// Whether a package needs rebuilding
    pub fn is_stale(&mut self, recipe: &Recipe) -> Result<bool> {
        Ok(self.staleness(recipe)?.is_some())
    }

    /// Pinned commit for a repository: the session profile's lockfile first,
    /// then every other configured profile
    pub(crate) fn pinned_commit(&mut self, repo: &str) -> Result<Option<String>> {
        if self.lockfiles.is_none() {
            let mut profiles = vec![self.config.profile.clone()];
            profiles.extend(
                self.config
                    .profiles
                    .keys()
                    .filter(|p| **p != self.config.profile)
                    .cloned(),
            );

            let mut lockfiles = Vec::new();
            for profile in profiles {
                if let Some(lockfile) = load_lockfile(&self.config.lockfile_path(&profile))? {
                    lockfiles.push(lockfile);
                }
            }
            self.lockfiles = Some(lockfiles);
        }

        Ok(self
            .lockfiles
            .iter()
            .flatten()
            .find_map(|l| l.commit(repo))
            .map(String::from))
    }

    /// Drop the cached lockfiles so the next clone rereads them
    pub(crate) fn invalidate_lockfiles(&mut self) {
        self.lockfiles = None;
    }

    /// Canonical recipe for a package, normalizing it on first use
    pub(crate) fn resolve_registered(&mut self, package: &str) -> Result<Recipe> {
        if let Some(recipe) = self.registry.recipe(package) {
            return Ok(recipe.clone());
        }
        match self.normalize(&RecipeSpec::Name(package.to_string()))? {
            Normalized::Recipe(recipe) => {
                self.register(recipe.clone())?;
                Ok(recipe)
            }
            Normalized::Unresolvable => {
                warn!("No recipe for {}", package);
                Err(Error::NotFound(format!("no recipe for package '{}'", package)))
            }
        }
    }
}
