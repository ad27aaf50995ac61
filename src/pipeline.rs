// src/pipeline.rs

//! Dependency resolution and the build pipeline
//!
//! `use_package` drives one package through
//!
//! ```text
//! Unresolved -> Registered -> CheckedOut -> Skipped | Fresh | Built -> Activated
//! ```
//!
//! recursing into dependencies before the package itself is activated.
//! Registration always happens before recursion, and the cache entry of a
//! package is only finalized once its whole build succeeded.

use crate::error::{Error, Result};
use crate::files;
use crate::recipe::{Normalized, Recipe, RecipeSpec};
use crate::session::{PackageState, Session};
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info};

/// Yes, no, or ask a predicate per recipe
#[derive(Clone, Default)]
pub enum Decision {
    #[default]
    Always,
    Never,
    Predicate(Rc<dyn Fn(&Recipe) -> bool>),
}

impl Decision {
    /// Build a predicate decision
    pub fn predicate(f: impl Fn(&Recipe) -> bool + 'static) -> Self {
        Self::Predicate(Rc::new(f))
    }

    pub fn allows(&self, recipe: &Recipe) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Predicate(f) => f(recipe),
        }
    }
}

impl fmt::Debug for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::Never => f.write_str("Never"),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Options for one `use_package` call
#[derive(Debug, Clone, Default)]
pub struct UseOptions {
    /// Whether a missing checkout may be cloned
    pub clone: Decision,
    /// Whether a stale package may be built
    pub build: Decision,
    /// Fail instead of returning `NotInstalled` for unresolvable packages
    pub required: bool,
}

impl UseOptions {
    /// Never clone; packages without a checkout are left alone
    pub fn lazy() -> Self {
        Self {
            clone: Decision::Never,
            ..Self::default()
        }
    }

    /// Never build; use whatever build already exists
    pub fn no_build() -> Self {
        Self {
            build: Decision::Never,
            ..Self::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Options passed down to dependencies of a package that was not built
    fn for_dependency(&self) -> Self {
        Self {
            required: false,
            ..self.clone()
        }
    }
}

/// What happened to a package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseOutcome {
    /// Unresolvable or provided by the host
    NotInstalled,
    /// Checkout missing and cloning declined
    NotCheckedOut,
    /// Package is already being processed further up the stack
    Cycle,
    /// Package was already activated in this operation
    AlreadyActive,
    Activated { built: bool },
}

impl UseOutcome {
    pub fn is_activated(&self) -> bool {
        matches!(self, Self::Activated { .. } | Self::AlreadyActive)
    }
}

impl Session {
    /// Make a package and its dependencies available, building what is stale
    pub fn use_package(&mut self, spec: &RecipeSpec, options: &UseOptions) -> Result<UseOutcome> {
        self.operation(|session| session.use_in_operation(spec, options))
    }

    /// Body of [`use_package`](Self::use_package) for callers already inside
    /// an operation
    pub(crate) fn use_in_operation(
        &mut self,
        spec: &RecipeSpec,
        options: &UseOptions,
    ) -> Result<UseOutcome> {
        let package = spec.package().to_string();

        if self.host.is_builtin(&package) {
            debug!("{} is provided by the host", package);
            self.record(&package, PackageState::NotInstalled);
            return Ok(UseOutcome::NotInstalled);
        }

        self.record(&package, PackageState::Unresolved);
        let recipe = match self.normalize(spec)? {
            Normalized::Recipe(recipe) => recipe,
            Normalized::Unresolvable if options.required => {
                return Err(Error::NotFound(format!("no recipe for package '{}'", package)));
            }
            Normalized::Unresolvable => {
                self.reporter
                    .warning(&format!("No recipe found for {}, skipping", package));
                self.record(&package, PackageState::NotInstalled);
                return Ok(UseOutcome::NotInstalled);
            }
        };
        if recipe.is_builtin() {
            self.record(&package, PackageState::NotInstalled);
            return Ok(UseOutcome::NotInstalled);
        }

        // Registered even when the package is in progress or already active
        self.register(recipe.clone())?;
        self.record(&package, PackageState::Registered);

        if self.in_progress.contains(&package) {
            debug!("{} is already in progress, not recursing", package);
            return Ok(UseOutcome::Cycle);
        }
        if self.activated.contains(&package) {
            return Ok(UseOutcome::AlreadyActive);
        }

        self.used_packages.insert(package.clone());
        self.in_progress.insert(package.clone());
        let result = self.process(&recipe, options);
        self.in_progress.remove(&package);
        result
    }

    fn process(&mut self, recipe: &Recipe, options: &UseOptions) -> Result<UseOutcome> {
        let package = recipe.package.as_str();
        let repo_dir = self.config.repo_path(&recipe.local_repo);

        if !repo_dir.exists() {
            if !options.clone.allows(recipe) {
                debug!("{} has no checkout and cloning is declined", package);
                self.record(package, PackageState::NotCheckedOut);
                return Ok(UseOutcome::NotCheckedOut);
            }
            let commit = self.pinned_commit(&recipe.local_repo)?;
            self.reporter
                .status(&format!("Cloning {}...", recipe.local_repo));
            self.backends
                .get(&recipe.backend)?
                .clone_repo(recipe, &repo_dir, commit.as_deref())?;
        }
        self.record(package, PackageState::CheckedOut);

        let build_dir = self.config.package_build_path(package);
        let built = if recipe.no_build || !options.build.allows(recipe) {
            self.record(package, PackageState::Skipped);
            self.use_cached_dependencies(recipe, options)?;
            false
        } else if self.rebuild_forced(package) || self.is_stale(recipe)? {
            self.build(recipe, &repo_dir, &build_dir)?;
            true
        } else {
            self.record(package, PackageState::Fresh);
            self.use_cached_dependencies(recipe, options)?;
            false
        };

        self.activate(recipe, &build_dir)?;
        Ok(UseOutcome::Activated { built })
    }

    fn rebuild_forced(&self, package: &str) -> bool {
        (self.rebuild_all || self.rebuild_requested.contains(package))
            && !self.rebuild_applied.contains(package)
    }

    fn use_cached_dependencies(&mut self, recipe: &Recipe, options: &UseOptions) -> Result<()> {
        let dependencies = self
            .cache
            .dependencies(&recipe.package)
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        let options = options.for_dependency();
        self.use_dependencies(recipe, &dependencies, &options)
    }

    fn use_dependencies(
        &mut self,
        recipe: &Recipe,
        dependencies: &[String],
        options: &UseOptions,
    ) -> Result<()> {
        for dependency in dependencies {
            self.use_in_operation(&RecipeSpec::Name(dependency.clone()), options)
                .map_err(|e| Error::DependencyFailed {
                    package: recipe.package.clone(),
                    dependency: dependency.clone(),
                    source: Box::new(e),
                })?;
        }
        Ok(())
    }

    fn build(&mut self, recipe: &Recipe, repo_dir: &Path, build_dir: &Path) -> Result<()> {
        let package = recipe.package.as_str();
        self.rebuild_applied.insert(package.to_string());
        self.reporter.status(&format!("Building {}...", package));
        self.cache.mark_incomplete(package);

        let mapping = files::expand(recipe.files.as_ref(), repo_dir)?;
        files::materialize(&mapping, build_dir)?;

        let dependencies = self.host.extract_dependencies(recipe, build_dir)?;
        self.cache
            .set_dependencies(package, recipe, dependencies.clone());
        self.use_dependencies(recipe, &dependencies, &UseOptions::default())?;

        self.host.generate_autoloads(recipe, build_dir)?;
        self.host.compile(recipe, build_dir)?;

        self.cache.finalize_build(package, recipe, dependencies);
        info!("Built {} ({} files)", package, mapping.len());
        self.record(package, PackageState::Built);
        Ok(())
    }

    fn activate(&mut self, recipe: &Recipe, build_dir: &Path) -> Result<()> {
        self.push_load_path(build_dir);
        self.host.activate(recipe, build_dir)?;
        self.activated.insert(recipe.package.clone());
        self.record(&recipe.package, PackageState::Activated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::RecipeInput;

    fn recipe(package: &str) -> Recipe {
        Recipe {
            package: package.to_string(),
            local_repo: package.to_string(),
            backend: "git".to_string(),
            files: None,
            no_build: false,
            fields: Default::default(),
        }
    }

    #[test]
    fn test_decisions() {
        let r = recipe("magit");
        assert!(Decision::Always.allows(&r));
        assert!(!Decision::Never.allows(&r));
        let only_magit = Decision::predicate(|r| r.package.starts_with("magit"));
        assert!(only_magit.allows(&r));
        assert!(!only_magit.allows(&recipe("dash")));
        assert_eq!(format!("{:?}", only_magit), "Predicate(..)");
    }

    #[test]
    fn test_option_constructors() {
        let r = recipe("p");
        assert!(!UseOptions::lazy().clone.allows(&r));
        assert!(UseOptions::lazy().build.allows(&r));
        assert!(!UseOptions::no_build().build.allows(&r));
        assert!(UseOptions::default().required().required);
        assert!(!UseOptions::default().required().for_dependency().required);
    }

    #[test]
    fn test_host_builtin_is_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(crate::Config::with_base_dir(dir.path()));

        let outcome = session
            .use_package(&"emacs".into(), &UseOptions::default())
            .unwrap();
        assert_eq!(outcome, UseOutcome::NotInstalled);
    }

    #[test]
    fn test_unresolvable_required_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(crate::Config::with_base_dir(dir.path()));

        assert_eq!(
            session
                .use_package(&"ghost".into(), &UseOptions::default())
                .unwrap(),
            UseOutcome::NotInstalled
        );
        assert!(matches!(
            session.use_package(&"ghost".into(), &UseOptions::default().required()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_lazy_without_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(crate::Config::with_base_dir(dir.path()));
        let spec = RecipeInput::new("p").with_field("repo", "u/p").into();

        let outcome = session.use_package(&spec, &UseOptions::lazy()).unwrap();
        assert_eq!(outcome, UseOutcome::NotCheckedOut);
        // Registered even though nothing was cloned
        assert!(session.registry().contains("p"));
    }
}
