// tests/common/mod.rs
//! Shared test utilities and helpers for integration tests.
//!
//! The fake backend "clones" by writing fixture files, and the recording host
//! reads dependencies from `Package-Requires` headers and remembers every
//! compile and activation, so whole pipeline runs need neither git nor a
//! real host runtime.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tendril::host::parse_package_requires;
use tendril::recipe::MemorySource;
use tendril::{
    BackendRegistry, CallbackStatus, Config, Error, Host, Recipe, RecipeInput, Result, Session,
    StatusEvent, VcBackend,
};

/// Everything the fakes observed, shared between them and the test
#[derive(Debug, Default)]
pub struct Log {
    pub clones: Vec<String>,
    pub checkouts: Vec<(String, String)>,
    pub pulls: Vec<String>,
    pub pushes: Vec<String>,
    pub compiled: Vec<String>,
    pub activated: Vec<String>,
    pub fail_compile: BTreeSet<String>,
    /// Files written on clone, by repository; unlisted repositories get one
    /// `<package>.el` declaring the recipe's `deps` field
    pub fixtures: BTreeMap<String, Vec<(String, String)>>,
}

pub type SharedLog = Rc<RefCell<Log>>;

fn repo_name(repo_dir: &Path) -> String {
    repo_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Elisp source declaring `deps` as its requirements
pub fn elisp_source(package: &str, deps: &[&str]) -> String {
    let requires: Vec<String> = deps.iter().map(|d| format!("({} \"1.0\")", d)).collect();
    format!(
        ";;; {}.el --- test package\n;; Package-Requires: ({})\n(provide '{})\n",
        package,
        requires.join(" "),
        package
    )
}

/// Version control backend that never touches the network
pub struct FakeBackend {
    log: SharedLog,
}

impl FakeBackend {
    pub fn new(log: SharedLog) -> Self {
        Self { log }
    }
}

impl VcBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn clone_repo(&self, recipe: &Recipe, repo_dir: &Path, commit: Option<&str>) -> Result<()> {
        let repo = repo_name(repo_dir);
        if recipe.field("fail_clone").is_some() {
            return Err(Error::VcError {
                backend: "fake".to_string(),
                repo,
                reason: "clone refused".to_string(),
            });
        }

        fs::create_dir_all(repo_dir)?;
        let fixtures = self.log.borrow().fixtures.get(&repo).cloned();
        let files = fixtures.unwrap_or_else(|| {
            let deps: Vec<&str> = recipe
                .field("deps")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|d| d.as_str()).collect())
                .unwrap_or_default();
            vec![(
                format!("{}.el", recipe.package),
                elisp_source(&recipe.package, &deps),
            )]
        });
        for (path, content) in files {
            let path = repo_dir.join(path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, content)?;
        }

        let mut log = self.log.borrow_mut();
        log.clones.push(repo.clone());
        if let Some(commit) = commit {
            log.checkouts.push((repo, commit.to_string()));
        }
        Ok(())
    }

    fn ensure_local_state_matches(&self, _recipe: &Recipe, _repo_dir: &Path) -> Result<bool> {
        Ok(false)
    }

    fn pull(&self, _recipe: &Recipe, repo_dir: &Path, _from_upstream: bool) -> Result<()> {
        self.log.borrow_mut().pulls.push(repo_name(repo_dir));
        Ok(())
    }

    fn push(&self, _recipe: &Recipe, repo_dir: &Path) -> Result<()> {
        self.log.borrow_mut().pushes.push(repo_name(repo_dir));
        Ok(())
    }

    fn checkout_commit(&self, repo_dir: &Path, commit: &str) -> Result<()> {
        self.log
            .borrow_mut()
            .checkouts
            .push((repo_name(repo_dir), commit.to_string()));
        Ok(())
    }

    fn current_commit(&self, repo_dir: &Path) -> Result<String> {
        Ok(format!("commit-{}", repo_name(repo_dir)))
    }

    fn derive_repo_name(&self, recipe: &Recipe) -> Option<String> {
        recipe
            .field_str("repo")
            .and_then(|r| r.rsplit('/').next())
            .map(String::from)
    }

    fn relevant_keywords(&self) -> &'static [&'static str] {
        &["branch", "repo"]
    }
}

/// Host that records compiles and activations instead of running anything
pub struct RecordingHost {
    log: SharedLog,
}

impl RecordingHost {
    pub fn new(log: SharedLog) -> Self {
        Self { log }
    }
}

impl Host for RecordingHost {
    fn is_builtin(&self, package: &str) -> bool {
        package == "emacs"
    }

    fn extract_dependencies(&self, recipe: &Recipe, build_dir: &Path) -> Result<Vec<String>> {
        let main = build_dir.join(format!("{}.el", recipe.package));
        if !main.exists() {
            return Ok(Vec::new());
        }
        Ok(parse_package_requires(&fs::read_to_string(main)?))
    }

    fn generate_autoloads(&self, _recipe: &Recipe, _build_dir: &Path) -> Result<()> {
        Ok(())
    }

    fn compile(&self, recipe: &Recipe, _build_dir: &Path) -> Result<()> {
        let mut log = self.log.borrow_mut();
        if log.fail_compile.contains(&recipe.package) {
            return Err(Error::BuildFailed {
                package: recipe.package.clone(),
                reason: "byte-compilation failed".to_string(),
            });
        }
        log.compiled.push(recipe.package.clone());
        Ok(())
    }

    fn activate(&self, recipe: &Recipe, _build_dir: &Path) -> Result<()> {
        self.log.borrow_mut().activated.push(recipe.package.clone());
        Ok(())
    }
}

/// Recipe using the fake backend, with dependencies declared in its source
pub fn fake_recipe(package: &str, deps: &[&str]) -> RecipeInput {
    RecipeInput::new(package)
        .with_field("repo", format!("tests/{}", package))
        .with_field("deps", deps.to_vec())
}

/// A base directory with a fixed set of recipes; sessions opened on it share
/// the build cache, checkouts and lockfiles
pub struct TestEnv {
    pub dir: TempDir,
    pub log: SharedLog,
    pub warnings: Arc<Mutex<Vec<String>>>,
    recipes: Vec<RecipeInput>,
}

impl TestEnv {
    pub fn new(recipes: Vec<RecipeInput>) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            log: Rc::new(RefCell::new(Log::default())),
            warnings: Arc::new(Mutex::new(Vec::new())),
            recipes,
        }
    }

    pub fn config(&self) -> Config {
        let mut config = Config::with_base_dir(self.dir.path());
        config.default_backend = "fake".to_string();
        config
    }

    /// A fresh session, as if tendril were started again
    pub fn session(&self) -> Session {
        self.session_with(self.config())
    }

    pub fn session_with(&self, config: Config) -> Session {
        let mut source = MemorySource::new("fixtures");
        for recipe in &self.recipes {
            source.insert(recipe.clone());
        }

        let mut backends = BackendRegistry::new();
        backends.register(Box::new(FakeBackend::new(self.log.clone())));

        let warnings = self.warnings.clone();
        let reporter = CallbackStatus::new(move |event| {
            if let StatusEvent::Warning(message) = event {
                warnings.lock().unwrap().push(message);
            }
        });

        Session::new(config)
            .with_backends(backends)
            .with_sources(vec![Box::new(source)])
            .with_host(Box::new(RecordingHost::new(self.log.clone())))
            .with_reporter(Arc::new(reporter))
    }

    pub fn compiled(&self) -> Vec<String> {
        self.log.borrow().compiled.clone()
    }

    pub fn activated(&self) -> Vec<String> {
        self.log.borrow().activated.clone()
    }

    pub fn clear_log(&self) {
        let mut log = self.log.borrow_mut();
        log.compiled.clear();
        log.activated.clear();
        log.clones.clear();
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }
}
