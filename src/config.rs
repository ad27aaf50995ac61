// src/config.rs

//! User configuration
//!
//! Read from `$XDG_CONFIG_HOME/tendril/config.toml` unless a path is given.
//! Every key is optional.
//!
//! ```toml
//! base_dir = "~/.local/share/tendril"
//! profile = "default"
//! recipe_dirs = ["recipes"]
//! modification_check = "find-at-startup"
//! uncovered_repo_policy = "individual"
//!
//! packages = [
//!     "dash",
//!     { package = "magit", repo = "magit/magit", files = ["lisp/*.el"] },
//! ]
//!
//! [profiles]
//! default = "default.toml"
//! work = "work.toml"
//!
//! [host]
//! builtin = ["emacs", "cl-lib"]
//! compile = ["emacs", "--batch", "-L", "%(build_dir)s", "-f", "batch-byte-compile-if-not-done"]
//! ```

use crate::cache::{ModificationCheck, UncoveredRepoPolicy};
use crate::error::{Error, Result};
use crate::recipe::RecipeSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Host runtime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Packages the host provides itself
    pub builtin: Vec<String>,
    /// Command template run to compile a build directory
    pub compile: Vec<String>,
    /// Command template run to generate autoloads
    pub autoloads: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            builtin: vec!["emacs".to_string()],
            compile: Vec::new(),
            autoloads: Vec::new(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of all state: checkouts, builds, cache, lockfiles
    pub base_dir: PathBuf,
    /// Profile label for packages registered by this session
    pub profile: String,
    /// Backend for recipes that do not name one
    pub default_backend: String,
    /// Recipe directories, searched in order
    pub recipe_dirs: Vec<PathBuf>,
    pub modification_check: ModificationCheck,
    pub uncovered_repo_policy: UncoveredRepoPolicy,
    /// Profile name → lockfile name under `versions/`
    pub profiles: BTreeMap<String, String>,
    /// Packages declared for the active profile
    pub packages: Vec<RecipeSpec>,
    pub host: HostConfig,
}

impl Default for Config {
    fn default() -> Self {
        let base_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tendril");

        let mut profiles = BTreeMap::new();
        profiles.insert("default".to_string(), "default.toml".to_string());

        Self {
            base_dir,
            profile: "default".to_string(),
            default_backend: "git".to_string(),
            recipe_dirs: Vec::new(),
            modification_check: ModificationCheck::default(),
            uncovered_repo_policy: UncoveredRepoPolicy::default(),
            profiles,
            packages: Vec::new(),
            host: HostConfig::default(),
        }
    }
}

impl Config {
    /// Default configuration rooted at `base_dir`
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// `$XDG_CONFIG_HOME/tendril/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tendril").join("config.toml"))
    }

    /// Parse a config file; relative paths are taken from its directory
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| Error::ParseError(format!("Invalid config {}: {}", path.display(), e)))?;

        if let Some(dir) = path.parent() {
            if config.base_dir.is_relative() {
                config.base_dir = dir.join(&config.base_dir);
            }
            for recipe_dir in &mut config.recipe_dirs {
                if recipe_dir.is_relative() {
                    *recipe_dir = dir.join(&*recipe_dir);
                }
            }
        }

        debug!(
            "Loaded config from {} ({} packages)",
            path.display(),
            config.packages.len()
        );
        Ok(config)
    }

    /// Load `path`, or the default config file when present
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.base_dir.join("repos")
    }

    pub fn build_dir(&self) -> PathBuf {
        self.base_dir.join("build")
    }

    /// Checkout directory of a repository
    pub fn repo_path(&self, repo: &str) -> PathBuf {
        self.repos_dir().join(repo)
    }

    /// Build directory of a package
    pub fn package_build_path(&self, package: &str) -> PathBuf {
        self.build_dir().join(package)
    }

    pub fn build_cache_path(&self) -> PathBuf {
        self.base_dir.join("build-cache.json")
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.base_dir.join("versions")
    }

    /// Lockfile of a profile; profiles without an entry use `<profile>.toml`
    pub fn lockfile_path(&self, profile: &str) -> PathBuf {
        let name = self
            .profiles
            .get(profile)
            .cloned()
            .unwrap_or_else(|| format!("{}.toml", profile));
        self.versions_dir().join(name)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join("tendril.lock")
    }
}
