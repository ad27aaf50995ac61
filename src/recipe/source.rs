// src/recipe/source.rs

//! Recipe sources: where bare package names are looked up
//!
//! Sources are consulted in order and the first match wins. A source that
//! does not know a package returns `Ok(None)`; errors are reserved for
//! sources that exist but cannot be read.

use crate::error::{Error, Result};
use crate::recipe::format::RecipeInput;
use crate::recipe::parser::parse_recipe_file;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Pluggable name → recipe resolver
pub trait RecipeSource {
    /// Name used in log messages
    fn name(&self) -> &str;

    /// Look up the recipe for `package`
    fn retrieve(&self, package: &str) -> Result<Option<RecipeInput>>;

    /// Every package this source can provide
    fn list(&self) -> Result<Vec<String>>;
}

/// Directory of `<package>.toml` recipe files
#[derive(Debug, Clone)]
pub struct DirectorySource {
    name: String,
    dir: PathBuf,
}

impl DirectorySource {
    /// Create a source reading recipes from `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            name: dir.display().to_string(),
            dir,
        }
    }

    /// Directory this source reads from
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl RecipeSource for DirectorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn retrieve(&self, package: &str) -> Result<Option<RecipeInput>> {
        let path = self.dir.join(format!("{}.toml", package));
        if !path.is_file() {
            return Ok(None);
        }

        let input = parse_recipe_file(&path)?;
        if input.package != package {
            return Err(Error::InvalidRecipe(format!(
                "{} declares package '{}'",
                path.display(),
                input.package
            )));
        }
        debug!("Found recipe for {} in {}", package, self.name);
        Ok(Some(input))
    }

    fn list(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// In-memory recipe table
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    recipes: BTreeMap<String, RecipeInput>,
}

impl MemorySource {
    /// Create an empty named source
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            recipes: BTreeMap::new(),
        }
    }

    /// Add or replace a recipe
    pub fn insert(&mut self, input: RecipeInput) {
        self.recipes.insert(input.package.clone(), input);
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, input: RecipeInput) -> Self {
        self.insert(input);
        self
    }
}

impl RecipeSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn retrieve(&self, package: &str) -> Result<Option<RecipeInput>> {
        Ok(self.recipes.get(package).cloned())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.recipes.keys().cloned().collect())
    }
}
