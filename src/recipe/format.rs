// src/recipe/format.rs

//! Recipe data types
//!
//! A [`RecipeInput`] is what a user or a recipe source writes down; a
//! [`Recipe`] is the canonical record produced by normalization, with every
//! default filled in.

use crate::files::FilesDirective;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Backend tag for packages provided by the host itself
pub const BUILTIN_BACKEND: &str = "builtin";

/// Canonical recipe for one package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Unique package identifier
    pub package: String,

    /// Name of the checkout under the repos directory; may be shared
    pub local_repo: String,

    /// VC backend tag
    pub backend: String,

    /// Files directive (`None` means the default directive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<FilesDirective>,

    /// Stop after checkout
    #[serde(default)]
    pub no_build: bool,

    /// Backend-specific fields, opaque to the core
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
}

impl Recipe {
    /// Backend-specific field value
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Backend-specific field as a string
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Whether this recipe names a host-provided package
    pub fn is_builtin(&self) -> bool {
        self.backend == BUILTIN_BACKEND
    }

    /// First backend-relevant difference: the backend tag, then each keyword
    /// in sorted order. Returns `(field, old, new)`.
    pub fn backend_difference(
        &self,
        other: &Recipe,
        keywords: &[&str],
    ) -> Option<(String, String, String)> {
        if self.backend != other.backend {
            return Some((
                "backend".to_string(),
                self.backend.clone(),
                other.backend.clone(),
            ));
        }

        let mut sorted: Vec<&str> = keywords.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        sorted.into_iter().find_map(|key| {
            let old = self.fields.get(key);
            let new = other.fields.get(key);
            (old != new).then(|| (key.to_string(), describe(old), describe(new)))
        })
    }

    /// First build-relevant difference (`local_repo`, then `files`)
    pub fn build_difference(&self, other: &Recipe) -> Option<(String, String, String)> {
        if self.local_repo != other.local_repo {
            return Some((
                "local_repo".to_string(),
                self.local_repo.clone(),
                other.local_repo.clone(),
            ));
        }
        if self.files != other.files {
            return Some((
                "files".to_string(),
                describe_files(self.files.as_ref()),
                describe_files(other.files.as_ref()),
            ));
        }
        None
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.package, self.backend, self.local_repo)
    }
}

fn describe(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => "<unset>".to_string(),
    }
}

fn describe_files(files: Option<&FilesDirective>) -> String {
    files
        .map(|f| f.to_value().to_string())
        .unwrap_or_else(|| "<default>".to_string())
}

/// A literal recipe as written in config or a recipe file
///
/// Every key other than the core ones lands in `fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeInput {
    /// Package name; recipe files may omit it and take it from the file name
    #[serde(default)]
    pub package: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_repo: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<FilesDirective>,

    #[serde(default)]
    pub no_build: bool,

    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl RecipeInput {
    /// Minimal literal recipe for `package`
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            ..Default::default()
        }
    }

    /// Set a backend-specific field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set the local repository name
    pub fn with_local_repo(mut self, repo: impl Into<String>) -> Self {
        self.local_repo = Some(repo.into());
        self
    }

    /// Set the backend tag
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Set the files directive
    pub fn with_files(mut self, files: FilesDirective) -> Self {
        self.files = Some(files);
        self
    }
}

impl From<Recipe> for RecipeInput {
    fn from(recipe: Recipe) -> Self {
        Self {
            package: recipe.package,
            local_repo: Some(recipe.local_repo),
            backend: Some(recipe.backend),
            files: recipe.files,
            no_build: recipe.no_build,
            fields: recipe.fields,
        }
    }
}

/// What callers hand to the normalizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecipeSpec {
    /// Bare package name, looked up in the registry then the recipe sources
    Name(String),
    /// Explicit recipe
    Literal(RecipeInput),
}

impl RecipeSpec {
    /// The package this spec is about
    pub fn package(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Literal(input) => &input.package,
        }
    }
}

impl From<&str> for RecipeSpec {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<RecipeInput> for RecipeSpec {
    fn from(input: RecipeInput) -> Self {
        Self::Literal(input)
    }
}
