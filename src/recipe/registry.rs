// src/recipe/registry.rs

//! Recipe registry and conflict detection
//!
//! The registry keeps the canonical recipe per package and per local
//! repository, plus the profiles each package was registered under. A
//! re-declaration that disagrees with what is already registered produces a
//! [`ConflictWarning`]; it never stops registration, and the newest recipe
//! always wins.

use crate::recipe::format::Recipe;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

/// Incompatible re-declaration detected during registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictWarning {
    /// Package being registered
    pub package: String,
    /// Package that registered the shared repository earlier, for repository
    /// conflicts
    pub other_package: Option<String>,
    /// Shared repository, for repository conflicts
    pub repo: Option<String>,
    /// Field that differs
    pub field: String,
    /// Value already registered
    pub existing: String,
    /// Value in the new recipe
    pub new: String,
}

impl fmt::Display for ConflictWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.other_package, &self.repo) {
            (Some(other), Some(repo)) => write!(
                f,
                "Packages {} and {} share repository {} but disagree on {} ({} vs {})",
                other, self.package, repo, self.field, self.existing, self.new
            ),
            _ => write!(
                f,
                "Package {} was redeclared with a different {} ({} vs {})",
                self.package, self.field, self.existing, self.new
            ),
        }
    }
}

/// Canonical recipes for the session
#[derive(Debug, Default)]
pub struct Registry {
    recipes: BTreeMap<String, Recipe>,
    repos: BTreeMap<String, Recipe>,
    profiles: BTreeMap<String, BTreeSet<String>>,
    profiles_possibly_stale: bool,
    warnings: Vec<ConflictWarning>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical recipe for a package
    pub fn recipe(&self, package: &str) -> Option<&Recipe> {
        self.recipes.get(package)
    }

    /// Most recently registered recipe using a repository
    pub fn recipe_for_repo(&self, repo: &str) -> Option<&Recipe> {
        self.repos.get(repo)
    }

    /// Whether the package has been registered
    pub fn contains(&self, package: &str) -> bool {
        self.recipes.contains_key(package)
    }

    /// All registered recipes, ordered by package name
    pub fn recipes(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.values()
    }

    /// One recipe per registered repository, ordered by repository name
    pub fn repos(&self) -> impl Iterator<Item = (&str, &Recipe)> {
        self.repos.iter().map(|(repo, recipe)| (repo.as_str(), recipe))
    }

    /// Profiles a package was registered under
    pub fn profiles_of(&self, package: &str) -> Option<&BTreeSet<String>> {
        self.profiles.get(package)
    }

    /// Recipes registered under a profile
    pub fn recipes_in_profile<'a>(&'a self, profile: &'a str) -> impl Iterator<Item = &'a Recipe> {
        self.recipes.values().filter(move |r| {
            self.profiles
                .get(&r.package)
                .is_some_and(|set| set.contains(profile))
        })
    }

    /// Set when a package was registered outside the declarative config, so
    /// the profile sets may not match it
    pub fn profiles_possibly_stale(&self) -> bool {
        self.profiles_possibly_stale
    }

    /// Every conflict warning emitted since the last reset
    pub fn warnings(&self) -> &[ConflictWarning] {
        &self.warnings
    }

    /// Register a recipe, returning the warnings this registration produced
    ///
    /// `keywords` are the backend's relevant field names. `mirrors_config`
    /// says whether the caller is replaying the full declarative config.
    pub fn register(
        &mut self,
        recipe: Recipe,
        keywords: &[&str],
        profile: &str,
        mirrors_config: bool,
    ) -> Vec<ConflictWarning> {
        let mut emitted = Vec::new();

        if let Some(existing) = self.repos.get(&recipe.local_repo) {
            if existing.package != recipe.package {
                if let Some((field, old, new)) = existing.backend_difference(&recipe, keywords) {
                    emitted.push(ConflictWarning {
                        package: recipe.package.clone(),
                        other_package: Some(existing.package.clone()),
                        repo: Some(recipe.local_repo.clone()),
                        field,
                        existing: old,
                        new,
                    });
                }
            }
        }

        if let Some(existing) = self.recipes.get(&recipe.package) {
            let difference = existing
                .backend_difference(&recipe, keywords)
                .or_else(|| existing.build_difference(&recipe));
            if let Some((field, old, new)) = difference {
                emitted.push(ConflictWarning {
                    package: recipe.package.clone(),
                    other_package: None,
                    repo: None,
                    field,
                    existing: old,
                    new,
                });
            }
        }

        for warning in &emitted {
            warn!("{}", warning);
        }
        self.warnings.extend(emitted.iter().cloned());

        let added = self
            .profiles
            .entry(recipe.package.clone())
            .or_default()
            .insert(profile.to_string());
        if added && !mirrors_config {
            self.profiles_possibly_stale = true;
        }
        self.repos.insert(recipe.local_repo.clone(), recipe.clone());
        self.recipes.insert(recipe.package.clone(), recipe);

        emitted
    }

    /// Clear all three caches together
    pub fn reset(&mut self) {
        self.recipes.clear();
        self.repos.clear();
        self.profiles.clear();
        self.profiles_possibly_stale = false;
        self.warnings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KEYWORDS: &[&str] = &["repo", "branch", "host"];

    fn recipe(package: &str, repo: &str, url: &str) -> Recipe {
        let mut fields = BTreeMap::new();
        fields.insert("repo".to_string(), json!(url));
        Recipe {
            package: package.to_string(),
            local_repo: repo.to_string(),
            backend: "git".to_string(),
            files: None,
            no_build: false,
            fields,
        }
    }

    #[test]
    fn test_shared_repo_identical_fields_no_warning() {
        let mut registry = Registry::new();

        assert!(registry.register(recipe("a", "shared", "u/shared"), KEYWORDS, "default", true).is_empty());
        assert!(registry.register(recipe("b", "shared", "u/shared"), KEYWORDS, "default", true).is_empty());
        assert!(registry.warnings().is_empty());
    }

    #[test]
    fn test_shared_repo_conflict_single_warning() {
        let mut registry = Registry::new();
        registry.register(recipe("a", "shared", "u/shared"), KEYWORDS, "default", true);

        let mut b = recipe("b", "shared", "fork/shared");
        b.fields.insert("branch".to_string(), json!("dev"));
        let warnings = registry.register(b, KEYWORDS, "default", true);

        assert_eq!(warnings.len(), 1);
        let message = warnings[0].to_string();
        assert!(message.contains('a'));
        assert!(message.contains('b'));
        assert_eq!(warnings[0].field, "branch");
        assert_eq!(warnings[0].other_package.as_deref(), Some("a"));
    }

    #[test]
    fn test_backend_tag_compared_first() {
        let mut registry = Registry::new();
        registry.register(recipe("a", "shared", "u/shared"), KEYWORDS, "default", true);

        let mut b = recipe("b", "shared", "other/shared");
        b.backend = "hg".to_string();
        let warnings = registry.register(b, KEYWORDS, "default", true);

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "backend");
    }

    #[test]
    fn test_redeclared_package_build_field_conflict() {
        let mut registry = Registry::new();
        registry.register(recipe("a", "repo-a", "u/a"), KEYWORDS, "default", true);

        let warnings = registry.register(recipe("a", "repo-b", "u/a"), KEYWORDS, "default", true);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "local_repo");
        assert!(warnings[0].to_string().contains("redeclared"));

        // Newest recipe wins
        assert_eq!(registry.recipe("a").unwrap().local_repo, "repo-b");
        assert_eq!(registry.recipe_for_repo("repo-b").unwrap().package, "a");
    }

    #[test]
    fn test_identical_reregistration_is_silent() {
        let mut registry = Registry::new();
        registry.register(recipe("a", "repo-a", "u/a"), KEYWORDS, "default", true);
        registry.register(recipe("a", "repo-a", "u/a"), KEYWORDS, "default", true);
        assert!(registry.warnings().is_empty());
    }

    #[test]
    fn test_profiles_and_staleness_flag() {
        let mut registry = Registry::new();
        registry.register(recipe("a", "repo-a", "u/a"), KEYWORDS, "default", true);
        registry.register(recipe("a", "repo-a", "u/a"), KEYWORDS, "default", false);
        assert!(!registry.profiles_possibly_stale());

        registry.register(recipe("a", "repo-a", "u/a"), KEYWORDS, "work", false);
        registry.register(recipe("a", "repo-a", "u/a"), KEYWORDS, "work", false);
        assert!(registry.profiles_possibly_stale());

        let profiles: Vec<&String> = registry.profiles_of("a").unwrap().iter().collect();
        assert_eq!(profiles, vec!["default", "work"]);
        assert_eq!(registry.recipes_in_profile("work").count(), 1);
        assert_eq!(registry.recipes_in_profile("other").count(), 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut registry = Registry::new();
        registry.register(recipe("a", "repo-a", "u/a"), KEYWORDS, "default", false);
        registry.register(recipe("a", "repo-b", "u/a"), KEYWORDS, "default", false);

        registry.reset();

        assert!(registry.recipe("a").is_none());
        assert!(registry.recipe_for_repo("repo-a").is_none());
        assert!(registry.profiles_of("a").is_none());
        assert!(registry.warnings().is_empty());
        assert!(!registry.profiles_possibly_stale());
    }
}
