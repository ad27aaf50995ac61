// src/recipe/normalize.rs

//! Recipe normalization
//!
//! Turns a [`RecipeSpec`] into a canonical [`Recipe`]. Bare names are first
//! looked up in the session registry, then in each recipe source in order.
//! Literal recipes skip the lookup. Either way every default is filled in, so
//! normalizing an already-normalized recipe returns it unchanged.

use crate::error::Result;
use crate::recipe::format::{BUILTIN_BACKEND, Recipe, RecipeInput, RecipeSpec};
use crate::recipe::parser::validate_recipe;
use crate::recipe::registry::Registry;
use crate::recipe::source::RecipeSource;
use crate::vc::BackendRegistry;
use tracing::{debug, warn};

/// Result of normalizing a spec
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// Canonical recipe, ready for registration
    Recipe(Recipe),
    /// No source knows the package
    Unresolvable,
}

impl Normalized {
    /// The recipe, if one was found
    pub fn into_recipe(self) -> Option<Recipe> {
        match self {
            Self::Recipe(recipe) => Some(recipe),
            Self::Unresolvable => None,
        }
    }
}

/// Borrowed view of what normalization needs from a session
pub struct Normalizer<'a> {
    pub default_backend: &'a str,
    pub sources: &'a [Box<dyn RecipeSource>],
    pub backends: &'a BackendRegistry,
    pub registry: &'a Registry,
}

impl Normalizer<'_> {
    /// Normalize a spec
    pub fn normalize(&self, spec: &RecipeSpec) -> Result<Normalized> {
        match spec {
            RecipeSpec::Literal(input) => self.complete(input.clone(), true).map(Normalized::Recipe),
            RecipeSpec::Name(name) => {
                if let Some(recipe) = self.registry.recipe(name) {
                    debug!("Recipe for {} served from registry", name);
                    return Ok(Normalized::Recipe(recipe.clone()));
                }

                match self.retrieve(name)? {
                    Some(input) => self.complete(input, false).map(Normalized::Recipe),
                    None => {
                        debug!("No recipe source knows {}", name);
                        Ok(Normalized::Unresolvable)
                    }
                }
            }
        }
    }

    fn retrieve(&self, package: &str) -> Result<Option<RecipeInput>> {
        for source in self.sources {
            if let Some(mut input) = source.retrieve(package)? {
                debug!("Recipe for {} retrieved from {}", package, source.name());
                if input.package.is_empty() {
                    input.package = package.to_string();
                }
                return Ok(Some(input));
            }
        }
        Ok(None)
    }

    /// Fill in defaults; `explicit` recipes are exempt from the sharing
    /// heuristic
    fn complete(&self, input: RecipeInput, explicit: bool) -> Result<Recipe> {
        for message in validate_recipe(&input)? {
            warn!("{}", message);
        }

        let backend = input
            .backend
            .unwrap_or_else(|| self.default_backend.to_string());

        let mut recipe = Recipe {
            local_repo: input.local_repo.clone().unwrap_or_else(|| input.package.clone()),
            package: input.package,
            backend,
            files: input.files,
            no_build: input.no_build,
            fields: input.fields,
        };

        if recipe.backend == BUILTIN_BACKEND {
            return Ok(recipe);
        }

        let vc = self.backends.get(&recipe.backend)?;
        if input.local_repo.is_none() {
            if let Some(derived) = vc.derive_repo_name(&recipe) {
                recipe.local_repo = derived;
            }
        }

        if !explicit {
            if let Some(existing) = self.registry.recipe_for_repo(&recipe.local_repo) {
                if existing.package != recipe.package {
                    debug!(
                        "{} shares repository {} with {}, adopting its backend fields",
                        recipe.package, recipe.local_repo, existing.package
                    );
                    for key in vc.relevant_keywords() {
                        match existing.fields.get(*key) {
                            Some(value) => {
                                recipe.fields.insert((*key).to_string(), value.clone());
                            }
                            None => {
                                recipe.fields.remove(*key);
                            }
                        }
                    }
                }
            }
        }

        Ok(recipe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::source::MemorySource;
    use serde_json::json;

    fn sources() -> Vec<Box<dyn RecipeSource>> {
        let first = MemorySource::new("first")
            .with(RecipeInput::new("dash").with_field("repo", "magnars/dash.el"))
            .with(RecipeInput::new("magit-section").with_field("repo", "magit/magit"));
        let second = MemorySource::new("second")
            .with(RecipeInput::new("dash").with_field("repo", "shadowed/dash.el"))
            .with(RecipeInput::new("s").with_field("repo", "magnars/s.el"));
        vec![Box::new(first), Box::new(second)]
    }

    fn normalizer<'a>(
        sources: &'a [Box<dyn RecipeSource>],
        backends: &'a BackendRegistry,
        registry: &'a Registry,
    ) -> Normalizer<'a> {
        Normalizer {
            default_backend: "git",
            sources,
            backends,
            registry,
        }
    }

    #[test]
    fn test_first_source_wins() {
        let sources = sources();
        let backends = BackendRegistry::with_defaults();
        let registry = Registry::new();
        let n = normalizer(&sources, &backends, &registry);

        let recipe = n.normalize(&"dash".into()).unwrap().into_recipe().unwrap();
        assert_eq!(recipe.field_str("repo"), Some("magnars/dash.el"));
        assert_eq!(recipe.backend, "git");
        assert_eq!(recipe.local_repo, "dash.el");

        let s = n.normalize(&"s".into()).unwrap().into_recipe().unwrap();
        assert_eq!(s.local_repo, "s.el");
    }

    #[test]
    fn test_unknown_name_is_unresolvable() {
        let sources = sources();
        let backends = BackendRegistry::with_defaults();
        let registry = Registry::new();
        let n = normalizer(&sources, &backends, &registry);

        assert_eq!(n.normalize(&"nope".into()).unwrap(), Normalized::Unresolvable);
    }

    #[test]
    fn test_literal_defaults() {
        let sources: Vec<Box<dyn RecipeSource>> = Vec::new();
        let backends = BackendRegistry::with_defaults();
        let registry = Registry::new();
        let n = normalizer(&sources, &backends, &registry);

        // No repo field, so the backend cannot derive a name
        let recipe = n
            .normalize(&RecipeInput::new("local-pkg").into())
            .unwrap()
            .into_recipe()
            .unwrap();
        assert_eq!(recipe.local_repo, "local-pkg");
        assert_eq!(recipe.backend, "git");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let sources = sources();
        let backends = BackendRegistry::with_defaults();
        let registry = Registry::new();
        let n = normalizer(&sources, &backends, &registry);

        let once = n.normalize(&"dash".into()).unwrap().into_recipe().unwrap();
        let twice = n
            .normalize(&RecipeSpec::Literal(once.clone().into()))
            .unwrap()
            .into_recipe()
            .unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_registry_hit_returned_verbatim() {
        let sources = sources();
        let backends = BackendRegistry::with_defaults();
        let mut registry = Registry::new();

        let custom = Recipe {
            package: "dash".to_string(),
            local_repo: "my-dash".to_string(),
            backend: "git".to_string(),
            files: None,
            no_build: true,
            fields: Default::default(),
        };
        registry.register(custom.clone(), &[], "default", true);

        let n = normalizer(&sources, &backends, &registry);
        assert_eq!(
            n.normalize(&"dash".into()).unwrap(),
            Normalized::Recipe(custom)
        );
    }

    #[test]
    fn test_sharing_heuristic_copies_backend_fields() {
        let sources = sources();
        let backends = BackendRegistry::with_defaults();
        let mut registry = Registry::new();

        let magit = Recipe {
            package: "magit".to_string(),
            local_repo: "magit".to_string(),
            backend: "git".to_string(),
            files: None,
            no_build: false,
            fields: [
                ("repo".to_string(), json!("fork/magit")),
                ("branch".to_string(), json!("next")),
            ]
            .into_iter()
            .collect(),
        };
        registry.register(magit, &["repo", "branch"], "default", true);

        let n = normalizer(&sources, &backends, &registry);
        let section = n
            .normalize(&"magit-section".into())
            .unwrap()
            .into_recipe()
            .unwrap();

        assert_eq!(section.local_repo, "magit");
        assert_eq!(section.field_str("repo"), Some("fork/magit"));
        assert_eq!(section.field_str("branch"), Some("next"));
    }

    #[test]
    fn test_sharing_heuristic_skips_explicit_recipes() {
        let sources: Vec<Box<dyn RecipeSource>> = Vec::new();
        let backends = BackendRegistry::with_defaults();
        let mut registry = Registry::new();

        let magit = Recipe {
            package: "magit".to_string(),
            local_repo: "magit".to_string(),
            backend: "git".to_string(),
            files: None,
            no_build: false,
            fields: [("repo".to_string(), json!("fork/magit"))]
                .into_iter()
                .collect(),
        };
        registry.register(magit, &["repo"], "default", true);

        let n = normalizer(&sources, &backends, &registry);
        let input = RecipeInput::new("magit-section").with_field("repo", "magit/magit");
        let section = n.normalize(&input.into()).unwrap().into_recipe().unwrap();

        assert_eq!(section.field_str("repo"), Some("magit/magit"));
    }

    #[test]
    fn test_builtin_backend_needs_no_vc() {
        let sources: Vec<Box<dyn RecipeSource>> = Vec::new();
        let backends = BackendRegistry::new();
        let registry = Registry::new();
        let n = normalizer(&sources, &backends, &registry);

        let recipe = n
            .normalize(&RecipeInput::new("cl-lib").with_backend(BUILTIN_BACKEND).into())
            .unwrap()
            .into_recipe()
            .unwrap();
        assert!(recipe.is_builtin());
    }

    #[test]
    fn test_unknown_backend_is_error() {
        let sources: Vec<Box<dyn RecipeSource>> = Vec::new();
        let backends = BackendRegistry::with_defaults();
        let registry = Registry::new();
        let n = normalizer(&sources, &backends, &registry);

        let spec = RecipeInput::new("x").with_backend("darcs").into();
        assert!(n.normalize(&spec).is_err());
    }
}
