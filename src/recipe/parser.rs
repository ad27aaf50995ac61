// src/recipe/parser.rs

//! Recipe file parsing

use crate::error::{Error, Result};
use crate::recipe::format::RecipeInput;
use std::path::Path;

/// Parse a literal recipe from a TOML string
pub fn parse_recipe(content: &str) -> Result<RecipeInput> {
    toml::from_str(content).map_err(|e| Error::InvalidRecipe(format!("{}", e)))
}

/// Parse a recipe file; a missing `package` is taken from the file stem
pub fn parse_recipe_file(path: &Path) -> Result<RecipeInput> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::IoError(format!(
            "Failed to read recipe file {}: {}",
            path.display(),
            e
        ))
    })?;

    let mut input = parse_recipe(&content)?;
    if input.package.is_empty() {
        if let Some(stem) = path.file_stem() {
            input.package = stem.to_string_lossy().into_owned();
        }
    }
    Ok(input)
}

/// Validate a literal recipe, returning non-fatal warnings
pub fn validate_recipe(input: &RecipeInput) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    if input.package.is_empty() {
        return Err(Error::InvalidRecipe(
            "package name cannot be empty".to_string(),
        ));
    }
    if input
        .package
        .chars()
        .any(|c| c.is_whitespace() || c == '/' || c == '\\')
    {
        return Err(Error::InvalidRecipe(format!(
            "invalid package name '{}'",
            input.package
        )));
    }

    if let Some(repo) = &input.local_repo {
        if repo.is_empty() || repo == "." || repo == ".." || repo.contains(['/', '\\']) {
            return Err(Error::InvalidRecipe(format!(
                "{}: local_repo '{}' must be a plain directory name",
                input.package, repo
            )));
        }
    }

    if input.backend.as_deref() == Some("") {
        return Err(Error::InvalidRecipe(format!(
            "{}: backend cannot be empty",
            input.package
        )));
    }

    if input.no_build && input.files.is_some() {
        warnings.push(format!(
            "{}: files directive is ignored when no_build is set",
            input.package
        ));
    }

    Ok(warnings)
}
