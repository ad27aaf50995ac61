// src/recipe/mod.rs

//! Recipe system: what a package is and where it comes from
//!
//! Recipes say which repository holds a package, which VC backend manages
//! that repository, and which files of the checkout make up the build.
//!
//! # Lifecycle
//!
//! - **Input**: a bare name (`"magit"`) or a literal table, written in the
//!   config file or a recipe directory
//! - **Normalize**: defaults are filled in and bare names are looked up in
//!   the recipe sources
//! - **Register**: the canonical recipe is recorded for the session and
//!   compared against earlier declarations
//!
//! # Example Recipe
//!
//! ```toml
//! package = "magit"
//! repo = "magit/magit"
//! files = ["lisp/*.el", "docs/magit.texi", [":exclude", "lisp/magit-libgit.el"]]
//! ```

mod format;
mod normalize;
pub mod parser;
mod registry;
mod source;

pub use format::{BUILTIN_BACKEND, Recipe, RecipeInput, RecipeSpec};
pub use normalize::{Normalized, Normalizer};
pub use parser::{parse_recipe, parse_recipe_file, validate_recipe};
pub use registry::{ConflictWarning, Registry};
pub use source::{DirectorySource, MemorySource, RecipeSource};
