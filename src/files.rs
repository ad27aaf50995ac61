// src/files.rs

//! Files directives: which checkout files make up a package build
//!
//! A directive is an ordered list of entries, processed left to right:
//!
//! - `"*.el"`: wildcard pattern, each match mapped to its basename
//! - `{ from = "src/a.el", to = "b.el" }`: explicit rename, kept only when the
//!   source exists
//! - `["sub", ...]`: nested list whose destinations get the `sub/` prefix
//! - `[":exclude", ...]`: nested list whose matches are removed from everything
//!   accumulated so far
//! - `":defaults"`: spliced in place with [`default_entries`]
//!
//! Later entries can add mappings and retroactively remove earlier ones. An
//! `:exclude` nested inside an `:exclude` cancels out for the files it names.
//! The final mapping keeps one source per destination, the textually last one.
//!
//! # Example
//!
//! ```toml
//! files = [":defaults", "snippets", ["extensions", "ext/*.el"], [":exclude", "magit-pkg.el"]]
//! ```

use crate::error::{Error, Result};
use glob::MatchOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Marker string that splices in the default directive
pub const DEFAULTS_MARKER: &str = ":defaults";

/// Marker string leading an exclusion list
pub const EXCLUDE_MARKER: &str = ":exclude";

/// Patterns included by the default directive
const DEFAULT_PATTERNS: &[&str] = &[
    "*.el",
    "*.el.in",
    "dir",
    "*.info",
    "*.texi",
    "*.texinfo",
    "doc/dir",
    "doc/*.info",
    "doc/*.texi",
    "doc/*.texinfo",
    "lisp/*.el",
];

/// Patterns excluded by the default directive
const DEFAULT_EXCLUSIONS: &[&str] = &[
    ".dir-locals.el",
    "test.el",
    "tests.el",
    "*-test.el",
    "*-tests.el",
    "LICENSE",
    "README*",
    "*-pkg.el",
];

/// One entry of a files directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEntry {
    /// Wildcard pattern relative to the checkout
    Pattern(String),
    /// Explicit source → destination pair
    Rename { from: String, to: String },
    /// Entries whose destinations live under `prefix/`
    Prefixed {
        prefix: String,
        entries: Vec<FileEntry>,
    },
    /// Entries to remove from what has been accumulated
    Exclude(Vec<FileEntry>),
    /// The default directive
    Defaults,
}

/// The entries making up the default directive
pub fn default_entries() -> Vec<FileEntry> {
    let mut entries: Vec<FileEntry> = DEFAULT_PATTERNS
        .iter()
        .map(|p| FileEntry::Pattern(p.to_string()))
        .collect();
    entries.push(FileEntry::Exclude(
        DEFAULT_EXCLUSIONS
            .iter()
            .map(|p| FileEntry::Pattern(p.to_string()))
            .collect(),
    ));
    entries
}

/// A parsed files directive
///
/// Serialized as a list: strings are patterns or markers, lists are nested
/// directives, tables with `from`/`to` are renames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct FilesDirective {
    entries: Vec<FileEntry>,
}

impl FilesDirective {
    /// Build a directive from already parsed entries
    pub fn new(entries: Vec<FileEntry>) -> Self {
        Self { entries }
    }

    /// The entries in order
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// An empty directive behaves like the default directive
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a directive from its list form
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(Self {
                entries: items.iter().map(parse_entry).collect::<Result<_>>()?,
            }),
            other => Err(Error::InvalidFilesDirective(format!(
                "expected a list of entries, got {}",
                other
            ))),
        }
    }

    /// Render the directive back to its list form
    pub fn to_value(&self) -> Value {
        Value::Array(self.entries.iter().map(entry_to_value).collect())
    }
}

impl TryFrom<Value> for FilesDirective {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(&value)
    }
}

impl From<FilesDirective> for Value {
    fn from(directive: FilesDirective) -> Self {
        directive.to_value()
    }
}

fn parse_entry(value: &Value) -> Result<FileEntry> {
    match value {
        Value::String(s) if s == DEFAULTS_MARKER => Ok(FileEntry::Defaults),
        Value::String(s) if s.starts_with(':') => Err(Error::InvalidFilesDirective(format!(
            "unknown marker {}",
            s
        ))),
        Value::String(s) if s.is_empty() => Err(Error::InvalidFilesDirective(
            "empty pattern".to_string(),
        )),
        Value::String(s) => Ok(FileEntry::Pattern(s.clone())),
        Value::Object(map) => {
            let from = map.get("from").and_then(Value::as_str);
            let to = map.get("to").and_then(Value::as_str);
            match (from, to) {
                (Some(from), Some(to)) if map.len() == 2 && !from.is_empty() && !to.is_empty() => {
                    Ok(FileEntry::Rename {
                        from: from.to_string(),
                        to: to.to_string(),
                    })
                }
                _ => Err(Error::InvalidFilesDirective(format!(
                    "rename entries need exactly `from` and `to` strings, got {}",
                    value
                ))),
            }
        }
        Value::Array(items) => {
            let Some((head, rest)) = items.split_first() else {
                return Err(Error::InvalidFilesDirective(
                    "nested list cannot be empty".to_string(),
                ));
            };
            let entries = rest.iter().map(parse_entry).collect::<Result<Vec<_>>>()?;
            match head {
                Value::String(s) if s == EXCLUDE_MARKER => Ok(FileEntry::Exclude(entries)),
                Value::String(s) if s.starts_with(':') => Err(Error::InvalidFilesDirective(
                    format!("{} cannot lead a nested list", s),
                )),
                Value::String(prefix) if !prefix.is_empty() => Ok(FileEntry::Prefixed {
                    prefix: prefix.clone(),
                    entries,
                }),
                other => Err(Error::InvalidFilesDirective(format!(
                    "nested list must start with a prefix or {}, got {}",
                    EXCLUDE_MARKER, other
                ))),
            }
        }
        other => Err(Error::InvalidFilesDirective(format!(
            "unsupported entry {}",
            other
        ))),
    }
}

fn entry_to_value(entry: &FileEntry) -> Value {
    match entry {
        FileEntry::Pattern(p) => Value::String(p.clone()),
        FileEntry::Rename { from, to } => serde_json::json!({ "from": from, "to": to }),
        FileEntry::Prefixed { prefix, entries } => {
            let mut items = vec![Value::String(prefix.clone())];
            items.extend(entries.iter().map(entry_to_value));
            Value::Array(items)
        }
        FileEntry::Exclude(entries) => {
            let mut items = vec![Value::String(EXCLUDE_MARKER.to_string())];
            items.extend(entries.iter().map(entry_to_value));
            Value::Array(items)
        }
        FileEntry::Defaults => Value::String(DEFAULTS_MARKER.to_string()),
    }
}

/// Resolved mapping from checkout files to build-relative destinations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMapping {
    pairs: Vec<(PathBuf, PathBuf)>,
}

impl FileMapping {
    /// (absolute source, destination relative to the build directory) pairs
    pub fn pairs(&self) -> &[(PathBuf, PathBuf)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Source mapped to a relative destination, if any
    pub fn source_for(&self, dest: impl AsRef<Path>) -> Option<&Path> {
        let dest = dest.as_ref();
        self.pairs
            .iter()
            .find(|(_, d)| d == dest)
            .map(|(s, _)| s.as_path())
    }

    /// Pairs with destinations made absolute under `build_dir`
    pub fn rooted_at(&self, build_dir: &Path) -> Vec<(PathBuf, PathBuf)> {
        self.pairs
            .iter()
            .map(|(src, dest)| (src.clone(), build_dir.join(dest)))
            .collect()
    }
}

#[derive(Debug, Default)]
struct Expansion {
    mappings: Vec<(PathBuf, PathBuf)>,
    exclusions: Vec<PathBuf>,
}

impl Expansion {
    /// Append a mapping, moving an identical earlier one to the end
    fn add(&mut self, source: PathBuf, dest: PathBuf) {
        self.mappings.retain(|(s, d)| !(s == &source && d == &dest));
        self.mappings.push((source, dest));
    }
}

/// Expand a files directive against a checkout
///
/// A missing or empty directive is the default directive.
pub fn expand(directive: Option<&FilesDirective>, source_root: &Path) -> Result<FileMapping> {
    let entries = match directive {
        Some(d) if !d.is_empty() => d.entries.clone(),
        _ => default_entries(),
    };

    let expansion = expand_entries(&entries, source_root, Path::new(""))?;

    let mut seen = HashSet::new();
    let mut pairs: Vec<(PathBuf, PathBuf)> = expansion
        .mappings
        .into_iter()
        .rev()
        .filter(|(_, dest)| seen.insert(dest.clone()))
        .collect();
    pairs.reverse();

    debug!(
        "Expanded files directive under {}: {} mapping(s)",
        source_root.display(),
        pairs.len()
    );
    Ok(FileMapping { pairs })
}

fn expand_entries(entries: &[FileEntry], root: &Path, prefix: &Path) -> Result<Expansion> {
    let mut expansion = Expansion::default();
    let mut queue: VecDeque<FileEntry> = entries.iter().cloned().collect();

    while let Some(entry) = queue.pop_front() {
        match entry {
            FileEntry::Defaults => {
                for default in default_entries().into_iter().rev() {
                    queue.push_front(default);
                }
            }
            FileEntry::Pattern(pattern) => {
                for source in glob_under(root, &pattern)? {
                    if let Some(name) = source.file_name() {
                        let dest = prefix.join(name);
                        expansion.add(source, dest);
                    }
                }
            }
            FileEntry::Rename { from, to } => {
                let source = root.join(contained(&from)?);
                let to = contained(&to)?;
                if source.exists() {
                    expansion.add(source, prefix.join(to));
                } else {
                    debug!("Skipping rename of missing file {}", source.display());
                }
            }
            FileEntry::Prefixed {
                prefix: sub,
                entries,
            } => {
                let inner = expand_entries(&entries, root, &prefix.join(contained(&sub)?))?;
                expansion
                    .mappings
                    .retain(|(s, _)| !inner.exclusions.contains(s));
                for (source, dest) in inner.mappings {
                    expansion.add(source, dest);
                }
                expansion.exclusions.extend(inner.exclusions);
            }
            FileEntry::Exclude(entries) => {
                let inner = expand_entries(&entries, root, prefix)?;
                for (excluded, _) in inner.mappings {
                    expansion.mappings.retain(|(s, _)| s != &excluded);
                    expansion.exclusions.push(excluded);
                }
            }
        }
    }

    Ok(expansion)
}

/// A directive path as a relative path that cannot leave its root
fn contained(path: &str) -> Result<&Path> {
    let relative = Path::new(path);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if path.is_empty() || escapes {
        return Err(Error::InvalidFilesDirective(format!(
            "path '{}' must stay inside the checkout",
            path
        )));
    }
    Ok(relative)
}

/// Matches of a wildcard pattern relative to `root`, sorted
fn glob_under(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    contained(pattern)?;
    let root_str = root.to_str().ok_or_else(|| {
        Error::IoError(format!(
            "checkout path {} is not valid UTF-8",
            root.display()
        ))
    })?;
    let full = format!("{}/{}", glob::Pattern::escape(root_str), pattern);
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    let mut matches = Vec::new();
    for entry in glob::glob_with(&full, options)? {
        match entry {
            Ok(path) => matches.push(path),
            Err(e) => debug!("Skipping unreadable path during glob: {}", e),
        }
    }
    matches.sort();
    Ok(matches)
}

/// Recreate a package's build directory from a mapping
///
/// The previous build output is deleted first; each destination becomes a
/// symlink to its source in the checkout.
pub fn materialize(mapping: &FileMapping, build_dir: &Path) -> Result<()> {
    if build_dir.exists() {
        fs::remove_dir_all(build_dir).map_err(|e| {
            Error::IoError(format!(
                "Failed to remove old build at {}: {}",
                build_dir.display(),
                e
            ))
        })?;
    }
    fs::create_dir_all(build_dir)?;

    for (source, dest) in mapping.rooted_at(build_dir) {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        link(&source, &dest).map_err(|e| {
            Error::IoError(format!(
                "Failed to link {} -> {}: {}",
                dest.display(),
                source.display(),
                e
            ))
        })?;
    }

    Ok(())
}

#[cfg(unix)]
fn link(source: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, dest)
}

#[cfg(windows)]
fn link(source: &Path, dest: &Path) -> std::io::Result<()> {
    if source.is_dir() {
        std::os::windows::fs::symlink_dir(source, dest)
    } else {
        std::os::windows::fs::symlink_file(source, dest)
    }
}
