// src/error.rs

//! Error types shared across the library

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by recipe handling, the build pipeline and its collaborators
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O failure with extra context
    #[error("I/O error: {0}")]
    IoError(String),

    /// Malformed configuration, lockfile or cache content
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A recipe form that cannot be normalized
    #[error("Invalid recipe: {0}")]
    InvalidRecipe(String),

    /// A files directive entry that is not one of the supported forms
    #[error("Invalid files directive: {0}")]
    InvalidFilesDirective(String),

    /// Package or repository is unknown to the session
    #[error("Not found: {0}")]
    NotFound(String),

    /// No VC backend registered under this name
    #[error("Unknown VC backend '{0}'")]
    UnknownBackend(String),

    /// A VC backend operation reported failure
    #[error("{backend} failed for {repo}: {reason}")]
    VcError {
        backend: String,
        repo: String,
        reason: String,
    },

    /// An external command exited unsuccessfully or could not be started
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// A build pipeline step failed
    #[error("Build of {package} failed: {reason}")]
    BuildFailed { package: String, reason: String },

    /// A dependency failed, failing its dependent with it
    #[error("{package}: dependency {dependency} failed: {source}")]
    DependencyFailed {
        package: String,
        dependency: String,
        #[source]
        source: Box<Error>,
    },

    /// Operator aborted the current operation
    #[error("Aborted: {0}")]
    Aborted(String),

    /// State directory lock could not be taken
    #[error("Lock error: {0}")]
    LockError(String),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization failure
    #[error("TOML error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization failure
    #[error("TOML error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Malformed wildcard pattern
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}
