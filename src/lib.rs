// src/lib.rs

//! Tendril Package Manager Core
//!
//! Source-based package management: recipes describe where a package's
//! sources live and which files make up its build. Tendril resolves each
//! package and its dependencies, keeps a checkout of every repository,
//! rebuilds only what is stale, and activates the results in dependency order.
//!
//! # Architecture
//!
//! - Session-scoped state: registry, build cache and scan results live on one
//!   [`Session`] value, never in globals
//! - Transactions: recursive operations share one cache load/save and one
//!   modification scan per top-level call
//! - Backends: version control and the host runtime sit behind traits
//! - Files directives: a small DSL maps checkout files into the build area

pub mod cache;
pub mod config;
mod error;
pub mod files;
pub mod host;
pub mod lock;
pub mod lockfile;
mod operations;
mod pipeline;
pub mod progress;
pub mod recipe;
pub mod session;
pub mod transaction;
pub mod vc;

pub use cache::{BuildCache, BuildCacheEntry, ModificationCheck, StaleReason, UncoveredRepoPolicy};
pub use config::{Config, HostConfig};
pub use error::{Error, Result};
pub use files::{FileEntry, FileMapping, FilesDirective};
pub use host::{Host, ProcessHost};
pub use lock::SessionLock;
pub use lockfile::Lockfile;
pub use operations::BatchReport;
pub use pipeline::{Decision, UseOptions, UseOutcome};
pub use progress::{CallbackStatus, LogStatus, SilentStatus, StatusEvent, StatusReporter};
pub use recipe::{
    ConflictWarning, Normalized, Recipe, RecipeInput, RecipeSource, RecipeSpec, Registry,
};
pub use session::{PackageEvent, PackageState, Session};
pub use transaction::{Transaction, Transactional};
pub use vc::{BackendRegistry, GitBackend, VcBackend};
