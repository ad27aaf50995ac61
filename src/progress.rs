// src/progress.rs

//! Transient status reporting
//!
//! Checkouts, builds and conflict warnings are reported as short status
//! messages rather than persistent output. The `StatusReporter` trait lets the
//! same pipeline drive different front ends:
//! - `LogStatus`: forwards to tracing
//! - `SilentStatus`: no-op for scripted/quiet modes
//! - `CallbackStatus`: hands every event to a closure (tests, embedding)
//!
//! # Example
//!
//! ```ignore
//! use tendril::progress::{LogStatus, StatusReporter};
//!
//! let status = LogStatus::new("use");
//! status.status("Cloning magit...");
//! status.finish("3 packages activated");
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// Events emitted by callback status reporters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Progress message (cloning, building, ...)
    Status(String),
    /// Non-fatal problem the operator should see
    Warning(String),
    /// Operation finished
    Finished(String),
}

/// Core trait for status reporting
///
/// Implementations must be thread-safe so a reporter can be shared with
/// collaborators that run on helper threads.
pub trait StatusReporter: Send + Sync {
    /// Report a transient progress message
    fn status(&self, message: &str);

    /// Report a non-fatal warning
    fn warning(&self, message: &str);

    /// Report completion of the current operation
    fn finish(&self, message: &str);

    /// Number of warnings reported so far
    fn warning_count(&self) -> u64;
}

/// Silent status reporter (no-op)
#[derive(Debug, Default)]
pub struct SilentStatus {
    warnings: AtomicU64,
}

impl SilentStatus {
    /// Create a new silent reporter
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusReporter for SilentStatus {
    fn status(&self, _message: &str) {}

    fn warning(&self, _message: &str) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self, _message: &str) {}

    fn warning_count(&self) -> u64 {
        self.warnings.load(Ordering::Relaxed)
    }
}

/// Logging status reporter
///
/// Status and completion go to tracing at info level, warnings at warn level.
#[derive(Debug)]
pub struct LogStatus {
    name: String,
    warnings: AtomicU64,
}

impl LogStatus {
    /// Create a reporter whose messages are prefixed with `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            warnings: AtomicU64::new(0),
        }
    }
}

impl StatusReporter for LogStatus {
    fn status(&self, message: &str) {
        info!("{}: {}", self.name, message);
    }

    fn warning(&self, message: &str) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
        warn!("{}: {}", self.name, message);
    }

    fn finish(&self, message: &str) {
        info!("{}: {}", self.name, message);
    }

    fn warning_count(&self) -> u64 {
        self.warnings.load(Ordering::Relaxed)
    }
}

/// Callback-based status reporter
///
/// Calls a user-provided function for every event.
pub struct CallbackStatus<F>
where
    F: Fn(StatusEvent) + Send + Sync,
{
    callback: F,
    warnings: AtomicU64,
}

impl<F> CallbackStatus<F>
where
    F: Fn(StatusEvent) + Send + Sync,
{
    /// Create a new callback reporter
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            warnings: AtomicU64::new(0),
        }
    }
}

impl<F> StatusReporter for CallbackStatus<F>
where
    F: Fn(StatusEvent) + Send + Sync,
{
    fn status(&self, message: &str) {
        (self.callback)(StatusEvent::Status(message.to_string()));
    }

    fn warning(&self, message: &str) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
        (self.callback)(StatusEvent::Warning(message.to_string()));
    }

    fn finish(&self, message: &str) {
        (self.callback)(StatusEvent::Finished(message.to_string()));
    }

    fn warning_count(&self) -> u64 {
        self.warnings.load(Ordering::Relaxed)
    }
}
