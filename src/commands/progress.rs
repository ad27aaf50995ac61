// src/commands/progress.rs
//! Terminal status display
//!
//! Transient status messages go to a spinner line that is replaced by the
//! next message; warnings are printed above it and stay visible.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tendril::StatusReporter;

/// Spinner-backed status reporter for interactive use
pub struct SpinnerStatus {
    bar: ProgressBar,
    warnings: AtomicU64,
}

impl SpinnerStatus {
    /// Create a spinner prefixed with the command name
    pub fn new(operation: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} {prefix}: {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);
        bar.set_prefix(operation.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            bar,
            warnings: AtomicU64::new(0),
        }
    }
}

impl StatusReporter for SpinnerStatus {
    fn status(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn warning(&self, message: &str) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
        self.bar.println(format!("warning: {}", message));
    }

    fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    fn warning_count(&self) -> u64 {
        self.warnings.load(Ordering::Relaxed)
    }
}

impl Drop for SpinnerStatus {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
