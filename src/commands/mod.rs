// src/commands/mod.rs
//! Command handlers for the tendril CLI

mod packages;
pub mod progress;
mod repos;
mod system;
mod versions;

pub use packages::{cmd_check, cmd_prune, cmd_rebuild, cmd_use};
pub use repos::{cmd_normalize, cmd_pull, cmd_push};
pub use system::cmd_completions;
pub use versions::{cmd_freeze, cmd_thaw};

use anyhow::{Context as _, Result, bail};
use progress::SpinnerStatus;
use std::path::PathBuf;
use std::sync::Arc;
use tendril::{BatchReport, Config, Session, SessionLock, SilentStatus, StatusReporter};
use tracing::debug;

/// Options shared by every command
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub config_path: Option<PathBuf>,
    pub profile: Option<String>,
    pub quiet: bool,
}

/// Load the config, lock the state directory and register the configured
/// packages
///
/// The lock is released when the returned guard is dropped.
pub(crate) fn open_session(ctx: &Context, operation: &str) -> Result<(Session, SessionLock)> {
    let mut config = Config::load_or_default(ctx.config_path.as_deref())
        .context("Failed to load configuration")?;
    if let Some(profile) = &ctx.profile {
        config.profile = profile.clone();
    }
    debug!("Using base directory {}", config.base_dir.display());

    let lock_path = config.lock_path();
    let lock = match SessionLock::try_acquire(&lock_path)? {
        Some(lock) => lock,
        None => {
            if !ctx.quiet {
                println!("Waiting for another tendril process to finish...");
            }
            SessionLock::acquire(&lock_path)
                .with_context(|| format!("Failed to lock {}", lock_path.display()))?
        }
    };

    debug!("Holding state lock {}", lock.path().display());

    let reporter: Arc<dyn StatusReporter> = if ctx.quiet {
        Arc::new(SilentStatus::new())
    } else {
        Arc::new(SpinnerStatus::new(operation))
    };

    let mut session = Session::new(config).with_reporter(reporter);
    session
        .register_configured()
        .context("Failed to register configured packages")?;
    Ok((session, lock))
}

/// Print a batch report and fail when any item failed
pub(crate) fn finish_report(session: &Session, report: &BatchReport, what: &str) -> Result<()> {
    let summary = format!(
        "{}: {} ok, {} failed",
        what,
        report.succeeded.len(),
        report.failed.len()
    );
    session.reporter().finish(&summary);

    if report.is_success() {
        return Ok(());
    }
    for (name, error) in &report.failed {
        eprintln!("  {}: {}", name, error);
    }
    bail!("{} failed for {} item(s)", what, report.failed.len());
}
