// src/commands/versions.rs
//! Lockfile commands: freeze, thaw

use super::{Context, finish_report, open_session};
use anyhow::{Context as _, Result};

/// Pin every checkout of the profile to its current commit
pub fn cmd_freeze(ctx: &Context) -> Result<()> {
    let (mut session, _lock) = open_session(ctx, "freeze")?;
    let profile = session.config().profile.clone();

    let path = session
        .freeze(&profile)
        .with_context(|| format!("Failed to freeze profile {}", profile))?;
    session
        .reporter()
        .finish(&format!("Wrote {}", path.display()));
    Ok(())
}

/// Check out the commits pinned for the profile
pub fn cmd_thaw(ctx: &Context) -> Result<()> {
    let (mut session, _lock) = open_session(ctx, "thaw")?;
    let profile = session.config().profile.clone();

    let report = session
        .thaw(&profile)
        .with_context(|| format!("Failed to thaw profile {}", profile))?;
    finish_report(&session, &report, "thaw")
}
