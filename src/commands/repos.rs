// src/commands/repos.rs
//! Repository commands: normalize, pull, push

use super::{Context, finish_report, open_session};
use anyhow::{Context as _, Result, bail};

pub fn cmd_normalize(ctx: &Context, package: Option<&str>, all: bool) -> Result<()> {
    let (mut session, _lock) = open_session(ctx, "normalize")?;

    if all {
        let report = session.normalize_all()?;
        return finish_report(&session, &report, "normalize");
    }
    let Some(package) = package else {
        bail!("Specify a package or --all");
    };

    let changed = session
        .normalize_package(package)
        .with_context(|| format!("Failed to normalize {}", package))?;
    let message = if changed {
        format!("Updated checkout of {}", package)
    } else {
        format!("Checkout of {} already matches its recipe", package)
    };
    session.reporter().finish(&message);
    Ok(())
}

pub fn cmd_pull(ctx: &Context, package: Option<&str>, all: bool, upstream: bool) -> Result<()> {
    let (mut session, _lock) = open_session(ctx, "pull")?;

    if all {
        let report = session.pull_all(upstream)?;
        return finish_report(&session, &report, "pull");
    }
    let Some(package) = package else {
        bail!("Specify a package or --all");
    };

    session
        .pull_package(package, upstream)
        .with_context(|| format!("Failed to pull {}", package))?;
    session.reporter().finish(&format!("Pulled {}", package));
    Ok(())
}

pub fn cmd_push(ctx: &Context, package: Option<&str>, all: bool) -> Result<()> {
    let (mut session, _lock) = open_session(ctx, "push")?;

    if all {
        let report = session.push_all()?;
        return finish_report(&session, &report, "push");
    }
    let Some(package) = package else {
        bail!("Specify a package or --all");
    };

    session
        .push_package(package)
        .with_context(|| format!("Failed to push {}", package))?;
    session.reporter().finish(&format!("Pushed {}", package));
    Ok(())
}
