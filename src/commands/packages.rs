// src/commands/packages.rs
//! Package commands: use, rebuild, check, prune

use super::{Context, finish_report, open_session};
use anyhow::{Context as _, Result};
use tendril::{Decision, RecipeSpec, UseOptions, UseOutcome};
use tracing::info;

/// Use the named packages, or every configured package
pub fn cmd_use(ctx: &Context, packages: &[String], lazy: bool, no_build: bool) -> Result<()> {
    let (mut session, _lock) = open_session(ctx, "use")?;

    let mut options = if lazy { UseOptions::lazy() } else { UseOptions::default() };
    if no_build {
        options.build = Decision::Never;
    }

    let report = if packages.is_empty() {
        info!("Using all configured packages");
        let specs = session.config().packages.clone();
        session.use_packages(&specs, &options)?
    } else {
        let specs: Vec<RecipeSpec> = packages.iter().map(|p| RecipeSpec::Name(p.clone())).collect();
        session.use_packages(&specs, &options.required())?
    };

    if !ctx.quiet {
        for path in session.load_path() {
            println!("{}", path.display());
        }
    }
    finish_report(&session, &report, "use")
}

/// Rebuild one package, or all configured packages
pub fn cmd_rebuild(ctx: &Context, package: Option<&str>, all: bool) -> Result<()> {
    let (mut session, _lock) = open_session(ctx, "rebuild")?;

    if all {
        let report = session.rebuild_all()?;
        return finish_report(&session, &report, "rebuild");
    }

    let Some(package) = package else {
        anyhow::bail!("Specify a package or --all");
    };
    let outcome = session
        .rebuild_package(package)
        .with_context(|| format!("Failed to rebuild {}", package))?;

    let message = match outcome {
        UseOutcome::Activated { built: true } => format!("Rebuilt {}", package),
        UseOutcome::NotCheckedOut => format!("{} is not checked out", package),
        UseOutcome::NotInstalled => format!("{} is provided by the host", package),
        other => format!("{}: {:?}", package, other),
    };
    session.reporter().finish(&message);
    Ok(())
}

/// Report stale packages
pub fn cmd_check(ctx: &Context, package: Option<&str>, all: bool) -> Result<()> {
    let (mut session, _lock) = open_session(ctx, "check")?;

    let stale = if all {
        session.check_all()?
    } else {
        let Some(package) = package else {
            anyhow::bail!("Specify a package or --all");
        };
        session
            .check_package(package)
            .with_context(|| format!("Failed to check {}", package))?
            .map(|reason| vec![(package.to_string(), reason)])
            .unwrap_or_default()
    };

    session.reporter().finish("check complete");
    if stale.is_empty() {
        println!("All builds are up to date");
    } else {
        for (package, reason) in &stale {
            println!("{}: {}", package, reason);
        }
    }
    Ok(())
}

/// Drop cache entries and builds of packages no longer configured
pub fn cmd_prune(ctx: &Context) -> Result<()> {
    let (mut session, _lock) = open_session(ctx, "prune")?;

    let pruned = session.prune_build_cache().context("Failed to prune build cache")?;
    session
        .reporter()
        .finish(&format!("Pruned {} package(s)", pruned.len()));
    for package in &pruned {
        println!("{}", package);
    }
    Ok(())
}
