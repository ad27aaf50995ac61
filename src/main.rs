// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use commands::Context;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context {
        config_path: cli.config,
        profile: cli.profile,
        quiet: cli.quiet,
    };

    match cli.command {
        Some(Commands::Use {
            packages,
            lazy,
            no_build,
        }) => commands::cmd_use(&ctx, &packages, lazy, no_build),
        Some(Commands::Rebuild { package, all }) => {
            commands::cmd_rebuild(&ctx, package.as_deref(), all)
        }
        Some(Commands::Check { package, all }) => commands::cmd_check(&ctx, package.as_deref(), all),
        Some(Commands::Normalize { package, all }) => {
            commands::cmd_normalize(&ctx, package.as_deref(), all)
        }
        Some(Commands::Pull {
            package,
            all,
            upstream,
        }) => commands::cmd_pull(&ctx, package.as_deref(), all, upstream),
        Some(Commands::Push { package, all }) => commands::cmd_push(&ctx, package.as_deref(), all),
        Some(Commands::Freeze) => commands::cmd_freeze(&ctx),
        Some(Commands::Thaw) => commands::cmd_thaw(&ctx),
        Some(Commands::Prune) => commands::cmd_prune(&ctx),
        Some(Commands::Completions { shell }) => commands::cmd_completions(shell),
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}
