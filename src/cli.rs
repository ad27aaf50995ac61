// src/cli.rs
//! CLI definitions for tendril
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tendril")]
#[command(author = "Tendril Contributors")]
#[command(version)]
#[command(about = "Source-based package manager: resolve, check out, build and activate packages", long_about = None)]
pub struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Profile to register packages under (and to freeze or thaw)
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check out, build and activate packages (all configured packages when
    /// none are named)
    Use {
        /// Package names
        packages: Vec<String>,

        /// Do not clone missing repositories
        #[arg(long)]
        lazy: bool,

        /// Do not build; activate existing builds only
        #[arg(long)]
        no_build: bool,
    },

    /// Rebuild a package even if its build is current
    Rebuild {
        /// Package name
        #[arg(required_unless_present = "all")]
        package: Option<String>,

        /// Rebuild every configured package
        #[arg(long, conflicts_with = "package")]
        all: bool,
    },

    /// Report whether packages need rebuilding
    Check {
        /// Package name
        #[arg(required_unless_present = "all")]
        package: Option<String>,

        /// Check every configured package
        #[arg(long, conflicts_with = "package")]
        all: bool,
    },

    /// Make checkouts match their recipes (remote URL, branch)
    Normalize {
        /// Package whose repository to normalize
        #[arg(required_unless_present = "all")]
        package: Option<String>,

        /// Normalize every configured repository
        #[arg(long, conflicts_with = "package")]
        all: bool,
    },

    /// Pull new commits into checkouts
    Pull {
        /// Package whose repository to pull
        #[arg(required_unless_present = "all")]
        package: Option<String>,

        /// Pull every configured repository
        #[arg(long, conflicts_with = "package")]
        all: bool,

        /// Pull from the upstream remote instead of the primary one
        #[arg(long)]
        upstream: bool,
    },

    /// Push local commits of checkouts
    Push {
        /// Package whose repository to push
        #[arg(required_unless_present = "all")]
        package: Option<String>,

        /// Push every configured repository
        #[arg(long, conflicts_with = "package")]
        all: bool,
    },

    /// Write the profile's lockfile from the current checkouts
    Freeze,

    /// Check out the commits pinned in the profile's lockfile
    Thaw,

    /// Remove build cache entries of packages no longer configured
    Prune,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
