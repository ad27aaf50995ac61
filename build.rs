// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: package name, optional when `--all` is given
fn package_arg(help: &'static str) -> Arg {
    Arg::new("package").help(help)
}

/// Common argument: operate on every configured package
fn all_arg(help: &'static str) -> Arg {
    Arg::new("all").long("all").action(ArgAction::SetTrue).help(help)
}

fn build_cli() -> Command {
    Command::new("tendril")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Tendril Contributors")
        .about("Source-based package manager: resolve, check out, build and activate packages")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Path to the config file"),
        )
        .arg(
            Arg::new("profile")
                .short('p')
                .long("profile")
                .global(true)
                .help("Profile to register packages under (and to freeze or thaw)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Show debug logging"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Only print errors"),
        )
        .subcommand(
            Command::new("use")
                .about("Check out, build and activate packages")
                .arg(Arg::new("packages").num_args(0..).help("Package names (all configured when omitted)"))
                .arg(
                    Arg::new("lazy")
                        .long("lazy")
                        .action(ArgAction::SetTrue)
                        .help("Do not clone missing repositories"),
                )
                .arg(
                    Arg::new("no_build")
                        .long("no-build")
                        .action(ArgAction::SetTrue)
                        .help("Do not build; activate existing builds only"),
                ),
        )
        .subcommand(
            Command::new("rebuild")
                .about("Rebuild a package even if its build is current")
                .arg(package_arg("Package name"))
                .arg(all_arg("Rebuild every configured package")),
        )
        .subcommand(
            Command::new("check")
                .about("Report whether packages need rebuilding")
                .arg(package_arg("Package name"))
                .arg(all_arg("Check every configured package")),
        )
        .subcommand(
            Command::new("normalize")
                .about("Make checkouts match their recipes")
                .arg(package_arg("Package whose repository to normalize"))
                .arg(all_arg("Normalize every configured repository")),
        )
        .subcommand(
            Command::new("pull")
                .about("Pull new commits into checkouts")
                .arg(package_arg("Package whose repository to pull"))
                .arg(all_arg("Pull every configured repository"))
                .arg(
                    Arg::new("upstream")
                        .long("upstream")
                        .action(ArgAction::SetTrue)
                        .help("Pull from the upstream remote instead of the primary one"),
                ),
        )
        .subcommand(
            Command::new("push")
                .about("Push local commits of checkouts")
                .arg(package_arg("Package whose repository to push"))
                .arg(all_arg("Push every configured repository")),
        )
        .subcommand(Command::new("freeze").about("Write the profile's lockfile from the current checkouts"))
        .subcommand(Command::new("thaw").about("Check out the commits pinned in the profile's lockfile"))
        .subcommand(Command::new("prune").about("Remove build cache entries of packages no longer configured"))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("tendril.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
