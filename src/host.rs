// src/host.rs

//! Host runtime integration
//!
//! The host is the program the packages are built for. Tendril never loads
//! or compiles code itself: it asks the host which packages it provides,
//! which dependencies a build declares, and hands it the build directory to
//! compile and activate.

use crate::config::HostConfig;
use crate::error::{Error, Result};
use crate::recipe::Recipe;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::process::{Command, ExitStatus};
use tracing::{debug, info};

/// Operations delegated to the host runtime
pub trait Host {
    /// Whether the host ships this package itself
    fn is_builtin(&self, package: &str) -> bool;

    /// Dependencies declared by the package's files in `build_dir`, in
    /// declaration order
    fn extract_dependencies(&self, recipe: &Recipe, build_dir: &Path) -> Result<Vec<String>>;

    fn generate_autoloads(&self, recipe: &Recipe, build_dir: &Path) -> Result<()>;

    fn compile(&self, recipe: &Recipe, build_dir: &Path) -> Result<()>;

    /// Make a built package available to the running host
    fn activate(&self, recipe: &Recipe, build_dir: &Path) -> Result<()>;
}

/// Host driven through external commands
///
/// Command templates may use `%(package)s` and `%(build_dir)s`. An empty
/// template skips the step.
#[derive(Debug, Clone)]
pub struct ProcessHost {
    builtin: BTreeSet<String>,
    compile: Vec<String>,
    autoloads: Vec<String>,
}

impl ProcessHost {
    pub fn new(config: &HostConfig) -> Self {
        Self {
            builtin: config.builtin.iter().cloned().collect(),
            compile: config.compile.clone(),
            autoloads: config.autoloads.clone(),
        }
    }

    fn run_step(&self, step: &str, template: &[String], recipe: &Recipe, build_dir: &Path) -> Result<()> {
        let Some((program, args)) = template.split_first() else {
            debug!("No {} command configured, skipping for {}", step, recipe.package);
            return Ok(());
        };

        let build_dir_str = build_dir.to_string_lossy();
        let substitute = |s: &str| {
            s.replace("%(package)s", &recipe.package)
                .replace("%(build_dir)s", &build_dir_str)
        };

        let program = substitute(program.as_str());
        let args: Vec<String> = args.iter().map(|a| substitute(a.as_str())).collect();
        info!("Running {} for {}", step, recipe.package);

        let output = Command::new(&program)
            .args(&args)
            .current_dir(build_dir)
            .output()
            .map_err(|e| Error::CommandFailed(format!("Failed to run {}: {}", program, e)))?;

        if interrupted(&output.status) {
            return Err(Error::Aborted(format!(
                "{} of {} interrupted",
                step, recipe.package
            )));
        }
        if !output.status.success() {
            return Err(Error::BuildFailed {
                package: recipe.package.clone(),
                reason: format!(
                    "{} exited with {}: {}",
                    step,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

/// Whether a child process was stopped by an interrupt from the terminal
#[cfg(unix)]
pub(crate) fn interrupted(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal() == Some(2)
}

#[cfg(not(unix))]
pub(crate) fn interrupted(_status: &ExitStatus) -> bool {
    false
}

impl Host for ProcessHost {
    fn is_builtin(&self, package: &str) -> bool {
        self.builtin.contains(package)
    }

    fn extract_dependencies(&self, recipe: &Recipe, build_dir: &Path) -> Result<Vec<String>> {
        let descriptor = build_dir.join(format!("{}-pkg.el", recipe.package));
        if descriptor.is_file() {
            let content = fs::read_to_string(&descriptor)?;
            return Ok(parse_define_package(&content));
        }

        let main = build_dir.join(format!("{}.el", recipe.package));
        if main.is_file() {
            let content = fs::read_to_string(&main)?;
            return Ok(parse_package_requires(&content));
        }

        debug!("{} declares no dependencies", recipe.package);
        Ok(Vec::new())
    }

    fn generate_autoloads(&self, recipe: &Recipe, build_dir: &Path) -> Result<()> {
        self.run_step("autoloads", &self.autoloads, recipe, build_dir)
    }

    fn compile(&self, recipe: &Recipe, build_dir: &Path) -> Result<()> {
        self.run_step("compile", &self.compile, recipe, build_dir)
    }

    fn activate(&self, recipe: &Recipe, build_dir: &Path) -> Result<()> {
        debug!("Activated {} from {}", recipe.package, build_dir.display());
        Ok(())
    }
}

/// Package names from a `Package-Requires:` header
///
/// The header value may continue on following comment lines until its
/// parentheses balance.
pub fn parse_package_requires(content: &str) -> Vec<String> {
    let mut lines = content.lines();
    let mut value = String::new();

    for line in lines.by_ref() {
        let stripped = line.trim_start_matches(';').trim();
        if let Some(rest) = stripped.strip_prefix("Package-Requires:") {
            value.push_str(rest);
            break;
        }
    }
    if value.is_empty() {
        return Vec::new();
    }

    while depth_of(&value) > 0 {
        match lines.next() {
            Some(line) if line.starts_with(";;") => {
                value.push(' ');
                value.push_str(line.trim_start_matches(';').trim());
            }
            _ => break,
        }
    }

    list_heads(&value)
}

/// Package names from the requirements argument of a `define-package` form
pub fn parse_define_package(content: &str) -> Vec<String> {
    match content.find("'(") {
        Some(start) => list_heads(&content[start + 1..]),
        None => Vec::new(),
    }
}

fn depth_of(s: &str) -> i32 {
    s.chars().fold(0, |depth, c| match c {
        '(' => depth + 1,
        ')' => depth - 1,
        _ => depth,
    })
}

/// First symbol of every list nested directly inside the first list of `s`
fn list_heads(s: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut depth = 0;
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '(' => {
                depth += 1;
                if depth == 2 {
                    let mut name = String::new();
                    while let Some(&next) = chars.peek() {
                        if next.is_whitespace() || next == '(' || next == ')' {
                            break;
                        }
                        name.push(next);
                        chars.next();
                    }
                    if !name.is_empty() && !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            _ => {}
        }
    }

    names
}
