//! Implementation of the `metayaml check` command.

use anyhow::{bail, Context, Result};
use metayaml_recipe::{find_recipes, Linter, Platform, RecipeLayout, RECIPE_FILE};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::settings::{load_config, locate_recipe};

/// Options for checking recipes.
#[derive(Debug, Default)]
pub struct CheckOptions {
    /// Recipe files or directories. Empty means the recipe above the current directory.
    pub paths: Vec<PathBuf>,
    /// Platforms to check, replacing the configured list when non-empty.
    pub platforms: Vec<Platform>,
    /// Fail on warnings as well as errors.
    pub deny_warnings: bool,
    /// Explicit config file.
    pub config: Option<PathBuf>,
}

/// Outcome of a check run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub checked: usize,
    pub failed: usize,
}

/// Check recipes and fail if any of them has problems.
pub fn check(options: &CheckOptions) -> Result<()> {
    let summary = check_recipes(options)?;
    if summary.failed > 0 {
        bail!(
            "{} of {} recipe(s) failed checks",
            summary.failed,
            summary.checked
        );
    }
    println!("{} recipe(s) passed", summary.checked);
    Ok(())
}

/// Expand the path arguments into recipe files.
fn recipe_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if paths.is_empty() {
        return Ok(vec![locate_recipe(None)?.recipe_path]);
    }

    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let found = find_recipes(path)
                .with_context(|| format!("Failed to search {}", path.display()))?;
            if found.is_empty() {
                bail!("No {RECIPE_FILE} found under {}", path.display());
            }
            files.extend(found);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("Path `{}` does not exist", path.display());
        }
    }
    Ok(files)
}

/// Lint every recipe and print its diagnostics.
pub fn check_recipes(options: &CheckOptions) -> Result<CheckSummary> {
    let mut summary = CheckSummary::default();

    for file in recipe_files(&options.paths)? {
        let layout = recipe_dir(&file).and_then(|dir| RecipeLayout::discover(dir).ok());
        let mut config = load_config(options.config.as_deref(), layout.as_ref())?;
        if !options.platforms.is_empty() {
            config.platforms = options.platforms.iter().map(ToString::to_string).collect();
        }
        let deny_warnings = options.deny_warnings || config.deny_warnings;

        let linter = Linter::new(config).context("Invalid lint configuration")?;
        let report = linter
            .lint_path(&file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        info!(path = %file.display(), diagnostics = report.diagnostics.len(), "checked recipe");

        for diagnostic in &report.diagnostics {
            println!("{}: {diagnostic}", file.display());
        }

        summary.checked += 1;
        if !report.passes(deny_warnings) {
            summary.failed += 1;
        }
    }

    Ok(summary)
}

fn recipe_dir(file: &Path) -> Option<&Path> {
    match file.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Some(Path::new(".")),
        other => other,
    }
}
