//! Recipe location and configuration lookup shared by the commands.

use anyhow::{Context, Result};
use metayaml_recipe::{LintConfig, RecipeLayout, RECIPE_FILE};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Locate a recipe from an optional path argument.
///
/// A `meta.yaml` file is used directly, a directory is searched upward, and
/// no argument searches upward from the current directory.
pub fn locate_recipe(path: Option<&Path>) -> Result<RecipeLayout> {
    let start = match path {
        Some(p) => p.to_path_buf(),
        None => env::current_dir().context("Failed to get current directory")?,
    };

    if start.is_file() {
        let dir = match start.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if start.file_name().is_some_and(|n| n == RECIPE_FILE) {
            return RecipeLayout::discover(&dir)
                .with_context(|| format!("Failed to read recipe at {}", start.display()));
        }
        anyhow::bail!("`{}` is not a {RECIPE_FILE} file", start.display());
    }

    RecipeLayout::find_root(&start).with_context(|| {
        format!(
            "No {RECIPE_FILE} found in {} or its parents. Run `metayaml init` first.",
            start.display()
        )
    })
}

/// The user-level config file, if present.
fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("metayaml").join("config.toml"))
        .filter(|p| p.is_file())
}

/// Load the configuration for a recipe.
///
/// An explicit file wins, then `metayaml.toml` at or above the recipe, then
/// the user config, then defaults.
pub fn load_config(explicit: Option<&Path>, layout: Option<&RecipeLayout>) -> Result<LintConfig> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| layout.and_then(RecipeLayout::config_path))
        .or_else(user_config_path);

    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            LintConfig::from_path(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => Ok(LintConfig::default()),
    }
}
