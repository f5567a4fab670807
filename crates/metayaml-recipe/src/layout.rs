//! Recipe directory discovery.
//!
//! Discovers the conventional layout of a conda recipe:
//! ```text
//! my-project/
//! ├── recipe/
//! │   ├── meta.yaml                 # Recipe manifest
//! │   ├── build.sh                  # Unix build script (optional)
//! │   ├── bld.bat                   # Windows build script (optional)
//! │   └── conda_build_config.yaml   # Variant config (optional)
//! └── metayaml.toml                 # Lint config (optional)
//! ```

use crate::config::CONFIG_FILE;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The recipe manifest filename.
pub const RECIPE_FILE: &str = "meta.yaml";

/// Conventional recipe directory inside a project.
pub const RECIPE_DIR: &str = "recipe";

/// Unix build script.
pub const BUILD_SCRIPT: &str = "build.sh";

/// Windows build script.
pub const BUILD_SCRIPT_WINDOWS: &str = "bld.bat";

/// Variant configuration file.
pub const VARIANT_CONFIG: &str = "conda_build_config.yaml";

/// Errors that can occur when locating a recipe.
#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("recipe directory not found: {0}")]
    NotFound(PathBuf),

    #[error("no meta.yaml found at or above: {0}")]
    RecipeNotFound(PathBuf),

    #[error("invalid search pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("failed to search for recipes: {0}")]
    Glob(#[from] glob::GlobError),
}

/// Discovered layout of a recipe directory.
#[derive(Debug, Clone)]
pub struct RecipeLayout {
    /// Directory containing `meta.yaml`.
    pub root: PathBuf,

    /// Path to `meta.yaml`.
    pub recipe_path: PathBuf,

    /// Path to `build.sh` (if exists).
    pub build_script: Option<PathBuf>,

    /// Path to `bld.bat` (if exists).
    pub build_script_windows: Option<PathBuf>,

    /// Path to `conda_build_config.yaml` (if exists).
    pub variant_config: Option<PathBuf>,
}

impl RecipeLayout {
    /// Discover the layout of a recipe directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory doesn't exist or has no `meta.yaml`.
    pub fn discover(root: impl AsRef<Path>) -> Result<Self, LayoutError> {
        let root = root.as_ref().to_path_buf();

        if !root.is_dir() {
            return Err(LayoutError::NotFound(root));
        }

        let recipe_path = root.join(RECIPE_FILE);
        if !recipe_path.is_file() {
            return Err(LayoutError::RecipeNotFound(root));
        }

        let build_script = root.join(BUILD_SCRIPT);
        let build_script_windows = root.join(BUILD_SCRIPT_WINDOWS);
        let variant_config = root.join(VARIANT_CONFIG);

        Ok(Self {
            recipe_path,
            build_script: build_script.exists().then_some(build_script),
            build_script_windows: build_script_windows
                .exists()
                .then_some(build_script_windows),
            variant_config: variant_config.exists().then_some(variant_config),
            root,
        })
    }

    /// Find a recipe by searching upward from a directory.
    ///
    /// At each level both `meta.yaml` and `recipe/meta.yaml` are checked.
    ///
    /// # Errors
    ///
    /// Returns an error if no recipe is found in the directory tree.
    pub fn find_root(start: impl AsRef<Path>) -> Result<Self, LayoutError> {
        let mut current = start.as_ref().to_path_buf();

        loop {
            if current.join(RECIPE_FILE).is_file() {
                return Self::discover(&current);
            }
            let nested = current.join(RECIPE_DIR);
            if nested.join(RECIPE_FILE).is_file() {
                return Self::discover(&nested);
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Err(LayoutError::RecipeNotFound(start.as_ref().to_path_buf())),
            }
        }
    }

    /// Nearest lint config at or above the recipe directory.
    #[must_use]
    pub fn config_path(&self) -> Option<PathBuf> {
        self.root
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE))
            .find(|path| path.is_file())
    }

    /// Returns true if the recipe ships a build script for any platform.
    #[must_use]
    pub fn has_build_script(&self) -> bool {
        self.build_script.is_some() || self.build_script_windows.is_some()
    }
}

/// Find every `meta.yaml` below a directory, sorted by path.
///
/// # Errors
///
/// Returns an error if the directory path cannot form a glob pattern or a
/// directory cannot be read.
pub fn find_recipes(root: impl AsRef<Path>) -> Result<Vec<PathBuf>, LayoutError> {
    let escaped = glob::Pattern::escape(&root.as_ref().to_string_lossy());
    let pattern = format!("{escaped}/**/{RECIPE_FILE}");

    let mut recipes = glob::glob(&pattern)?.collect::<Result<Vec<_>, _>>()?;
    recipes.sort();
    Ok(recipes)
}
