//! Implementation of the `metayaml add` command.

use anyhow::{Context, Result};
use metayaml_recipe::{add_requirement, DependencySpec, RequirementSection};
use std::fs;
use std::path::{Path, PathBuf};

use crate::settings::locate_recipe;

/// Options for adding a requirement.
#[derive(Debug)]
pub struct AddOptions {
    /// Dependency spec, e.g. `psi4::psi4` or `numpy=1.15.4`.
    pub spec: String,
    /// Which requirements list to add to.
    pub section: RequirementSection,
    /// Recipe file or directory (defaults to the recipe above the current directory).
    pub path: Option<PathBuf>,
}

/// Add a requirement to the recipe selected by the options.
pub fn add_dependency(options: &AddOptions) -> Result<()> {
    let layout = locate_recipe(options.path.as_deref())?;
    add_dependency_at(&layout.recipe_path, options)
}

/// Add a requirement to a recipe at a specific path.
pub fn add_dependency_at(recipe_path: &Path, options: &AddOptions) -> Result<()> {
    let spec: DependencySpec = options
        .spec
        .parse()
        .with_context(|| format!("Invalid dependency spec `{}`", options.spec))?;

    let text = fs::read_to_string(recipe_path)
        .with_context(|| format!("Failed to read {}", recipe_path.display()))?;
    let updated = add_requirement(&text, options.section, &spec)?;
    fs::write(recipe_path, updated)
        .with_context(|| format!("Failed to write {}", recipe_path.display()))?;

    println!("Added `{spec}` to {}", options.section);
    Ok(())
}
