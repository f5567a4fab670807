//! Implementation of the `metayaml remove` command.

use anyhow::{bail, Context, Result};
use metayaml_recipe::{remove_requirement, sections_containing, RequirementSection};
use std::fs;
use std::path::{Path, PathBuf};

use crate::settings::locate_recipe;

/// Options for removing a requirement.
#[derive(Debug)]
pub struct RemoveOptions {
    /// Package name to remove.
    pub package: String,
    /// Which list to remove from (None = the only list naming the package).
    pub section: Option<RequirementSection>,
    /// Recipe file or directory (defaults to the recipe above the current directory).
    pub path: Option<PathBuf>,
}

/// Remove a requirement from the recipe selected by the options.
pub fn remove_dependency(options: &RemoveOptions) -> Result<()> {
    let layout = locate_recipe(options.path.as_deref())?;
    remove_dependency_at(&layout.recipe_path, options)
}

/// Remove a requirement from a recipe at a specific path.
pub fn remove_dependency_at(recipe_path: &Path, options: &RemoveOptions) -> Result<()> {
    let text = fs::read_to_string(recipe_path)
        .with_context(|| format!("Failed to read {}", recipe_path.display()))?;
    let name = &options.package;

    let section = match options.section {
        Some(section) => section,
        None => {
            let sections = sections_containing(&text, name);
            match sections.as_slice() {
                [] => bail!("Dependency `{name}` not found in any section"),
                [section] => *section,
                _ => {
                    let names: Vec<_> = sections.iter().map(RequirementSection::yaml_path).collect();
                    bail!(
                        "Dependency `{name}` found in multiple sections: {}. Use --build, --host or --run to specify which to remove.",
                        names.join(", ")
                    );
                }
            }
        }
    };

    let updated = remove_requirement(&text, section, name)?;
    fs::write(recipe_path, updated)
        .with_context(|| format!("Failed to write {}", recipe_path.display()))?;

    println!("Removed `{name}` from {section}");
    Ok(())
}
