//! Implementation of the `metayaml deps` command.

use anyhow::{Context, Result};
use metayaml_recipe::{DependencySpec, Platform, Recipe, RequirementSection};
use serde::Serialize;
use std::path::PathBuf;

use crate::settings::{load_config, locate_recipe};

/// Options for listing dependencies.
#[derive(Debug, Default)]
pub struct DepsOptions {
    /// Recipe file or directory.
    pub path: Option<PathBuf>,
    /// Platform to render for (defaults to the host).
    pub platform: Option<Platform>,
    /// Only list one section.
    pub section: Option<RequirementSection>,
    /// Print JSON instead of a table.
    pub json: bool,
}

/// One requirement entry as printed.
#[derive(Debug, Serialize)]
pub struct DependencyRow {
    pub section: RequirementSection,
    #[serde(flatten)]
    pub spec: DependencySpec,
}

/// Print the dependencies of a recipe.
pub fn list_dependencies(options: &DepsOptions) -> Result<()> {
    let rows = dependency_rows(options)?;

    if options.json {
        let json = serde_json::to_string_pretty(&rows).context("Failed to serialize dependencies")?;
        println!("{json}");
    } else {
        for row in &rows {
            println!("{:<18} {}", row.section.yaml_path(), row.spec);
        }
    }

    Ok(())
}

/// Parse the recipe for one platform and collect its requirement entries.
pub fn dependency_rows(options: &DepsOptions) -> Result<Vec<DependencyRow>> {
    let layout = locate_recipe(options.path.as_deref())?;
    let config = load_config(None, Some(&layout))?;
    let platform = options.platform.unwrap_or_else(Platform::host);
    let ctx = config
        .render_context(platform)
        .context("Invalid lint configuration")?;

    let recipe = Recipe::from_path(&layout.recipe_path, &ctx)
        .with_context(|| format!("Failed to load {}", layout.recipe_path.display()))?;

    Ok(recipe
        .all_requirements()
        .filter(|(section, _)| options.section.map_or(true, |s| s == *section))
        .map(|(section, spec)| DependencyRow {
            section,
            spec: spec.clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use metayaml_recipe::RECIPE_FILE;
    use std::fs;
    use tempfile::TempDir;

    fn autochem() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(RECIPE_FILE),
            include_str!("../../../recipe/meta.yaml"),
        )
        .unwrap();
        tmp
    }

    fn names(rows: &[DependencyRow]) -> Vec<&str> {
        rows.iter().map(|r| r.spec.name.as_str()).collect()
    }

    #[test]
    fn build_section_only() {
        let tmp = autochem();
        let rows = dependency_rows(&DepsOptions {
            path: Some(tmp.path().to_path_buf()),
            platform: Some(Platform::Linux64),
            section: Some(RequirementSection::Build),
            json: false,
        })
        .unwrap();
        assert_eq!(names(&rows), vec!["python", "pip"]);
    }

    #[test]
    fn selectors_follow_platform() {
        let tmp = autochem();
        let linux = dependency_rows(&DepsOptions {
            path: Some(tmp.path().to_path_buf()),
            platform: Some(Platform::Linux64),
            section: Some(RequirementSection::Run),
            ..DepsOptions::default()
        })
        .unwrap();
        let osx = dependency_rows(&DepsOptions {
            path: Some(tmp.path().to_path_buf()),
            platform: Some(Platform::Osx64),
            section: Some(RequirementSection::Run),
            ..DepsOptions::default()
        })
        .unwrap();

        assert!(names(&linux).contains(&"x2z"));
        assert!(!names(&osx).contains(&"x2z"));
        assert_eq!(linux.len(), osx.len() + 1);
    }

    #[test]
    fn rows_serialize_with_section() {
        let tmp = autochem();
        let rows = dependency_rows(&DepsOptions {
            path: Some(tmp.path().to_path_buf()),
            platform: Some(Platform::Linux64),
            section: Some(RequirementSection::Run),
            ..DepsOptions::default()
        })
        .unwrap();

        let json = serde_json::to_value(&rows).unwrap();
        let psi4 = json
            .as_array()
            .unwrap()
            .iter()
            .find(|row| row["name"] == "psi4")
            .unwrap();
        assert_eq!(psi4["channel"], "psi4");
        assert!(psi4.get("section").is_some());
    }
}
