//! Implementation of the `metayaml render` command.

use anyhow::{Context, Result};
use metayaml_recipe::{render, Platform};
use std::fs;
use std::path::Path;

use crate::settings::{load_config, locate_recipe};

/// Render the recipe at `path` for a platform.
pub fn render_recipe(path: Option<&Path>, platform: Option<Platform>) -> Result<String> {
    let layout = locate_recipe(path)?;
    let config = load_config(None, Some(&layout))?;
    let ctx = config
        .render_context(platform.unwrap_or_else(Platform::host))
        .context("Invalid lint configuration")?;

    let text = fs::read_to_string(&layout.recipe_path)
        .with_context(|| format!("Failed to read {}", layout.recipe_path.display()))?;
    render(&text, &ctx).with_context(|| format!("Failed to render {}", layout.recipe_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use metayaml_recipe::RECIPE_FILE;
    use tempfile::TempDir;

    #[test]
    fn renders_for_requested_platform() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(RECIPE_FILE),
            include_str!("../../../recipe/meta.yaml"),
        )
        .unwrap();

        let linux = render_recipe(Some(tmp.path()), Some(Platform::Linux64)).unwrap();
        assert!(linux.contains("name: autochem"));
        assert!(linux.contains("version: 0.1.0"));
        assert!(linux.contains("- auto-mech::x2z"));
        assert!(!linux.contains("# [linux]"));
        assert!(!linux.contains("{%"));

        let win = render_recipe(Some(tmp.path()), Some(Platform::Win64)).unwrap();
        assert!(!win.contains("x2z"));
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(RECIPE_FILE), "package:\n  name: {{ nope }}\n").unwrap();
        assert!(render_recipe(Some(tmp.path()), Some(Platform::Linux64)).is_err());
    }
}
