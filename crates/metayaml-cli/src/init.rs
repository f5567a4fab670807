//! Recipe initialization for `metayaml init`.

use anyhow::{bail, Context, Result};
use metayaml_recipe::{Recipe, RenderContext, RECIPE_DIR, RECIPE_FILE};
use std::path::{Path, PathBuf};
use std::{env, fs};

/// Options for recipe initialization.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Package name (defaults to the directory name, lowercased).
    pub name: Option<String>,

    /// Package version (defaults to `0.1.0`).
    pub version: Option<String>,
}

/// Create `recipe/meta.yaml` in the current directory.
pub fn init_recipe(options: &InitOptions) -> Result<()> {
    let current_dir = env::current_dir().context("Failed to get current directory")?;
    let path = init_recipe_at(&current_dir, options)?;
    println!("Created {}", path.display());
    Ok(())
}

/// Create `recipe/meta.yaml` under `root` and return its path.
pub fn init_recipe_at(root: &Path, options: &InitOptions) -> Result<PathBuf> {
    let recipe_dir = root.join(RECIPE_DIR);
    let recipe_path = recipe_dir.join(RECIPE_FILE);
    if recipe_path.exists() {
        bail!(
            "Cannot initialize: `{}/{}` already exists in this directory",
            RECIPE_DIR,
            RECIPE_FILE
        );
    }

    let name = match &options.name {
        Some(n) => n.clone(),
        None => infer_package_name(root)?,
    };
    let version = options.version.as_deref().unwrap_or("0.1.0");

    let content = recipe_template(&name, version);
    Recipe::parse(&content, &RenderContext::default())
        .with_context(|| format!("Cannot create a recipe for `{name}` {version}"))?;

    fs::create_dir_all(&recipe_dir).context("Failed to create recipe directory")?;
    fs::write(&recipe_path, content).context("Failed to write meta.yaml")?;

    Ok(recipe_path)
}

/// Infer the package name from a directory.
fn infer_package_name(dir: &Path) -> Result<String> {
    dir.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_lowercase)
        .context("Cannot infer package name from directory")
}

fn recipe_template(name: &str, version: &str) -> String {
    let module = name.replace('-', "_");
    format!(
        r#"{{% set name = "{name}" %}}
{{% set version = "{version}" %}}

package:
  name: {{{{ name|lower }}}}
  version: "{{{{ version }}}}"

source:
  path: ..

build:
  number: 0
  noarch: python
  script: python -m pip install . --no-deps -vv

requirements:
  host:
    - python
    - pip
  run:
    - python

test:
  imports:
    - {module}

about:
  summary: {name}
"#
    )
}
