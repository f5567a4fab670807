//! Conda recipe (`meta.yaml`) handling.
//!
//! This crate provides:
//! - Parsing and validation of dependency specs (`channel::name=version`)
//! - Evaluation of `# [selector]` line comments per target platform
//! - Rendering of the `{% set %}` / `{{ var }}` template subset
//! - Parsing and validation of rendered recipes
//! - Requirement grouping, duplicate and pin conflict detection
//! - Multi-platform linting with stable rule codes
//! - Recipe directory discovery and line-preserving requirement edits

mod collect;
mod config;
mod edit;
mod layout;
mod lint;
mod recipe;
mod render;
mod selector;
mod spec;

pub use collect::{CollectedRequirement, CollectedRequirements, Collector};
pub use config::{ConfigError, LintConfig, CONFIG_FILE};
pub use edit::{add_requirement, remove_requirement, sections_containing, EditError};
pub use layout::{
    find_recipes, LayoutError, RecipeLayout, BUILD_SCRIPT, BUILD_SCRIPT_WINDOWS, RECIPE_DIR,
    RECIPE_FILE, VARIANT_CONFIG,
};
pub use lint::{rules, Diagnostic, LintReport, Linter, Severity};
pub use recipe::{
    About, BuildSection, Package, Recipe, RecipeError, RequirementSection, Requirements,
    Source, SourceLocation, TestSection,
};
pub use render::{render, RenderContext, RenderError};
pub use selector::{
    extract_selector, is_known_variable, parse_python_version, Platform, Selector,
    SelectorContext, SelectorError,
};
pub use spec::{DependencySpec, PinKind, SpecError, VersionPin};
