//! Lint configuration (`metayaml.toml`).
//!
//! ```toml
//! platforms = ["linux-64", "osx-64", "win-64"]
//! python = "3.8"
//! allowed-channels = ["conda-forge", "psi4", "rdkit"]
//! ignore = ["pin-conflict"]
//! deny-warnings = false
//!
//! [variables]
//! build_number = "0"
//! ```

use crate::render::RenderContext;
use crate::selector::{parse_python_version, Platform, SelectorError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// The configuration filename looked up next to a recipe.
pub const CONFIG_FILE: &str = "metayaml.toml";

/// Errors that can occur when loading a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(#[from] SelectorError),

    #[error("invalid config: at least one platform is required")]
    NoPlatforms,
}

/// Settings that drive linting and rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct LintConfig {
    /// Platforms the recipe is rendered and checked for.
    #[serde(default = "default_platforms")]
    pub platforms: Vec<String>,

    /// Python version used for `py` selectors, as `MAJOR.MINOR`.
    #[serde(default = "default_python")]
    pub python: String,

    /// Channels dependencies may name explicitly. Empty allows any channel.
    #[serde(default)]
    pub allowed_channels: Vec<String>,

    /// Rule codes to suppress.
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Treat warnings as failures.
    #[serde(default)]
    pub deny_warnings: bool,

    /// Template variables predefined for every render.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

fn default_platforms() -> Vec<String> {
    vec![
        Platform::Linux64.to_string(),
        Platform::Osx64.to_string(),
        Platform::Win64.to_string(),
    ]
}

fn default_python() -> String {
    String::from("3.8")
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            platforms: default_platforms(),
            python: default_python(),
            allowed_channels: Vec::new(),
            ignore: Vec::new(),
            deny_warnings: false,
            variables: BTreeMap::new(),
        }
    }
}

impl LintConfig {
    /// Load a configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or names an
    /// unknown platform.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the platforms and Python version are usable.
    ///
    /// # Errors
    ///
    /// Returns an error if no platform is configured, a platform is unknown,
    /// or the Python version is malformed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_platforms()?.is_empty() {
            return Err(ConfigError::NoPlatforms);
        }
        parse_python_version(&self.python)?;
        Ok(())
    }

    /// The configured platforms, parsed.
    ///
    /// # Errors
    ///
    /// Returns an error if a platform name is unknown.
    pub fn target_platforms(&self) -> Result<Vec<Platform>, SelectorError> {
        self.platforms.iter().map(|p| p.parse()).collect()
    }

    /// A render context for one platform.
    ///
    /// # Errors
    ///
    /// Returns an error if the Python version is malformed.
    pub fn render_context(&self, platform: Platform) -> Result<RenderContext, SelectorError> {
        let (major, minor) = parse_python_version(&self.python)?;
        let mut ctx = RenderContext::new(platform).with_python(major, minor);
        ctx.variables.clone_from(&self.variables);
        Ok(ctx)
    }

    /// Returns true if the rule code is suppressed.
    #[must_use]
    pub fn is_ignored(&self, code: &str) -> bool {
        self.ignore.iter().any(|c| c == code)
    }

    /// Returns true if the channel passes the allow-list.
    #[must_use]
    pub fn allows_channel(&self, channel: &str) -> bool {
        self.allowed_channels.is_empty() || self.allowed_channels.iter().any(|c| c == channel)
    }
}
