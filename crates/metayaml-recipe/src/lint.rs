//! Structural checks over a recipe, run once per target platform.

use crate::collect::Collector;
use crate::config::{ConfigError, LintConfig};
use crate::recipe::{
    validate_package_name, validate_package_version, RawRecipe, RecipeError, RequirementSection,
};
use crate::render::{render, RenderContext};
use crate::selector::{extract_selector, is_known_variable, Platform, Selector};
use crate::spec::DependencySpec;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Stable rule codes.
pub mod rules {
    pub const MISSING_PACKAGE: &str = "missing-package";
    pub const EMPTY_NAME: &str = "empty-name";
    pub const INVALID_NAME: &str = "invalid-name";
    pub const EMPTY_VERSION: &str = "empty-version";
    pub const INVALID_VERSION: &str = "invalid-version";
    pub const NON_SEMVER_VERSION: &str = "non-semver-version";
    pub const MISSING_SOURCE: &str = "missing-source";
    pub const MULTIPLE_SOURCES: &str = "multiple-sources";
    pub const INVALID_SHA256: &str = "invalid-sha256";
    pub const INVALID_DEPENDENCY: &str = "invalid-dependency";
    pub const DUPLICATE_DEPENDENCY: &str = "duplicate-dependency";
    pub const PIN_CONFLICT: &str = "pin-conflict";
    pub const DISALLOWED_CHANNEL: &str = "disallowed-channel";
    pub const INVALID_SELECTOR: &str = "invalid-selector";
    pub const UNKNOWN_SELECTOR: &str = "unknown-selector";
    pub const RENDER_ERROR: &str = "render-error";
    pub const YAML_ERROR: &str = "yaml-error";
}

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// A single finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    /// Platforms the finding occurs on. Empty means every platform.
    pub platforms: Vec<Platform>,
}

impl Diagnostic {
    fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            platforms: Vec::new(),
        }
    }

    fn warning(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            platforms: Vec::new(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.code, self.message)?;
        if !self.platforms.is_empty() {
            let names: Vec<_> = self.platforms.iter().map(Platform::as_str).collect();
            write!(f, " ({})", names.join(", "))?;
        }
        Ok(())
    }
}

/// All diagnostics for one recipe.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LintReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl LintReport {
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Returns true if the recipe passes, optionally failing on warnings.
    #[must_use]
    pub fn passes(&self, deny_warnings: bool) -> bool {
        if deny_warnings {
            self.is_clean()
        } else {
            !self.has_errors()
        }
    }

    /// Returns true if any diagnostic carries this code.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.diagnostics.iter().any(|d| d.code == code)
    }
}

/// Runs every rule against a recipe for each configured platform.
#[derive(Debug, Clone)]
pub struct Linter {
    config: LintConfig,
    contexts: Vec<RenderContext>,
}

impl Linter {
    /// Create a linter from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no platform is configured, or a platform or the
    /// Python version is malformed.
    pub fn new(config: LintConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let contexts = config
            .target_platforms()?
            .into_iter()
            .map(|platform| config.render_context(platform))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { config, contexts })
    }

    #[must_use]
    pub fn config(&self) -> &LintConfig {
        &self.config
    }

    /// Lint a recipe file.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file cannot be read. Problems with the
    /// recipe itself are reported as diagnostics.
    pub fn lint_path(&self, path: impl AsRef<Path>) -> Result<LintReport, std::io::Error> {
        let path = path.as_ref();
        debug!(path = %path.display(), "linting recipe");
        let content = std::fs::read_to_string(path)?;
        Ok(self.lint_source(&content))
    }

    /// Lint recipe text.
    #[must_use]
    pub fn lint_source(&self, content: &str) -> LintReport {
        let mut report = LintReport::default();

        let selector_diagnostics = check_selectors(content);
        let selectors_broken = selector_diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error);
        for diagnostic in selector_diagnostics {
            self.push(&mut report, diagnostic, None);
        }
        if selectors_broken {
            warn!("skipping platform checks, recipe has unusable selectors");
            return report;
        }

        for ctx in &self.contexts {
            let platform = ctx.platform();
            for diagnostic in check_platform(content, ctx, &self.config) {
                self.push(&mut report, diagnostic, Some(platform));
            }
        }

        // A finding present on every platform is reported without a list.
        let all = self.contexts.len();
        for diagnostic in &mut report.diagnostics {
            if all > 1 && diagnostic.platforms.len() == all {
                diagnostic.platforms.clear();
            }
        }

        debug!(
            errors = report.errors().count(),
            warnings = report.warnings().count(),
            "lint finished"
        );
        report
    }

    /// Add a diagnostic, merging it with an identical finding on another platform.
    fn push(&self, report: &mut LintReport, diagnostic: Diagnostic, platform: Option<Platform>) {
        if self.config.is_ignored(diagnostic.code) {
            return;
        }

        let existing = report.diagnostics.iter_mut().find(|d| {
            d.code == diagnostic.code
                && d.severity == diagnostic.severity
                && d.message == diagnostic.message
        });

        match (existing, platform) {
            (Some(existing), Some(platform)) => {
                if !existing.platforms.contains(&platform) {
                    existing.platforms.push(platform);
                }
            }
            (Some(_), None) => {}
            (None, platform) => {
                let mut diagnostic = diagnostic;
                diagnostic.platforms.extend(platform);
                report.diagnostics.push(diagnostic);
            }
        }
    }
}

/// Platform-independent pass over every selector comment.
fn check_selectors(content: &str) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        if line.trim_start().starts_with('#') {
            continue;
        }
        let (_, Some(expr)) = extract_selector(line) else {
            continue;
        };
        match expr.parse::<Selector>() {
            Ok(selector) => {
                for name in selector.identifiers() {
                    if !is_known_variable(name) {
                        out.push(Diagnostic::error(
                            rules::UNKNOWN_SELECTOR,
                            format!("line {}: unknown selector variable '{name}'", idx + 1),
                        ));
                    }
                }
            }
            Err(err) => out.push(Diagnostic::error(
                rules::INVALID_SELECTOR,
                format!("line {}: {err}", idx + 1),
            )),
        }
    }

    out
}

/// Every rule that needs a rendered recipe.
fn check_platform(content: &str, ctx: &RenderContext, config: &LintConfig) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    let rendered = match render(content, ctx) {
        Ok(rendered) => rendered,
        Err(err) => {
            out.push(Diagnostic::error(rules::RENDER_ERROR, err.to_string()));
            return out;
        }
    };

    let raw = match RawRecipe::from_yaml(&rendered) {
        Ok(raw) => raw,
        Err(err) => {
            out.push(Diagnostic::error(rules::YAML_ERROR, err.to_string()));
            return out;
        }
    };

    check_package(&raw, &mut out);
    check_source(&raw, &mut out);
    check_requirements(&raw, config, &mut out);
    out
}

fn check_package(raw: &RawRecipe, out: &mut Vec<Diagnostic>) {
    let Some(package) = &raw.package else {
        out.push(Diagnostic::error(
            rules::MISSING_PACKAGE,
            "recipe has no package section",
        ));
        return;
    };

    if package.name.trim().is_empty() {
        out.push(Diagnostic::error(rules::EMPTY_NAME, "package.name is empty"));
    } else if let Err(RecipeError::InvalidName(name, reason)) =
        validate_package_name(&package.name)
    {
        out.push(Diagnostic::error(
            rules::INVALID_NAME,
            format!("invalid package name '{name}': {reason}"),
        ));
    }

    let version = &package.version;
    if version.trim().is_empty() {
        out.push(Diagnostic::error(
            rules::EMPTY_VERSION,
            "package.version is empty",
        ));
    } else if let Err(RecipeError::InvalidVersion(version, reason)) =
        validate_package_version(version)
    {
        out.push(Diagnostic::error(
            rules::INVALID_VERSION,
            format!("invalid version '{version}': {reason}"),
        ));
    } else if semver::Version::parse(version).is_err() {
        out.push(Diagnostic::warning(
            rules::NON_SEMVER_VERSION,
            format!("version '{version}' is not a semantic version"),
        ));
    }
}

fn check_source(raw: &RawRecipe, out: &mut Vec<Diagnostic>) {
    let Some(source) = &raw.source else {
        out.push(Diagnostic::error(
            rules::MISSING_SOURCE,
            "recipe has no source section",
        ));
        return;
    };

    match source.location() {
        Ok(_) => {}
        Err(RecipeError::InvalidSource(reason)) => {
            out.push(Diagnostic::error(rules::MULTIPLE_SOURCES, reason));
        }
        Err(err) => out.push(Diagnostic::error(rules::MISSING_SOURCE, err.to_string())),
    }

    if let Some(sha256) = &source.sha256 {
        let valid = hex::decode(sha256.trim()).is_ok_and(|bytes| bytes.len() == 32);
        if !valid {
            out.push(Diagnostic::error(
                rules::INVALID_SHA256,
                format!("source.sha256 '{sha256}' is not a 64-character hex digest"),
            ));
        }
    }
}

fn check_requirements(raw: &RawRecipe, config: &LintConfig, out: &mut Vec<Diagnostic>) {
    let mut parsed: Vec<(RequirementSection, DependencySpec)> = Vec::new();

    for (section, entry) in raw.entries() {
        match entry.parse::<DependencySpec>() {
            Ok(spec) => parsed.push((section, spec)),
            Err(err) => out.push(Diagnostic::error(
                rules::INVALID_DEPENDENCY,
                format!("{section}: '{entry}': {err}"),
            )),
        }
    }

    let collected = Collector::new()
        .with_test(true)
        .collect_entries(parsed.iter().map(|(section, spec)| (*section, spec)));

    for (section, req) in collected.duplicates() {
        out.push(Diagnostic::error(
            rules::DUPLICATE_DEPENDENCY,
            format!(
                "{section}: '{}' is listed {} times",
                req.name,
                req.count_in(section)
            ),
        ));
    }

    for req in collected.pin_conflicts() {
        let pins: Vec<_> = req.pins().iter().map(|p| p.to_string()).collect();
        out.push(Diagnostic::warning(
            rules::PIN_CONFLICT,
            format!(
                "'{}' is pinned differently across sections: {}",
                req.name,
                pins.join(", ")
            ),
        ));
    }

    for channel in collected.channels() {
        if !config.allows_channel(channel) {
            out.push(Diagnostic::error(
                rules::DISALLOWED_CHANNEL,
                format!("channel '{channel}' is not in allowed-channels"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTOCHEM: &str = include_str!("../../../recipe/meta.yaml");

    fn lint(content: &str) -> LintReport {
        Linter::new(LintConfig::default())
            .unwrap()
            .lint_source(content)
    }

    fn recipe_with(requirements: &str) -> String {
        format!("package:\n  name: pkg\n  version: 1.0.0\nsource:\n  path: .\n{requirements}")
    }

    #[test]
    fn autochem_recipe_is_clean() {
        let report = lint(AUTOCHEM);
        assert!(report.is_clean(), "unexpected diagnostics: {:?}", report.diagnostics);
    }

    #[test]
    fn minimal_recipe_is_clean() {
        assert!(lint(&recipe_with("")).is_clean());
    }

    #[test]
    fn empty_name_and_version() {
        let report = lint("package:\n  name: ''\n  version:\nsource:\n  path: .\n");
        assert!(report.contains(rules::EMPTY_NAME));
        assert!(report.contains(rules::EMPTY_VERSION));
        // Identical on every platform, so reported once without a platform list
        assert_eq!(report.errors().count(), 2);
        assert!(report.diagnostics.iter().all(|d| d.platforms.is_empty()));
    }

    #[test]
    fn invalid_name() {
        let report = lint("package:\n  name: AutoChem\n  version: 1.0.0\nsource:\n  path: .\n");
        assert!(report.contains(rules::INVALID_NAME));
    }

    #[test]
    fn non_semver_version_is_a_warning() {
        let report = lint("package:\n  name: pkg\n  version: '2021.1'\nsource:\n  path: .\n");
        assert!(report.contains(rules::NON_SEMVER_VERSION));
        assert!(!report.has_errors());
        assert!(report.passes(false));
        assert!(!report.passes(true));
    }

    #[test]
    fn source_rules() {
        let report = lint("package:\n  name: pkg\n  version: 1.0.0\n");
        assert!(report.contains(rules::MISSING_SOURCE));

        let report = lint(
            "package:\n  name: pkg\n  version: 1.0.0\nsource:\n  path: .\n  git_url: https://example.com/pkg.git\n",
        );
        assert!(report.contains(rules::MULTIPLE_SOURCES));

        let report = lint(
            "package:\n  name: pkg\n  version: 1.0.0\nsource:\n  url: https://example.com/pkg.tar.gz\n  sha256: abc123\n",
        );
        assert!(report.contains(rules::INVALID_SHA256));
    }

    #[test]
    fn every_invalid_dependency_is_reported() {
        let report = lint(&recipe_with(
            "requirements:\n  build:\n    - '::cmake'\n  run:\n    - numpy=\n    - scipy\n",
        ));
        let invalid: Vec<_> = report
            .diagnostics
            .iter()
            .filter(|d| d.code == rules::INVALID_DEPENDENCY)
            .collect();
        assert_eq!(invalid.len(), 2);
    }

    #[test]
    fn duplicate_dependency() {
        let report = lint(&recipe_with(
            "requirements:\n  run:\n    - numpy\n    - scipy\n    - numpy=1.15.4\n",
        ));
        assert!(report.contains(rules::DUPLICATE_DEPENDENCY));
    }

    #[test]
    fn platform_exclusive_alternatives_are_not_duplicates() {
        let report = lint(&recipe_with(
            "requirements:\n  run:\n    - python 3.6  # [win]\n    - python  # [not win]\n",
        ));
        assert!(!report.contains(rules::DUPLICATE_DEPENDENCY));
    }

    #[test]
    fn commented_out_alternatives_are_not_duplicates() {
        let report = lint(&recipe_with(
            "requirements:\n  run:\n    - openbabel::openbabel\n    # - openbabel::openbabel=2.4.1\n",
        ));
        assert!(report.is_clean());
    }

    #[test]
    fn duplicate_on_one_platform_lists_that_platform() {
        let report = lint(&recipe_with(
            "requirements:\n  run:\n    - numpy\n    - numpy  # [linux]\n",
        ));
        let dup = report
            .diagnostics
            .iter()
            .find(|d| d.code == rules::DUPLICATE_DEPENDENCY)
            .unwrap();
        assert_eq!(dup.platforms, vec![Platform::Linux64]);
        assert!(dup.to_string().ends_with("(linux-64)"));
    }

    #[test]
    fn pin_conflict_warning() {
        let report = lint(&recipe_with(
            "requirements:\n  build:\n    - numpy=1.15\n  run:\n    - numpy=1.16\n",
        ));
        assert!(report.contains(rules::PIN_CONFLICT));
        assert!(!report.has_errors());
    }

    #[test]
    fn disallowed_channel() {
        let config = LintConfig {
            allowed_channels: vec!["conda-forge".to_string()],
            ..LintConfig::default()
        };
        let report = Linter::new(config)
            .unwrap()
            .lint_source(&recipe_with("requirements:\n  run:\n    - psi4::psi4\n"));
        assert!(report.contains(rules::DISALLOWED_CHANNEL));
    }

    #[test]
    fn ignored_rules_are_dropped() {
        let config = LintConfig {
            ignore: vec![rules::PIN_CONFLICT.to_string()],
            ..LintConfig::default()
        };
        let report = Linter::new(config).unwrap().lint_source(&recipe_with(
            "requirements:\n  build: [numpy=1.15]\n  run: [numpy=1.16]\n",
        ));
        assert!(report.is_clean());
    }

    #[test]
    fn selector_problems_stop_platform_checks() {
        let report = lint(&recipe_with("requirements:\n  run:\n    - numpy  # [solaris]\n"));
        assert!(report.contains(rules::UNKNOWN_SELECTOR));
        assert!(!report.contains(rules::RENDER_ERROR));

        let report = lint(&recipe_with("requirements:\n  run:\n    - numpy  # [linux and]\n"));
        assert!(report.contains(rules::INVALID_SELECTOR));
    }

    #[test]
    fn linter_requires_a_platform() {
        let config = LintConfig {
            platforms: Vec::new(),
            ..LintConfig::default()
        };
        assert!(matches!(Linter::new(config), Err(ConfigError::NoPlatforms)));
    }

    #[test]
    fn commented_out_selectors_are_ignored() {
        let report = lint(&recipe_with(
            "requirements:\n  run:\n    - python\n    # - foo  # [solaris]\n",
        ));
        assert!(report.is_clean());
    }

    #[test]
    fn yaml_and_render_errors() {
        let report = lint("package: [unclosed\n");
        assert!(report.contains(rules::YAML_ERROR));

        let report = lint("package:\n  name: {{ name }}\n");
        assert!(report.contains(rules::RENDER_ERROR));
    }

    #[test]
    fn missing_package_section() {
        let report = lint("source:\n  path: .\n");
        assert!(report.contains(rules::MISSING_PACKAGE));
    }

    #[test]
    fn lint_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("meta.yaml");
        std::fs::write(&path, AUTOCHEM).unwrap();
        let linter = Linter::new(LintConfig::default()).unwrap();
        assert!(linter.lint_path(&path).unwrap().is_clean());
        assert!(linter.lint_path(tmp.path().join("missing.yaml")).is_err());
    }
}
