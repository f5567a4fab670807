//! Conda recipe manifest (`meta.yaml`) parsing and validation.

use crate::render::{render, RenderContext, RenderError};
use crate::spec::{validate_name, DependencySpec, SpecError};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur when loading a recipe.
#[derive(Error, Debug)]
pub enum RecipeError {
    #[error("failed to read recipe file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to render recipe: {0}")]
    Render(#[from] RenderError),

    #[error("failed to parse recipe: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid package name '{0}': {1}")]
    InvalidName(String, &'static str),

    #[error("invalid version '{0}': {1}")]
    InvalidVersion(String, &'static str),

    #[error("invalid source: {0}")]
    InvalidSource(&'static str),

    #[error("invalid dependency '{entry}' in {section} (entry {index}): {source}")]
    InvalidDependency {
        section: RequirementSection,
        index: usize,
        entry: String,
        #[source]
        source: SpecError,
    },
}

/// Which requirements list an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementSection {
    /// `requirements.build`: tools needed to build the package.
    Build,
    /// `requirements.host`: libraries linked against at build time.
    Host,
    /// `requirements.run`: needed at run time.
    Run,
    /// `test.requires`: needed to run the package tests.
    Test,
}

impl RequirementSection {
    pub const ALL: [RequirementSection; 4] = [Self::Build, Self::Host, Self::Run, Self::Test];

    /// The dotted YAML path of the list.
    #[must_use]
    pub fn yaml_path(&self) -> &'static str {
        match self {
            Self::Build => "requirements.build",
            Self::Host => "requirements.host",
            Self::Run => "requirements.run",
            Self::Test => "test.requires",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Host => "host",
            Self::Run => "run",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for RequirementSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.yaml_path())
    }
}

impl FromStr for RequirementSection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|section| section.as_str() == s || section.yaml_path() == s)
            .ok_or_else(|| format!("unknown requirements section '{s}'"))
    }
}

/// The parsed and validated recipe.
#[derive(Debug, Clone, Serialize)]
pub struct Recipe {
    pub package: Package,
    pub source: Source,
    pub build: BuildSection,
    pub requirements: Requirements,
    pub test: TestSection,
    pub about: About,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_yaml::Mapping>,
}

/// `package` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Package {
    #[serde(deserialize_with = "scalar_string")]
    pub name: String,

    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
}

/// `source` section. Exactly one of `path`, `url` or `git_url` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_rev: Option<String>,

    /// Subdirectory of the work dir to place the source in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "scalar_list")]
    pub patches: Vec<String>,
}

/// Where the package source comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation<'a> {
    Path(&'a str),
    Url {
        url: &'a str,
        sha256: Option<&'a str>,
    },
    Git {
        url: &'a str,
        rev: Option<&'a str>,
    },
}

impl Source {
    /// Returns true if no source location is given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.location_count() == 0
    }

    fn location_count(&self) -> usize {
        [&self.path, &self.url, &self.git_url]
            .iter()
            .filter(|field| non_empty(field).is_some())
            .count()
    }

    /// The single source location.
    ///
    /// # Errors
    ///
    /// Returns an error if no location or more than one location is set.
    pub fn location(&self) -> Result<SourceLocation<'_>, RecipeError> {
        match self.location_count() {
            0 => return Err(RecipeError::MissingField("source.path")),
            1 => {}
            _ => {
                return Err(RecipeError::InvalidSource(
                    "only one of path, url, or git_url may be set",
                ))
            }
        }

        if let Some(path) = non_empty(&self.path) {
            Ok(SourceLocation::Path(path))
        } else if let Some(url) = non_empty(&self.url) {
            Ok(SourceLocation::Url {
                url,
                sha256: self.sha256.as_deref(),
            })
        } else {
            let url = non_empty(&self.git_url).ok_or(RecipeError::MissingField("source.path"))?;
            Ok(SourceLocation::Git {
                url,
                rev: self.git_rev.as_deref(),
            })
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.trim().is_empty())
}

/// `build` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,

    /// Build string override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,

    /// `python` or `generic`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noarch: Option<String>,

    /// Build script, either one command or a list of commands.
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "scalar_list")]
    pub script: Vec<String>,

    #[serde(default)]
    pub skip: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "scalar_list")]
    pub entry_points: Vec<String>,
}

/// `requirements` section, parsed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Requirements {
    pub build: Vec<DependencySpec>,
    pub host: Vec<DependencySpec>,
    pub run: Vec<DependencySpec>,
    /// `run_constrained` entries, kept as written. They constrain packages
    /// without requiring them, so they are not part of any requirements list.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub run_constrained: Vec<String>,
}

/// `test` section.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestSection {
    pub imports: Vec<String>,
    pub commands: Vec<String>,
    pub requires: Vec<DependencySpec>,
    pub source_files: Vec<String>,
}

/// `about` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct About {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_family: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_url: Option<String>,
}

/// Recipe as deserialized, before dependency entries are parsed.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawRecipe {
    pub package: Option<Package>,
    #[serde(default)]
    pub source: Option<Source>,
    #[serde(default)]
    pub build: Option<BuildSection>,
    #[serde(default)]
    pub requirements: Option<RawRequirements>,
    #[serde(default)]
    pub test: Option<RawTest>,
    #[serde(default)]
    pub about: Option<About>,
    #[serde(default)]
    pub extra: Option<serde_yaml::Mapping>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawRequirements {
    #[serde(default, deserialize_with = "scalar_list")]
    pub build: Vec<String>,
    #[serde(default, deserialize_with = "scalar_list")]
    pub host: Vec<String>,
    #[serde(default, deserialize_with = "scalar_list")]
    pub run: Vec<String>,
    #[serde(default, deserialize_with = "scalar_list")]
    pub run_constrained: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawTest {
    #[serde(default, deserialize_with = "scalar_list")]
    pub imports: Vec<String>,
    #[serde(default, deserialize_with = "scalar_list")]
    pub commands: Vec<String>,
    #[serde(default, deserialize_with = "scalar_list")]
    pub requires: Vec<String>,
    #[serde(default, deserialize_with = "scalar_list")]
    pub source_files: Vec<String>,
}

impl RawRecipe {
    /// Deserialize already-rendered YAML.
    pub(crate) fn from_yaml(rendered: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(rendered)
    }

    /// Raw entries of every requirements list, in document order.
    pub(crate) fn entries(&self) -> Vec<(RequirementSection, &str)> {
        let mut out = Vec::new();
        if let Some(reqs) = &self.requirements {
            for (section, list) in [
                (RequirementSection::Build, &reqs.build),
                (RequirementSection::Host, &reqs.host),
                (RequirementSection::Run, &reqs.run),
            ] {
                out.extend(list.iter().map(|e| (section, e.as_str())));
            }
        }
        if let Some(test) = &self.test {
            out.extend(
                test.requires
                    .iter()
                    .map(|e| (RequirementSection::Test, e.as_str())),
            );
        }
        out
    }
}

fn parse_entries(
    section: RequirementSection,
    entries: &[String],
) -> Result<Vec<DependencySpec>, RecipeError> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            entry
                .parse()
                .map_err(|source| RecipeError::InvalidDependency {
                    section,
                    index,
                    entry: entry.clone(),
                    source,
                })
        })
        .collect()
}

impl Recipe {
    /// Load and render a recipe from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, rendered, or parsed.
    pub fn from_path(path: impl AsRef<Path>, ctx: &RenderContext) -> Result<Self, RecipeError> {
        let path = path.as_ref();
        debug!(path = %path.display(), platform = %ctx.platform(), "loading recipe");
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, ctx)
    }

    /// Render and parse recipe text for the context's platform.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails, the YAML is invalid, or the
    /// recipe violates a manifest invariant.
    pub fn parse(content: &str, ctx: &RenderContext) -> Result<Self, RecipeError> {
        let rendered = render(content, ctx)?;
        let raw = RawRecipe::from_yaml(&rendered)?;
        let recipe = Self::from_raw(raw)?;
        recipe.validate()?;
        Ok(recipe)
    }

    fn from_raw(raw: RawRecipe) -> Result<Self, RecipeError> {
        let package = raw.package.ok_or(RecipeError::MissingField("package"))?;
        let reqs = raw.requirements.unwrap_or_default();
        let test = raw.test.unwrap_or_default();

        Ok(Self {
            package,
            source: raw.source.unwrap_or_default(),
            build: raw.build.unwrap_or_default(),
            requirements: Requirements {
                build: parse_entries(RequirementSection::Build, &reqs.build)?,
                host: parse_entries(RequirementSection::Host, &reqs.host)?,
                run: parse_entries(RequirementSection::Run, &reqs.run)?,
                run_constrained: reqs.run_constrained,
            },
            test: TestSection {
                requires: parse_entries(RequirementSection::Test, &test.requires)?,
                imports: test.imports,
                commands: test.commands,
                source_files: test.source_files,
            },
            about: raw.about.unwrap_or_default(),
            extra: raw.extra,
        })
    }

    /// Check the manifest invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), RecipeError> {
        validate_package_name(&self.package.name)?;
        validate_package_version(&self.package.version)?;
        self.source.location()?;
        Ok(())
    }

    /// Entries of one requirements list.
    #[must_use]
    pub fn requirements_for(&self, section: RequirementSection) -> &[DependencySpec] {
        match section {
            RequirementSection::Build => &self.requirements.build,
            RequirementSection::Host => &self.requirements.host,
            RequirementSection::Run => &self.requirements.run,
            RequirementSection::Test => &self.test.requires,
        }
    }

    /// All requirement entries, section by section in document order.
    pub fn all_requirements(&self) -> impl Iterator<Item = (RequirementSection, &DependencySpec)> {
        RequirementSection::ALL.into_iter().flat_map(move |section| {
            self.requirements_for(section)
                .iter()
                .map(move |spec| (section, spec))
        })
    }
}

pub(crate) fn validate_package_name(name: &str) -> Result<(), RecipeError> {
    if name.trim().is_empty() {
        return Err(RecipeError::InvalidName(
            name.to_string(),
            "name cannot be empty",
        ));
    }
    validate_name(name, name).map_err(|err| match err {
        SpecError::InvalidName(_, reason) => RecipeError::InvalidName(name.to_string(), reason),
        _ => RecipeError::InvalidName(name.to_string(), "invalid package name"),
    })
}

pub(crate) fn validate_package_version(version: &str) -> Result<(), RecipeError> {
    if version.trim().is_empty() {
        return Err(RecipeError::InvalidVersion(
            version.to_string(),
            "version cannot be empty",
        ));
    }
    if version.chars().any(char::is_whitespace) {
        return Err(RecipeError::InvalidVersion(
            version.to_string(),
            "version cannot contain whitespace",
        ));
    }
    if version.contains('-') {
        return Err(RecipeError::InvalidVersion(
            version.to_string(),
            "conda versions cannot contain '-'",
        ));
    }
    Ok(())
}

fn scalar_to_string(value: serde_yaml::Value) -> Result<String, String> {
    use serde_yaml::Value;

    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        Value::Sequence(_) => Err("expected a scalar, found a sequence".to_string()),
        Value::Mapping(_) => Err("expected a scalar, found a mapping".to_string()),
        Value::Tagged(_) => Err("expected a scalar, found a tagged value".to_string()),
    }
}

/// Deserialize strings, numbers and booleans as text.
fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_yaml::Value::deserialize(deserializer)?;
    scalar_to_string(value).map_err(de::Error::custom)
}

/// Deserialize a list of scalars. A single scalar or null is accepted too,
/// since selectors can empty a list or leave one bare entry.
fn scalar_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    use serde_yaml::Value;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .into_iter()
            .map(|item| scalar_to_string(item).map_err(de::Error::custom))
            .collect(),
        scalar => Ok(vec![scalar_to_string(scalar).map_err(de::Error::custom)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::Platform;

    const AUTOCHEM: &str = include_str!("../../../recipe/meta.yaml");

    fn linux() -> RenderContext {
        RenderContext::new(Platform::Linux64).with_python(3, 8)
    }

    #[test]
    fn parse_minimal_recipe() {
        let yaml = r"
package:
  name: autochem
  version: 0.1.0
source:
  path: ..
";
        let recipe = Recipe::parse(yaml, &linux()).unwrap();
        assert_eq!(recipe.package.name, "autochem");
        assert_eq!(recipe.package.version, "0.1.0");
        assert_eq!(recipe.source.location().unwrap(), SourceLocation::Path(".."));
        assert!(recipe.requirements.run.is_empty());
    }

    #[test]
    fn parse_autochem_recipe() {
        let recipe = Recipe::parse(AUTOCHEM, &linux()).unwrap();
        assert_eq!(recipe.package.name, "autochem");
        assert!(!recipe.package.version.is_empty());
        assert_eq!(recipe.build.noarch.as_deref(), Some("python"));

        let psi4 = recipe
            .requirements
            .run
            .iter()
            .find(|d| d.name == "psi4")
            .unwrap();
        assert_eq!(psi4.channel.as_deref(), Some("psi4"));
        assert!(psi4.version.is_none());

        let numpy = recipe
            .requirements
            .run
            .iter()
            .find(|d| d.name == "numpy")
            .unwrap();
        assert!(numpy.channel.is_none());
        assert_eq!(numpy.version_str(), Some("1.15.4"));

        // Linux-only entry survives on linux
        assert!(recipe.requirements.run.iter().any(|d| d.name == "x2z"));
        assert_eq!(recipe.test.imports, vec!["automol"]);
    }

    #[test]
    fn selector_removes_entries_on_other_platforms() {
        let ctx = RenderContext::new(Platform::Win64).with_python(3, 8);
        let recipe = Recipe::parse(AUTOCHEM, &ctx).unwrap();
        assert!(!recipe.requirements.run.iter().any(|d| d.name == "x2z"));
    }

    #[test]
    fn commented_out_dependencies_are_ignored() {
        let recipe = Recipe::parse(AUTOCHEM, &linux()).unwrap();
        assert!(!recipe.requirements.run.iter().any(|d| d.name == "iodata"));
        let openbabel: Vec<_> = recipe
            .requirements
            .run
            .iter()
            .filter(|d| d.name == "openbabel")
            .collect();
        assert_eq!(openbabel.len(), 1);
        assert!(openbabel[0].version.is_none());
    }

    #[test]
    fn numeric_version_is_accepted() {
        let yaml = "package:\n  name: pkg\n  version: 2\nsource:\n  path: .\n";
        let recipe = Recipe::parse(yaml, &linux()).unwrap();
        assert_eq!(recipe.package.version, "2");
    }

    #[test]
    fn empty_requirement_list_is_accepted() {
        let yaml = "package:\n  name: pkg\n  version: '1.0'\nsource:\n  path: .\nrequirements:\n  build:\n  run:\n    - python\n";
        let recipe = Recipe::parse(yaml, &linux()).unwrap();
        assert!(recipe.requirements.build.is_empty());
        assert_eq!(recipe.requirements.run.len(), 1);
    }

    #[test]
    fn all_requirements_in_section_order() {
        let yaml = r"
package: {name: pkg, version: '1.0'}
source: {path: .}
requirements:
  run: [numpy]
  build: [cmake]
  host: [python]
test:
  requires: [pytest]
";
        let recipe = Recipe::parse(yaml, &linux()).unwrap();
        let names: Vec<_> = recipe
            .all_requirements()
            .map(|(section, spec)| (section, spec.name.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                (RequirementSection::Build, "cmake"),
                (RequirementSection::Host, "python"),
                (RequirementSection::Run, "numpy"),
                (RequirementSection::Test, "pytest"),
            ]
        );
    }

    #[test]
    fn empty_name_is_rejected() {
        let yaml = "package:\n  name: ''\n  version: '1.0'\nsource:\n  path: .\n";
        let err = Recipe::parse(yaml, &linux()).unwrap_err();
        assert!(matches!(err, RecipeError::InvalidName(..)));
    }

    #[test]
    fn empty_version_is_rejected() {
        let yaml = "package:\n  name: pkg\n  version:\nsource:\n  path: .\n";
        let err = Recipe::parse(yaml, &linux()).unwrap_err();
        assert!(matches!(err, RecipeError::InvalidVersion(..)));
    }

    #[test]
    fn missing_package_section() {
        let err = Recipe::parse("source:\n  path: .\n", &linux()).unwrap_err();
        assert!(matches!(err, RecipeError::MissingField("package")));
    }

    #[test]
    fn source_is_required_and_unique() {
        let yaml = "package:\n  name: pkg\n  version: '1.0'\n";
        let err = Recipe::parse(yaml, &linux()).unwrap_err();
        assert!(matches!(err, RecipeError::MissingField("source.path")));

        let yaml = "package:\n  name: pkg\n  version: '1.0'\nsource:\n  path: .\n  url: https://example.com/pkg.tar.gz\n";
        let err = Recipe::parse(yaml, &linux()).unwrap_err();
        assert!(matches!(err, RecipeError::InvalidSource(_)));
    }

    #[test]
    fn git_source() {
        let yaml = "package:\n  name: pkg\n  version: '1.0'\nsource:\n  git_url: https://github.com/Auto-Mech/autochem\n  git_rev: main\n";
        let recipe = Recipe::parse(yaml, &linux()).unwrap();
        assert_eq!(
            recipe.source.location().unwrap(),
            SourceLocation::Git {
                url: "https://github.com/Auto-Mech/autochem",
                rev: Some("main"),
            }
        );
    }

    #[test]
    fn invalid_dependency_reports_position() {
        let yaml = "package:\n  name: pkg\n  version: '1.0'\nsource:\n  path: .\nrequirements:\n  run:\n    - numpy\n    - '::scipy'\n";
        let err = Recipe::parse(yaml, &linux()).unwrap_err();
        match err {
            RecipeError::InvalidDependency { section, index, entry, .. } => {
                assert_eq!(section, RequirementSection::Run);
                assert_eq!(index, 1);
                assert_eq!(entry, "::scipy");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let yaml = "package:\n  name: pkg\n  version: '1.0'\nsource:\n  path: .\noutputs: []\n";
        let err = Recipe::parse(yaml, &linux()).unwrap_err();
        assert!(matches!(err, RecipeError::Yaml(_)));
    }

    #[test]
    fn run_constrained_is_accepted() {
        let yaml = "package:\n  name: pkg\n  version: '1.0'\nsource:\n  path: .\nrequirements:\n  run:\n    - python\n  run_constrained:\n    - numpy >=1.15\n";
        let recipe = Recipe::parse(yaml, &linux()).unwrap();
        assert_eq!(recipe.requirements.run_constrained, vec!["numpy >=1.15"]);
        assert_eq!(recipe.all_requirements().count(), 1);
    }

    #[test]
    fn unknown_requirements_key_is_rejected() {
        let yaml = "package:\n  name: pkg\n  version: '1.0'\nsource:\n  path: .\nrequirements:\n  rn:\n    - python\n";
        let err = Recipe::parse(yaml, &linux()).unwrap_err();
        assert!(matches!(err, RecipeError::Yaml(_)));
    }

    #[test]
    fn section_names() {
        assert_eq!("run".parse::<RequirementSection>(), Ok(RequirementSection::Run));
        assert_eq!(
            "test.requires".parse::<RequirementSection>(),
            Ok(RequirementSection::Test)
        );
        assert!("dev".parse::<RequirementSection>().is_err());
        assert_eq!(RequirementSection::Host.to_string(), "requirements.host");
    }
}
