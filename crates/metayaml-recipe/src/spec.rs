//! Dependency specification strings.
//!
//! Each entry of a requirements list follows the grammar
//! ```text
//! (channel "::")? name (("=" | "==") version | ws constraint)? (ws "# [" selector "]")?
//! ```
//! for example `psi4::psi4`, `numpy=1.15.4`, `python >=3.6` or
//! `pywin32  # [win]`.

use crate::selector::{extract_selector, Selector, SelectorError};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing a dependency spec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("dependency spec is empty")]
    Empty,

    #[error("empty channel before '::' in '{0}'")]
    EmptyChannel(String),

    #[error("invalid channel '{0}': {1}")]
    InvalidChannel(String, &'static str),

    #[error("missing package name in '{0}'")]
    EmptyName(String),

    #[error("invalid package name '{0}': {1}")]
    InvalidName(String, &'static str),

    #[error("missing version in '{0}'")]
    EmptyVersion(String),

    #[error("invalid version '{0}': {1}")]
    InvalidVersion(String, &'static str),

    #[error("invalid selector: {0}")]
    Selector(#[from] SelectorError),
}

/// How a version was attached to the package name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PinKind {
    /// `name=1.15`: any version starting with `1.15`.
    Fuzzy,
    /// `name==1.15.4`: exactly this version.
    Exact,
    /// `name >=1.2,<2`: a free-form match-spec constraint.
    Constraint,
}

/// A version attached to a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VersionPin {
    pub kind: PinKind,
    pub constraint: String,
}

impl VersionPin {
    #[must_use]
    pub fn fuzzy(version: impl Into<String>) -> Self {
        Self {
            kind: PinKind::Fuzzy,
            constraint: version.into(),
        }
    }

    #[must_use]
    pub fn exact(version: impl Into<String>) -> Self {
        Self {
            kind: PinKind::Exact,
            constraint: version.into(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.constraint
    }
}

impl fmt::Display for VersionPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PinKind::Fuzzy => write!(f, "={}", self.constraint),
            PinKind::Exact => write!(f, "=={}", self.constraint),
            PinKind::Constraint => write!(f, " {}", self.constraint),
        }
    }
}

/// A single requirement entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencySpec {
    /// Channel qualifier (`psi4` in `psi4::psi4`).
    pub channel: Option<String>,
    /// Package name, always non-empty.
    pub name: String,
    /// Pinned version or constraint.
    pub version: Option<VersionPin>,
    /// Platform selector carried on the entry.
    pub selector: Option<Selector>,
}

impl DependencySpec {
    /// Create an unpinned, channel-less spec.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or contains invalid characters.
    pub fn new(name: impl Into<String>) -> Result<Self, SpecError> {
        let name = name.into();
        validate_name(&name, &name)?;
        Ok(Self {
            channel: None,
            name,
            version: None,
            selector: None,
        })
    }

    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: VersionPin) -> Self {
        self.version = Some(version);
        self
    }

    /// The pinned version text without its operator, if any.
    #[must_use]
    pub fn version_str(&self) -> Option<&str> {
        self.version.as_ref().map(VersionPin::as_str)
    }

    /// Returns true if the spec names an explicit channel.
    #[must_use]
    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(channel) = &self.channel {
            write!(f, "{channel}::")?;
        }
        f.write_str(&self.name)?;
        if let Some(version) = &self.version {
            write!(f, "{version}")?;
        }
        if let Some(selector) = &self.selector {
            write!(f, "  # [{selector}]")?;
        }
        Ok(())
    }
}

impl FromStr for DependencySpec {
    type Err = SpecError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (content, selector) = extract_selector(input);
        let selector = selector.map(str::parse::<Selector>).transpose()?;

        let text = content.trim();
        if text.is_empty() {
            return Err(SpecError::Empty);
        }

        let (channel, rest) = match text.split_once("::") {
            Some((channel, rest)) => {
                validate_channel(channel, text)?;
                (Some(channel.to_string()), rest)
            }
            None => (None, text),
        };

        let name_end = rest
            .find(|c: char| c == '=' || c.is_whitespace() || "<>!~".contains(c))
            .unwrap_or(rest.len());
        let (name, tail) = rest.split_at(name_end);
        validate_name(name, text)?;

        let version = parse_version(tail, text)?;

        Ok(Self {
            channel,
            name: name.to_string(),
            version,
            selector,
        })
    }
}

fn validate_channel(channel: &str, spec: &str) -> Result<(), SpecError> {
    if channel.is_empty() {
        return Err(SpecError::EmptyChannel(spec.to_string()));
    }
    if channel.starts_with('/') || channel.ends_with('/') {
        return Err(SpecError::InvalidChannel(
            channel.to_string(),
            "channel cannot start or end with '/'",
        ));
    }
    for c in channel.chars() {
        if !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '.' | '/') {
            return Err(SpecError::InvalidChannel(
                channel.to_string(),
                "channel can only contain letters, numbers, '-', '_', '.', and '/'",
            ));
        }
    }
    Ok(())
}

/// Validate a conda package name.
pub(crate) fn validate_name(name: &str, spec: &str) -> Result<(), SpecError> {
    let Some(first) = name.chars().next() else {
        return Err(SpecError::EmptyName(spec.to_string()));
    };

    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return Err(SpecError::InvalidName(
            name.to_string(),
            "name must start with a lowercase letter or digit",
        ));
    }

    for c in name.chars() {
        if c.is_ascii_uppercase() {
            return Err(SpecError::InvalidName(
                name.to_string(),
                "name must be lowercase",
            ));
        }
        if !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '.') {
            return Err(SpecError::InvalidName(
                name.to_string(),
                "name can only contain letters, numbers, '-', '_', and '.'",
            ));
        }
    }

    Ok(())
}

fn parse_version(tail: &str, spec: &str) -> Result<Option<VersionPin>, SpecError> {
    if tail.is_empty() {
        return Ok(None);
    }

    let (kind, constraint) = if let Some(v) = tail.strip_prefix("==") {
        (PinKind::Exact, v)
    } else if let Some(v) = tail.strip_prefix('=') {
        (PinKind::Fuzzy, v)
    } else {
        (PinKind::Constraint, tail.trim())
    };

    if constraint.is_empty() {
        return Err(SpecError::EmptyVersion(spec.to_string()));
    }

    if kind != PinKind::Constraint && constraint.chars().any(char::is_whitespace) {
        return Err(SpecError::InvalidVersion(
            constraint.to_string(),
            "version cannot contain whitespace",
        ));
    }

    for c in constraint.chars() {
        if !c.is_ascii_alphanumeric() && !"._*+!<>=,|~ ".contains(c) {
            return Err(SpecError::InvalidVersion(
                constraint.to_string(),
                "version contains an unsupported character",
            ));
        }
    }

    Ok(Some(VersionPin {
        kind,
        constraint: constraint.to_string(),
    }))
}
