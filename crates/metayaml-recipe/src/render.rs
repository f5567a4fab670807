//! Recipe preprocessing: template variables and selector lines.
//!
//! Recipes carry a thin template layer on top of YAML. Rendering turns the
//! raw text into plain YAML for one platform:
//! - `{% set name = "value" %}` lines define variables and are removed
//! - `{{ name }}`, `{{ name|lower }}` and `{{ name|upper }}` are substituted
//! - lines whose `# [selector]` is false for the platform are removed
//!
//! Any other `{{ ... }}` expression or `{% ... %}` block is an error.

use crate::selector::{extract_selector, Platform, Selector, SelectorContext, SelectorError};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors that can occur while rendering a recipe.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("invalid template pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("line {line}: undefined template variable '{name}'")]
    UndefinedVariable { line: usize, name: String },

    #[error("line {line}: unsupported template filter '{filter}'")]
    UnknownFilter { line: usize, filter: String },

    #[error("line {line}: unsupported template block '{text}'")]
    UnsupportedBlock { line: usize, text: String },

    #[error("line {line}: unsupported template expression '{text}'")]
    UnsupportedExpression { line: usize, text: String },

    #[error("line {line}: {source}")]
    Selector {
        line: usize,
        #[source]
        source: SelectorError,
    },
}

/// Everything rendering needs to know about the target.
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Platform and Python version used for selectors.
    pub selectors: SelectorContext,
    /// Predefined template variables. `{% set %}` lines override these.
    pub variables: BTreeMap<String, String>,
}

impl RenderContext {
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self {
            selectors: SelectorContext::new(platform),
            variables: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_python(mut self, major: u32, minor: u32) -> Self {
        self.selectors = self.selectors.with_python(major, minor);
        self
    }

    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn platform(&self) -> Platform {
        self.selectors.platform
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new(Platform::host())
    }
}

/// Compiled template patterns.
struct Patterns {
    set: Regex,
    expr: Regex,
    block: Regex,
}

impl Patterns {
    fn new() -> Result<Self, RenderError> {
        Ok(Self {
            set: Regex::new(
                r#"^\s*\{%-?\s*set\s+([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(?:"([^"]*)"|'([^']*)')\s*-?%\}\s*$"#,
            )?,
            expr: Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?:\|\s*([A-Za-z_]+)\s*)?\}\}")?,
            block: Regex::new(r"\{%.*%\}")?,
        })
    }
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

/// The compiled patterns, built on first use.
fn patterns() -> Result<&'static Patterns, RenderError> {
    if let Some(patterns) = PATTERNS.get() {
        return Ok(patterns);
    }
    let patterns = Patterns::new()?;
    Ok(PATTERNS.get_or_init(|| patterns))
}

/// Render recipe text into plain YAML for the context's platform.
///
/// # Errors
///
/// Returns an error for undefined variables, unsupported template syntax, or
/// selectors that cannot be evaluated.
pub fn render(text: &str, ctx: &RenderContext) -> Result<String, RenderError> {
    let patterns = Patterns::new()?;
    let mut variables = ctx.variables.clone();
    let mut out = String::with_capacity(text.len());
    let mut dropped = 0usize;

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;

        if raw.trim_start().starts_with('#') {
            out.push_str(raw);
            out.push('\n');
            continue;
        }

        if let Some(caps) = patterns.set.captures(raw) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            let value = substitute(&patterns, value, &variables, line)?;
            trace!(line, name = &caps[1], %value, "template variable");
            variables.insert(caps[1].to_string(), value);
            continue;
        }

        if let Some(block) = patterns.block.find(raw) {
            return Err(RenderError::UnsupportedBlock {
                line,
                text: block.as_str().to_string(),
            });
        }

        let (content, selector) = extract_selector(raw);
        if let Some(selector) = selector {
            let keep = selector
                .parse::<Selector>()
                .and_then(|s| s.evaluate(&ctx.selectors))
                .map_err(|source| RenderError::Selector { line, source })?;
            if !keep {
                dropped += 1;
                continue;
            }
        }

        let content = substitute(&patterns, content, &variables, line)?;
        if let Some(text) = leftover_expression(&content) {
            return Err(RenderError::UnsupportedExpression {
                line,
                text: text.to_string(),
            });
        }
        out.push_str(&content);
        out.push('\n');
    }

    debug!(
        platform = %ctx.platform(),
        variables = variables.len(),
        dropped,
        "rendered recipe"
    );
    Ok(out)
}

/// A `{{`/`}}` span that substitution did not consume.
fn leftover_expression(text: &str) -> Option<&str> {
    let start = text.find("{{").or_else(|| text.find("}}"))?;
    let rest = &text[start..];
    let end = rest.find("}}").map_or(rest.len(), |i| i + 2);
    Some(&rest[..end])
}

fn substitute(
    patterns: &Patterns,
    text: &str,
    variables: &BTreeMap<String, String>,
    line: usize,
) -> Result<String, RenderError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in patterns.expr.captures_iter(text) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let name = &caps[1];
        let value = variables
            .get(name)
            .ok_or_else(|| RenderError::UndefinedVariable {
                line,
                name: name.to_string(),
            })?;
        let value = match caps.get(2).map(|m| m.as_str()) {
            None => value.clone(),
            Some("lower") => value.to_lowercase(),
            Some("upper") => value.to_uppercase(),
            Some(filter) => {
                return Err(RenderError::UnknownFilter {
                    line,
                    filter: filter.to_string(),
                })
            }
        };
        out.push_str(&text[last..whole.start]);
        out.push_str(&value);
        last = whole.end;
    }

    out.push_str(&text[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux() -> RenderContext {
        RenderContext::new(Platform::Linux64).with_python(3, 8)
    }

    #[test]
    fn set_and_substitute_variables() {
        let text = r#"{% set name = "AutoChem" %}
{% set version = '0.1.0' %}
package:
  name: {{ name|lower }}
  version: {{ version }}
"#;
        let out = render(text, &linux()).unwrap();
        assert_eq!(out, "package:\n  name: autochem\n  version: 0.1.0\n");
    }

    #[test]
    fn set_values_can_reference_earlier_variables() {
        let text = "{% set base = \"auto\" %}\n{% set name = \"{{ base }}chem\" %}\nname: {{ name }}\n";
        let out = render(text, &linux()).unwrap();
        assert_eq!(out, "name: autochem\n");
    }

    #[test]
    fn context_variables_are_predefined() {
        let ctx = linux().with_variable("build_number", "3");
        let out = render("number: {{ build_number }}\n", &ctx).unwrap();
        assert_eq!(out, "number: 3\n");
    }

    #[test]
    fn selectors_filter_lines() {
        let text = "run:\n  - python\n  - x2z  # [linux]\n  - pywin32  # [win]\n";
        let out = render(text, &linux()).unwrap();
        assert_eq!(out, "run:\n  - python\n  - x2z\n");

        let win = RenderContext::new(Platform::Win64);
        let out = render(text, &win).unwrap();
        assert_eq!(out, "run:\n  - python\n  - pywin32\n");
    }

    #[test]
    fn comments_pass_through() {
        let text = "run:\n  # - openbabel::openbabel=2.4.1\n  - numpy  # needed for arrays\n";
        let out = render(text, &linux()).unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn undefined_variable() {
        let err = render("version: {{ version }}\n", &linux()).unwrap_err();
        assert!(matches!(
            err,
            RenderError::UndefinedVariable { line: 1, ref name } if name == "version"
        ));
    }

    #[test]
    fn unknown_filter() {
        let text = "{% set name = \"x\" %}\nname: {{ name|title }}\n";
        let err = render(text, &linux()).unwrap_err();
        assert!(matches!(err, RenderError::UnknownFilter { line: 2, .. }));
    }

    #[test]
    fn unsupported_block() {
        let err = render("{% if win %}\n", &linux()).unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedBlock { line: 1, .. }));
    }

    #[test]
    fn unsupported_expressions() {
        let err = render("script: \"{{ compiler('c') }}\"\n", &linux()).unwrap_err();
        assert!(matches!(
            err,
            RenderError::UnsupportedExpression { line: 1, ref text } if text == "{{ compiler('c') }}"
        ));

        let text = "{% set name = \"auto-chem\" %}\nname: {{ name }}\nimport: {{ name|replace(\"-\", \"_\") }}\n";
        let err = render(text, &linux()).unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedExpression { line: 3, .. }));

        let err = render("run:\n  - {{ pin_compatible('numpy') }}\n", &linux()).unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedExpression { line: 2, .. }));
    }

    #[test]
    fn commented_out_lines_are_not_evaluated() {
        let text = "run:\n  # - foo  # [solaris]\n  # - {{ compiler('c') }}\n  - numpy\n";
        let out = render(text, &linux()).unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn patterns_are_compiled_once() {
        let first = patterns().unwrap();
        let second = patterns().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn bad_selector_reports_line() {
        let err = render("a: 1\nb: 2  # [solaris]\n", &linux()).unwrap_err();
        assert!(matches!(err, RenderError::Selector { line: 2, .. }));
    }
}
