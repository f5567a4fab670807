//! Line-preserving edits to requirement lists.
//!
//! Edits work on the recipe text rather than a parsed document, so comments,
//! selectors, template expressions and key order all survive.

use crate::recipe::RequirementSection;
use crate::selector::extract_selector;
use crate::spec::DependencySpec;
use thiserror::Error;

/// Errors that can occur when editing a recipe.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("'{name}' is already listed in {section}")]
    AlreadyPresent {
        name: String,
        section: RequirementSection,
    },

    #[error("'{name}' not found in {section}")]
    NotFound {
        name: String,
        section: RequirementSection,
    },

    #[error("{0} is not a block list and cannot be edited")]
    Unsupported(RequirementSection),
}

/// A `key:` line and the lines nested under it.
struct Block {
    line: usize,
    indent: usize,
    end: usize,
}

/// A block-style list under a key.
struct List {
    key: Block,
    /// Indices of active (uncommented) item lines.
    items: Vec<usize>,
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn is_skippable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Split a mapping line into its key and inline value (comments removed).
fn key_of(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.starts_with('-') || trimmed.starts_with('#') {
        return None;
    }
    let (key, rest) = trimmed.split_once(':')?;
    let rest = rest.trim();
    let rest = if rest.starts_with('#') { "" } else { rest };
    Some((key.trim(), rest))
}

fn section_path(section: RequirementSection) -> (&'static str, &'static str) {
    match section {
        RequirementSection::Build => ("requirements", "build"),
        RequirementSection::Host => ("requirements", "host"),
        RequirementSection::Run => ("requirements", "run"),
        RequirementSection::Test => ("test", "requires"),
    }
}

/// Find the top-level block for `key`.
fn find_top(lines: &[&str], key: &str) -> Option<Block> {
    let line = lines
        .iter()
        .position(|l| indent_of(l) == 0 && key_of(l).is_some_and(|(k, _)| k == key))?;
    let end = (line + 1..lines.len())
        .find(|&i| !is_skippable(lines[i]) && indent_of(lines[i]) == 0)
        .unwrap_or(lines.len());
    Some(Block {
        line,
        indent: 0,
        end,
    })
}

/// Indentation of the first nested key under a block.
fn child_indent(lines: &[&str], parent: &Block) -> Option<usize> {
    (parent.line + 1..parent.end)
        .map(|i| lines[i])
        .find(|l| !is_skippable(l))
        .map(indent_of)
}

/// Find the list for `key` inside `parent`.
fn find_list(
    lines: &[&str],
    parent: &Block,
    key: &str,
    section: RequirementSection,
) -> Result<Option<List>, EditError> {
    let Some(indent) = child_indent(lines, parent) else {
        return Ok(None);
    };
    let Some(line) = (parent.line + 1..parent.end).find(|&i| {
        indent_of(lines[i]) == indent && key_of(lines[i]).is_some_and(|(k, _)| k == key)
    }) else {
        return Ok(None);
    };

    if key_of(lines[line]).is_some_and(|(_, rest)| !rest.is_empty()) {
        return Err(EditError::Unsupported(section));
    }

    let mut items = Vec::new();
    let mut end = line + 1;
    for (i, l) in lines.iter().enumerate().take(parent.end).skip(line + 1) {
        if is_skippable(l) {
            continue;
        }
        let nested = indent_of(l) > indent;
        let same_level_item = indent_of(l) == indent && l.trim_start().starts_with('-');
        if !nested && !same_level_item {
            break;
        }
        if l.trim_start().starts_with('-') {
            items.push(i);
        }
        end = i + 1;
    }

    Ok(Some(List {
        key: Block { line, indent, end },
        items,
    }))
}

/// Package name of a list item line, if it parses.
fn item_name(line: &str) -> Option<String> {
    let body = line.trim_start().strip_prefix('-')?.trim();
    let (content, _) = extract_selector(body);
    let content = content.trim().trim_matches(|c| c == '\'' || c == '"');
    content
        .parse::<DependencySpec>()
        .ok()
        .map(|spec| spec.name)
}

fn join(lines: &[String], trailing_newline: bool) -> String {
    let mut out = lines.join("\n");
    if trailing_newline {
        out.push('\n');
    }
    out
}

/// Append a dependency to a requirements list.
///
/// Missing `requirements:` / `test:` blocks and list keys are created.
///
/// # Errors
///
/// Returns an error if the package is already listed in the section, or the
/// section is written in flow style (`run: [a, b]`).
pub fn add_requirement(
    text: &str,
    section: RequirementSection,
    spec: &DependencySpec,
) -> Result<String, EditError> {
    let (top_key, list_key) = section_path(section);
    let lines: Vec<&str> = text.lines().collect();
    let trailing_newline = text.is_empty() || text.ends_with('\n');
    let mut out: Vec<String> = lines.iter().map(|l| (*l).to_string()).collect();

    let Some(top) = find_top(&lines, top_key) else {
        if out.last().is_some_and(|l| !l.trim().is_empty()) {
            out.push(String::new());
        }
        out.push(format!("{top_key}:"));
        out.push(format!("  {list_key}:"));
        out.push(format!("    - {spec}"));
        return Ok(join(&out, true));
    };

    match find_list(&lines, &top, list_key, section)? {
        Some(list) => {
            if list
                .items
                .iter()
                .any(|&i| item_name(lines[i]).as_deref() == Some(spec.name.as_str()))
            {
                return Err(EditError::AlreadyPresent {
                    name: spec.name.clone(),
                    section,
                });
            }
            let item_indent = list
                .items
                .first()
                .map_or(list.key.indent + 2, |&i| indent_of(lines[i]));
            let at = list.items.last().map_or(list.key.line + 1, |&i| i + 1);
            out.insert(at, format!("{}- {spec}", " ".repeat(item_indent)));
        }
        None => {
            let indent = child_indent(&lines, &top).unwrap_or(top.indent + 2);
            let at = (top.line + 1..top.end)
                .rev()
                .find(|&i| !is_skippable(lines[i]))
                .map_or(top.line + 1, |i| i + 1);
            out.insert(at, format!("{}{list_key}:", " ".repeat(indent)));
            out.insert(at + 1, format!("{}- {spec}", " ".repeat(indent + 2)));
        }
    }

    Ok(join(&out, trailing_newline))
}

/// Remove every active entry for `name` from a requirements list.
///
/// Commented-out entries are left in place.
///
/// # Errors
///
/// Returns an error if no active entry names the package.
pub fn remove_requirement(
    text: &str,
    section: RequirementSection,
    name: &str,
) -> Result<String, EditError> {
    let (top_key, list_key) = section_path(section);
    let lines: Vec<&str> = text.lines().collect();
    let not_found = || EditError::NotFound {
        name: name.to_string(),
        section,
    };

    let top = find_top(&lines, top_key).ok_or_else(not_found)?;
    let list = find_list(&lines, &top, list_key, section)?.ok_or_else(not_found)?;

    let doomed: Vec<usize> = list
        .items
        .iter()
        .copied()
        .filter(|&i| item_name(lines[i]).as_deref() == Some(name))
        .collect();
    if doomed.is_empty() {
        return Err(not_found());
    }

    let out: Vec<String> = lines
        .iter()
        .enumerate()
        .filter(|(i, _)| !doomed.contains(i))
        .map(|(_, l)| (*l).to_string())
        .collect();
    Ok(join(&out, text.ends_with('\n')))
}

/// Sections whose list has an active entry for `name`.
#[must_use]
pub fn sections_containing(text: &str, name: &str) -> Vec<RequirementSection> {
    let lines: Vec<&str> = text.lines().collect();

    RequirementSection::ALL
        .into_iter()
        .filter(|&section| {
            let (top_key, list_key) = section_path(section);
            find_top(&lines, top_key)
                .and_then(|top| find_list(&lines, &top, list_key, section).ok().flatten())
                .is_some_and(|list| {
                    list.items
                        .iter()
                        .any(|&i| item_name(lines[i]).as_deref() == Some(name))
                })
        })
        .collect()
}
