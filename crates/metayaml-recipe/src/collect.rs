//! Requirement grouping for a parsed recipe.
//!
//! This module provides:
//! - Grouping of requirement entries by package name across sections
//! - Duplicate detection within a single requirements list
//! - Detection of packages pinned differently across sections
//! - The set of explicit channels a recipe pulls from
//!
//! Nothing here talks to a channel index. Solving the environment is left to
//! the package manager.

use crate::recipe::{Recipe, RequirementSection};
use crate::spec::{DependencySpec, VersionPin};
use std::collections::BTreeMap;

/// All entries naming one package.
#[derive(Debug, Clone)]
pub struct CollectedRequirement {
    /// The package name.
    pub name: String,
    /// Every entry naming the package, in section then document order.
    pub entries: Vec<(RequirementSection, DependencySpec)>,
}

impl CollectedRequirement {
    /// Sections this package appears in, without repeats.
    #[must_use]
    pub fn sections(&self) -> Vec<RequirementSection> {
        let mut sections: Vec<_> = self.entries.iter().map(|(s, _)| *s).collect();
        sections.sort();
        sections.dedup();
        sections
    }

    /// Number of entries in one section.
    #[must_use]
    pub fn count_in(&self, section: RequirementSection) -> usize {
        self.entries.iter().filter(|(s, _)| *s == section).count()
    }

    /// Distinct version pins across all entries.
    #[must_use]
    pub fn pins(&self) -> Vec<&VersionPin> {
        let mut pins: Vec<&VersionPin> = Vec::new();
        for (_, spec) in &self.entries {
            if let Some(pin) = &spec.version {
                if !pins.contains(&pin) {
                    pins.push(pin);
                }
            }
        }
        pins
    }
}

/// The result of collecting a recipe's requirements.
#[derive(Debug, Clone, Default)]
pub struct CollectedRequirements {
    /// Requirements by package name.
    pub requirements: BTreeMap<String, CollectedRequirement>,
    channels: Vec<String>,
}

impl CollectedRequirements {
    /// Returns true if no requirements were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Returns the number of distinct packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    /// Get a package by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CollectedRequirement> {
        self.requirements.get(name)
    }

    /// Iterate over all packages by name.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &CollectedRequirement)> {
        self.requirements.iter()
    }

    /// Packages listed more than once within the same section.
    pub fn duplicates(&self) -> impl Iterator<Item = (RequirementSection, &CollectedRequirement)> {
        self.requirements.values().flat_map(|req| {
            req.sections()
                .into_iter()
                .filter(move |section| req.count_in(*section) > 1)
                .map(move |section| (section, req))
        })
    }

    /// Packages pinned to more than one version across the recipe.
    pub fn pin_conflicts(&self) -> impl Iterator<Item = &CollectedRequirement> {
        self.requirements
            .values()
            .filter(|req| req.pins().len() > 1)
    }

    /// Explicit channels in first-seen order.
    #[must_use]
    pub fn channels(&self) -> &[String] {
        &self.channels
    }
}

/// Collects requirement entries from a recipe.
#[derive(Debug)]
pub struct Collector {
    include_host: bool,
    include_test: bool,
}

impl Default for Collector {
    fn default() -> Self {
        Self {
            include_host: true,
            include_test: false,
        }
    }
}

impl Collector {
    /// Create a collector for build, host, and run requirements.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Include `requirements.host`.
    #[must_use]
    pub fn with_host(mut self, include: bool) -> Self {
        self.include_host = include;
        self
    }

    /// Include `test.requires`.
    #[must_use]
    pub fn with_test(mut self, include: bool) -> Self {
        self.include_test = include;
        self
    }

    fn includes(&self, section: RequirementSection) -> bool {
        match section {
            RequirementSection::Build | RequirementSection::Run => true,
            RequirementSection::Host => self.include_host,
            RequirementSection::Test => self.include_test,
        }
    }

    /// Group the recipe's requirements by package name.
    #[must_use]
    pub fn collect(&self, recipe: &Recipe) -> CollectedRequirements {
        self.collect_entries(recipe.all_requirements())
    }

    /// Group arbitrary `(section, spec)` entries by package name.
    pub fn collect_entries<'a>(
        &self,
        entries: impl IntoIterator<Item = (RequirementSection, &'a DependencySpec)>,
    ) -> CollectedRequirements {
        let mut collected = CollectedRequirements::default();

        for (section, spec) in entries {
            if !self.includes(section) {
                continue;
            }

            if let Some(channel) = &spec.channel {
                if !collected.channels.contains(channel) {
                    collected.channels.push(channel.clone());
                }
            }

            collected
                .requirements
                .entry(spec.name.clone())
                .or_insert_with(|| CollectedRequirement {
                    name: spec.name.clone(),
                    entries: Vec::new(),
                })
                .entries
                .push((section, spec.clone()));
        }

        collected
    }
}
