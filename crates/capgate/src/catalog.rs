//! Context catalog: named bundles of capabilities and presets over them.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// A named group of capability names that are needed together.
///
/// Members keep their insertion order with duplicates removed, so the order
/// in which the manager first observes them is stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextGroup {
    /// Context name, e.g. `"documentation"`.
    pub name: String,
    members: Vec<String>,
}

impl ContextGroup {
    /// Build a group from its members.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let members = members
            .into_iter()
            .map(Into::into)
            .filter(|m: &String| seen.insert(m.clone()))
            .collect();
        Self {
            name: name.into(),
            members,
        }
    }

    /// Members in insertion order.
    #[must_use]
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Whether `name` belongs to the group.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|m| m == name)
    }

    /// Number of distinct members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Context groups and presets by name.
#[derive(Debug, Default, Clone)]
pub struct ContextCatalog {
    groups: HashMap<String, ContextGroup>,
    presets: HashMap<String, Vec<String>>,
}

impl ContextCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a group, returning the previous one.
    pub fn insert_group(&mut self, group: ContextGroup) -> Option<ContextGroup> {
        self.groups.insert(group.name.clone(), group)
    }

    /// Remove a group.
    pub fn remove_group(&mut self, name: &str) -> Option<ContextGroup> {
        self.groups.remove(name)
    }

    /// Look up a group.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&ContextGroup> {
        self.groups.get(name)
    }

    /// Group names, sorted.
    #[must_use]
    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Members of every named context. Unknown contexts contribute nothing.
    pub fn members_of<'a>(
        &'a self,
        contexts: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = &'a String> + 'a {
        contexts
            .iter()
            .filter_map(|c| self.groups.get(c))
            .flat_map(|g| g.members.iter())
    }

    /// Insert or replace a preset.
    pub fn insert_preset(&mut self, name: impl Into<String>, contexts: Vec<String>) {
        self.presets.insert(name.into(), contexts);
    }

    /// Contexts turned on by a preset.
    #[must_use]
    pub fn preset(&self, name: &str) -> Option<&[String]> {
        self.presets.get(name).map(Vec::as_slice)
    }

    /// Preset names, sorted.
    #[must_use]
    pub fn preset_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.presets.keys().cloned().collect();
        names.sort();
        names
    }
}
