//! Declarative grouping of `(source, category)` distributions into named composites.
//!
//! Group order is stack order: the first group is drawn at the bottom of the
//! stacked prediction.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One category distribution within one source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryRef {
    pub source: String,
    pub category: String,
}

impl CategoryRef {
    pub fn new(source: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            category: category.into(),
        }
    }
}

impl std::fmt::Display for CategoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.source, self.category)
    }
}

/// A named composite and its members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    /// Legend text; falls back to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub members: Vec<CategoryRef>,
}

impl GroupSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            members: Vec::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn member(mut self, source: impl Into<String>, category: impl Into<String>) -> Self {
        self.members.push(CategoryRef::new(source, category));
        self
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Ordered list of groups.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupingPolicy {
    groups: Vec<GroupSpec>,
}

impl GroupingPolicy {
    pub fn new(groups: Vec<GroupSpec>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[GroupSpec] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Name of the group that contains `member`, if any.
    pub fn group_of(&self, member: &CategoryRef) -> Option<&str> {
        self.groups
            .iter()
            .find(|g| g.members.contains(member))
            .map(|g| g.name.as_str())
    }

    /// Every member of every group, in stack order.
    pub fn members(&self) -> impl Iterator<Item = &CategoryRef> {
        self.groups.iter().flat_map(|g| g.members.iter())
    }

    /// Distinct source ids referenced by the policy.
    pub fn sources(&self) -> BTreeSet<&str> {
        self.members().map(|m| m.source.as_str()).collect()
    }

    /// Reject policies that cannot produce a prediction.
    ///
    /// Requires at least one group, unique non-empty group names, at least one
    /// member per group, and each `(source, category)` in at most one group.
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(Error::Config("grouping policy has no groups".to_string()));
        }

        let mut names = BTreeSet::new();
        let mut owner: HashMap<&CategoryRef, &str> = HashMap::new();
        for group in &self.groups {
            if group.name.is_empty() {
                return Err(Error::Config("group with an empty name".to_string()));
            }
            if !names.insert(group.name.as_str()) {
                return Err(Error::Config(format!("duplicate group '{}'", group.name)));
            }
            if group.members.is_empty() {
                return Err(Error::EmptyGroup(group.name.clone()));
            }
            for member in &group.members {
                if let Some(prev) = owner.insert(member, group.name.as_str()) {
                    return Err(Error::Config(format!(
                        "{member} is listed in both '{prev}' and '{}'",
                        group.name
                    )));
                }
            }
        }
        Ok(())
    }
}
