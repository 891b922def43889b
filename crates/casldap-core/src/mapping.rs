//! Declarative mapping from local user fields to directory attributes
//!
//! In TOML this reads naturally:
//!
//! ```toml
//! [ldap.attribute_map]
//! first_name = "givenName"
//! email = ["mail", "eduPersonPrincipalName"]
//!
//! [ldap.attribute_map.profile]
//! phone = "telephoneNumber"
//! title = ["title", "ou"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{btree_map, BTreeMap, BTreeSet};

use crate::directory::DirectoryEntry;
use crate::error::{CasLdapError, Result};

/// Where a single local value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeSource {
    /// One directory attribute
    Single(String),
    /// Ordered fallback chain; the first attribute present on the entry wins
    Chain(Vec<String>),
}

impl AttributeSource {
    pub fn candidates(&self) -> &[String] {
        match self {
            Self::Single(name) => std::slice::from_ref(name),
            Self::Chain(names) => names,
        }
    }

    /// The first candidate present on the entry, with its value.
    pub fn resolve_present<'e>(&self, entry: &'e DirectoryEntry) -> Option<(&str, &'e str)> {
        self.candidates()
            .iter()
            .find_map(|name| entry.first(name).map(|value| (name.as_str(), value)))
    }

    /// Resolve to a field value. Absence everywhere yields an empty string so
    /// that a stale value never survives a repopulate.
    pub fn resolve(&self, entry: &DirectoryEntry) -> String {
        self.resolve_present(entry)
            .map(|(_, value)| value.to_string())
            .unwrap_or_default()
    }
}

impl From<&str> for AttributeSource {
    fn from(name: &str) -> Self {
        Self::Single(name.to_string())
    }
}

impl From<Vec<&str>> for AttributeSource {
    fn from(names: Vec<&str>) -> Self {
        Self::Chain(names.into_iter().map(str::to_string).collect())
    }
}

/// Mapping for one local field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldMapping {
    Attribute(AttributeSource),
    /// The local field is a related sub-record; each sub-field has its own source
    Nested(BTreeMap<String, AttributeSource>),
}

/// Local field name -> directory source. Iteration order is by field name, so
/// resolution is deterministic for a fixed entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap(BTreeMap<String, FieldMapping>);

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: impl Into<String>, source: impl Into<AttributeSource>) -> Self {
        self.0
            .insert(field.into(), FieldMapping::Attribute(source.into()));
        self
    }

    pub fn with_nested<I, K, S>(mut self, field: impl Into<String>, sub_fields: I) -> Self
    where
        I: IntoIterator<Item = (K, S)>,
        K: Into<String>,
        S: Into<AttributeSource>,
    {
        let nested = sub_fields
            .into_iter()
            .map(|(k, s)| (k.into(), s.into()))
            .collect();
        self.0.insert(field.into(), FieldMapping::Nested(nested));
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldMapping> {
        self.0.get(field)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FieldMapping> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every directory attribute the mapping may read
    pub fn source_attributes(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        for mapping in self.0.values() {
            match mapping {
                FieldMapping::Attribute(source) => {
                    names.extend(source.candidates().iter().map(String::as_str));
                }
                FieldMapping::Nested(sub) => {
                    for source in sub.values() {
                        names.extend(source.candidates().iter().map(String::as_str));
                    }
                }
            }
        }
        names
    }

    pub fn validate(&self) -> Result<()> {
        for (field, mapping) in &self.0 {
            if field.trim().is_empty() {
                return Err(CasLdapError::config_error(
                    "attribute_map contains an empty field name",
                ));
            }
            if field == "username" || field == "id" {
                return Err(CasLdapError::config_error(format!(
                    "attribute_map may not overwrite the `{}` field",
                    field
                )));
            }
            match mapping {
                FieldMapping::Attribute(source) => validate_source(field, source)?,
                FieldMapping::Nested(sub) => {
                    if sub.is_empty() {
                        return Err(CasLdapError::config_error(format!(
                            "attribute_map.{} is an empty nested mapping",
                            field
                        )));
                    }
                    for (sub_field, source) in sub {
                        validate_source(&format!("{}.{}", field, sub_field), source)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a AttributeMap {
    type Item = (&'a String, &'a FieldMapping);
    type IntoIter = btree_map::Iter<'a, String, FieldMapping>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn validate_source(field: &str, source: &AttributeSource) -> Result<()> {
    let candidates = source.candidates();
    if candidates.is_empty() || candidates.iter().any(|c| c.trim().is_empty()) {
        return Err(CasLdapError::config_error(format!(
            "attribute_map.{} must name at least one non-empty directory attribute",
            field
        )));
    }
    Ok(())
}
