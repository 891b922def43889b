//! Directory entries and server capabilities as returned by a lookup

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A read-only bag of attributes for exactly one directory match.
///
/// Attribute names are matched case-insensitively, as LDAP does. An attribute
/// that was returned with no values is treated the same as one that was not
/// returned at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub dn: String,
    attrs: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    bin_attrs: BTreeMap<String, Vec<Vec<u8>>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            ..Self::default()
        }
    }

    pub fn from_parts(
        dn: impl Into<String>,
        attrs: impl IntoIterator<Item = (String, Vec<String>)>,
        bin_attrs: impl IntoIterator<Item = (String, Vec<Vec<u8>>)>,
    ) -> Self {
        Self {
            dn: dn.into(),
            attrs: attrs.into_iter().collect(),
            bin_attrs: bin_attrs.into_iter().collect(),
        }
    }

    pub fn with_attr<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attrs
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_bin_attr(mut self, name: impl Into<String>, values: Vec<Vec<u8>>) -> Self {
        self.bin_attrs.insert(name.into(), values);
        self
    }

    /// All textual values of an attribute, or `None` when it is absent.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        let values = match self.attrs.get(name) {
            Some(values) => values,
            None => {
                self.attrs
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))?
                    .1
            }
        };

        if values.is_empty() {
            None
        } else {
            Some(values.as_slice())
        }
    }

    /// The value used when an attribute is copied onto a single field.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)?.first().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn bin_values(&self, name: &str) -> Option<&[Vec<u8>]> {
        self.bin_attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
            .filter(|values| !values.is_empty())
    }

    /// Textual attributes in name order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.attrs
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Binary attributes in name order
    pub fn binary_attributes(&self) -> impl Iterator<Item = (&str, &[Vec<u8>])> {
        self.bin_attrs
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty() && self.bin_attrs.is_empty()
    }
}

/// Capabilities advertised by a server's root DSE
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub supported_ldap_versions: Vec<String>,
    pub naming_contexts: Vec<String>,
    pub supported_controls: Vec<String>,
    pub supported_extensions: Vec<String>,
    pub vendor_name: Option<String>,
    pub vendor_version: Option<String>,
}

impl ServerInfo {
    /// Root DSE attributes requested during capability negotiation
    pub const ROOT_DSE_ATTRIBUTES: [&'static str; 6] = [
        "supportedLDAPVersion",
        "namingContexts",
        "supportedControl",
        "supportedExtension",
        "vendorName",
        "vendorVersion",
    ];

    pub fn from_root_dse(entry: &DirectoryEntry) -> Self {
        let list = |name: &str| entry.get(name).map(<[String]>::to_vec).unwrap_or_default();

        Self {
            supported_ldap_versions: list("supportedLDAPVersion"),
            naming_contexts: list("namingContexts"),
            supported_controls: list("supportedControl"),
            supported_extensions: list("supportedExtension"),
            vendor_name: entry.first("vendorName").map(str::to_string),
            vendor_version: entry.first("vendorVersion").map(str::to_string),
        }
    }

    pub fn supports_v3(&self) -> bool {
        self.supported_ldap_versions.iter().any(|v| v.trim() == "3")
    }
}
