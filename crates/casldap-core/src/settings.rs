//! LDAP settings
//!
//! Loaded once at startup and shared read-only (`Arc<LdapSettings>`) by the
//! connection, search and resolver layers. Field names also accept the
//! upper-case spellings (`SERVERS`, `SEARCH_BASE`, ...) used by older
//! deployments.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CasLdapError, Result, SearchError};
use crate::filter::validate_filter_template;
use crate::mapping::AttributeMap;

/// Placeholder replaced by the identity token in `search_filter`
pub const USER_PLACEHOLDER: &str = "%(user)s";

/// Attribute selector meaning "every user attribute"
pub const ALL_ATTRIBUTES: &str = "*";

const LDAPS_PORT: u16 = 636;

#[derive(Clone, Serialize, Deserialize)]
pub struct LdapSettings {
    /// Directory servers, tried in round-robin order
    #[serde(alias = "SERVERS")]
    pub servers: Vec<String>,

    #[serde(default, alias = "BIND_DN")]
    pub bind_dn: Option<String>,

    #[serde(default, alias = "BIND_PASSWORD", skip_serializing)]
    pub bind_password: Option<String>,

    /// Attributes requested by default
    #[serde(default, alias = "ATTRIBUTES")]
    pub attributes: Option<Vec<String>>,

    #[serde(default, alias = "SEARCH_BASE")]
    pub search_base: Option<String>,

    /// Filter template, e.g. `(uid=%(user)s)`
    #[serde(default, alias = "SEARCH_FILTER")]
    pub search_filter: Option<String>,

    #[serde(default, alias = "ATTRIBUTE_MAP")]
    pub attribute_map: Option<AttributeMap>,

    /// Name of a registered post-population hook
    #[serde(default, alias = "EXTRA_USER_INIT")]
    pub extra_user_init: Option<String>,

    #[serde(default)]
    pub pool: PoolSettings,

    /// Upgrade `ldap://` servers with StartTLS
    #[serde(default)]
    pub start_tls: bool,

    /// Skip TLS certificate verification (not recommended)
    #[serde(default)]
    pub skip_tls_verify: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl fmt::Debug for LdapSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapSettings")
            .field("servers", &self.servers)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "<redacted>"),
            )
            .field("attributes", &self.attributes)
            .field("search_base", &self.search_base)
            .field("search_filter", &self.search_filter)
            .field("attribute_map", &self.attribute_map)
            .field("extra_user_init", &self.extra_user_init)
            .field("pool", &self.pool)
            .field("start_tls", &self.start_tls)
            .field("skip_tls_verify", &self.skip_tls_verify)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl LdapSettings {
    /// Settings with servers only; lookup options unset.
    pub fn new<I, S>(servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            servers: servers.into_iter().map(Into::into).collect(),
            bind_dn: None,
            bind_password: None,
            attributes: None,
            search_base: None,
            search_filter: None,
            attribute_map: None,
            extra_user_init: None,
            pool: PoolSettings::default(),
            start_tls: false,
            skip_tls_verify: false,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Credentials used to bind: simple bind when both DN and password are
    /// set, anonymous otherwise.
    pub fn bind_credentials(&self) -> BindCredentials {
        match (non_empty(&self.bind_dn), non_empty(&self.bind_password)) {
            (Some(dn), Some(password)) => BindCredentials::Simple {
                dn: dn.to_string(),
                password: password.to_string(),
            },
            _ => BindCredentials::Anonymous,
        }
    }

    /// One descriptor per configured server, in configuration order.
    pub fn server_descriptors(&self) -> Result<Vec<ServerDescriptor>> {
        self.servers
            .iter()
            .map(|address| ServerDescriptor::parse(address, self.start_tls))
            .collect()
    }

    /// Search parameters for a user lookup.
    ///
    /// A normal lookup needs `attributes`, `search_base` and `search_filter`;
    /// a fetch-all lookup only needs base and filter.
    pub fn lookup_criteria(&self, fetch_all: bool) -> std::result::Result<SearchCriteria, SearchError> {
        let base = non_empty(&self.search_base).ok_or(SearchError::NotConfigured)?;
        let filter = non_empty(&self.search_filter).ok_or(SearchError::NotConfigured)?;

        let attributes = if fetch_all {
            AttributeSelection::All
        } else {
            match &self.attributes {
                Some(attrs) => AttributeSelection::Listed(attrs.clone()),
                None => return Err(SearchError::NotConfigured),
            }
        };

        Ok(SearchCriteria {
            base: base.to_string(),
            filter_template: filter.to_string(),
            attributes,
        })
    }

    /// The configured attribute map, if any. An empty map counts as unset.
    pub fn attribute_map(&self) -> Option<&AttributeMap> {
        self.attribute_map.as_ref().filter(|map| !map.is_empty())
    }

    /// Mapped attributes that a default lookup does not request. These always
    /// resolve as absent unless `attributes` lists them or uses `*`.
    pub fn unrequested_mapped_attributes(&self) -> Vec<String> {
        let (Some(map), Some(requested)) = (self.attribute_map(), &self.attributes) else {
            return vec![];
        };
        if requested.iter().any(|a| a == ALL_ATTRIBUTES) {
            return vec![];
        }

        map.source_attributes()
            .into_iter()
            .filter(|name| !requested.iter().any(|r| r.eq_ignore_ascii_case(name)))
            .map(str::to_string)
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(CasLdapError::config_error(
                "at least one LDAP server must be configured",
            ));
        }
        self.server_descriptors()?;

        if non_empty(&self.bind_dn).is_some() != non_empty(&self.bind_password).is_some() {
            return Err(CasLdapError::config_error(
                "bind_dn and bind_password must be set together",
            ));
        }

        if let Some(filter) = &self.search_filter {
            validate_filter_template(filter)?;
        }

        if let Some(map) = &self.attribute_map {
            map.validate()?;
        }

        if self.pool.exhaust == 0 {
            return Err(CasLdapError::config_error("pool.exhaust must be at least 1"));
        }

        Ok(())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[derive(Clone, PartialEq, Eq)]
pub enum BindCredentials {
    Anonymous,
    Simple { dn: String, password: String },
}

impl BindCredentials {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl fmt::Debug for BindCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Simple { dn, .. } => f
                .debug_struct("Simple")
                .field("dn", dn)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Server selection policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStrategy {
    #[default]
    RoundRobin,
    First,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    #[serde(default)]
    pub strategy: PoolStrategy,
    /// Keep cycling through servers until each one has exhausted its budget.
    /// When false, the pool makes one pass over the servers.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Failed attempts after which a server is skipped
    #[serde(default = "default_exhaust")]
    pub exhaust: u32,
}

fn default_true() -> bool {
    true
}

fn default_exhaust() -> u32 {
    5
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            strategy: PoolStrategy::RoundRobin,
            active: true,
            exhaust: default_exhaust(),
        }
    }
}

/// How the transport to a server is secured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportSecurity {
    /// TLS from the first byte (`ldaps://`)
    Ldaps,
    /// Plain connection upgraded with StartTLS before bind
    StartTls,
}

/// One directory server in the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Address as configured
    pub address: String,
    /// URL used to connect
    pub url: String,
    pub security: TransportSecurity,
    /// Read the root DSE after bind
    pub fetch_server_info: bool,
}

impl ServerDescriptor {
    /// Bare host names become `ldaps://host:636`. Plain `ldap://` URLs are only
    /// accepted when StartTLS is enabled.
    pub fn parse(address: &str, start_tls: bool) -> Result<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(CasLdapError::config_error("empty LDAP server address"));
        }

        let (url, security) = if let Some(rest) = address.strip_prefix("ldaps://") {
            if rest.is_empty() {
                return Err(CasLdapError::config_error(format!(
                    "invalid LDAP server address: {}",
                    address
                )));
            }
            (address.to_string(), TransportSecurity::Ldaps)
        } else if address.starts_with("ldap://") {
            if !start_tls {
                return Err(CasLdapError::config_error(format!(
                    "{} is not a secure transport; use ldaps:// or enable start_tls",
                    address
                )));
            }
            (address.to_string(), TransportSecurity::StartTls)
        } else if address.contains("://") {
            return Err(CasLdapError::config_error(format!(
                "unsupported LDAP URL scheme: {}",
                address
            )));
        } else if address.contains(':') {
            (format!("ldaps://{}", address), TransportSecurity::Ldaps)
        } else {
            (
                format!("ldaps://{}:{}", address, LDAPS_PORT),
                TransportSecurity::Ldaps,
            )
        };

        Ok(Self {
            address: address.to_string(),
            url,
            security,
            fetch_server_info: true,
        })
    }
}

impl fmt::Display for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Which attributes a search asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeSelection {
    All,
    Listed(Vec<String>),
}

impl AttributeSelection {
    /// Attribute list in the form sent on the wire
    pub fn to_request(&self) -> Vec<String> {
        match self {
            Self::All => vec![ALL_ATTRIBUTES.to_string()],
            Self::Listed(attrs) => attrs.clone(),
        }
    }
}

/// Base, filter template and attributes for one lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
    pub base: String,
    pub filter_template: String,
    pub attributes: AttributeSelection,
}
