//! Error types for casldap

use thiserror::Error;

/// Failures of a single-identity directory lookup.
///
/// None of these are transient; callers must not retry them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("requested LDAP lookup on empty identity token")]
    EmptyKey,

    #[error("LDAP is not configured for user lookup")]
    NotConfigured,

    #[error("No match found for {token}")]
    NoMatch { token: String },

    #[error("Found more than one entry for {token}")]
    AmbiguousMatch { token: String },
}

#[derive(Error, Debug)]
pub enum CasLdapError {
    /// Server unreachable, TLS failure, or bind refused. `code` carries the
    /// LDAP result code when a reachable server rejected the bind.
    #[error("LDAP connection failed: {message}")]
    Connection { code: Option<u32>, message: String },

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("LDAP operation rejected (rc={code}): {message}")]
    Protocol { code: u32, message: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Database error: {message}")]
    DatabaseError { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CasLdapError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            code: None,
            message: message.into(),
        }
    }

    pub fn bind_rejected(code: u32, message: impl Into<String>) -> Self {
        Self::Connection {
            code: Some(code),
            message: message.into(),
        }
    }

    /// A reachable server answered the bind with an error result. Trying
    /// another server with the same credentials will not help.
    pub fn is_bind_rejection(&self) -> bool {
        matches!(self, Self::Connection { code: Some(_), .. })
    }

    pub fn protocol(code: u32, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::DatabaseError {
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for lookup failures that batch callers report per item and skip.
    pub fn is_search_error(&self) -> bool {
        matches!(self, Self::Search(_))
    }

    pub fn as_search_error(&self) -> Option<&SearchError> {
        match self {
            Self::Search(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CasLdapError>;
