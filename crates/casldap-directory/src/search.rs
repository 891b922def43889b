//! Exactly-one-result user lookup

use std::sync::Arc;
use tracing::{debug, info, instrument};

use casldap_core::{render_filter, DirectoryEntry, LdapSettings, Result, SearchError};

use crate::connection::{Connector, DirectoryConnection, SearchRequest};

/// Ambiguity only needs two entries to be detected.
const LOOKUP_SIZE_LIMIT: i32 = 2;

/// Reject a token that cannot name an entry. Runs before any connection.
pub fn check_token(token: &str) -> std::result::Result<(), SearchError> {
    if token.trim().is_empty() {
        return Err(SearchError::EmptyKey);
    }
    Ok(())
}

/// A user lookup over its own connection.
///
/// Every instance opens a fresh connection; nothing is shared between lookups.
#[derive(Debug)]
pub struct DirectorySearch {
    settings: Arc<LdapSettings>,
    connection: DirectoryConnection,
}

impl DirectorySearch {
    pub async fn connect(settings: Arc<LdapSettings>, connector: &dyn Connector) -> Result<Self> {
        let connection = DirectoryConnection::connect(&settings, connector).await?;
        Ok(Self {
            settings,
            connection,
        })
    }

    /// One-shot lookup: validate the token and the lookup options, connect,
    /// find the single entry for `token`, then close.
    ///
    /// An empty token or missing lookup options fail without contacting any
    /// server.
    pub async fn lookup(
        settings: Arc<LdapSettings>,
        connector: &dyn Connector,
        token: &str,
        fetch_all: bool,
    ) -> Result<DirectoryEntry> {
        check_token(token)?;
        settings.lookup_criteria(fetch_all)?;

        let mut search = Self::connect(settings, connector).await?;
        let found = search.find_user(token, fetch_all).await;
        search.close().await;
        found
    }

    pub fn connection(&self) -> &DirectoryConnection {
        &self.connection
    }

    /// Find the single entry for `token`.
    ///
    /// With `fetch_all` every user attribute is requested instead of the
    /// configured list. Zero or several matches are errors, never resolved
    /// automatically, and never retried.
    #[instrument(skip(self), fields(server = %self.connection.server()))]
    pub async fn find_user(&mut self, token: &str, fetch_all: bool) -> Result<DirectoryEntry> {
        check_token(token)?;

        let criteria = self.settings.lookup_criteria(fetch_all)?;
        let request = SearchRequest::subtree(
            criteria.base,
            render_filter(&criteria.filter_template, token),
            criteria.attributes.to_request(),
        )
        .with_size_limit(LOOKUP_SIZE_LIMIT);

        debug!(base = %request.base, filter = %request.filter, "Searching LDAP");
        let mut entries = self.connection.search(&request).await?;

        match entries.len() {
            0 => Err(SearchError::NoMatch {
                token: token.to_string(),
            }
            .into()),
            1 => {
                let entry = entries.remove(0);
                info!(dn = %entry.dn, "Found LDAP entry");
                Ok(entry)
            }
            _ => Err(SearchError::AmbiguousMatch {
                token: token.to_string(),
            }
            .into()),
        }
    }

    pub async fn close(self) {
        self.connection.close().await;
    }
}
