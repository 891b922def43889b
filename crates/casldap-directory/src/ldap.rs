//! ldap3-backed transport

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry, SearchOptions, SearchResult};
use std::time::Duration;
use tracing::debug;

use casldap_core::{
    BindCredentials, CasLdapError, DirectoryEntry, Result, ServerDescriptor, TransportSecurity,
};

use crate::connection::{ConnectOptions, Connector, DirectorySession, SearchRequest, SearchScope};

const RC_SUCCESS: u32 = 0;
const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
const RC_NO_SUCH_OBJECT: u32 = 32;

/// Connector that speaks LDAP over TLS using `ldap3`
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldap3Connector;

impl Ldap3Connector {
    pub fn new() -> Self {
        Self
    }
}

fn transport_error(server: &ServerDescriptor, e: LdapError) -> CasLdapError {
    CasLdapError::connection(format!("{}: {}", server, e))
}

#[async_trait]
impl Connector for Ldap3Connector {
    async fn open(
        &self,
        server: &ServerDescriptor,
        options: &ConnectOptions,
    ) -> Result<Box<dyn DirectorySession>> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(options.timeout)
            .set_starttls(server.security == TransportSecurity::StartTls)
            .set_no_tls_verify(options.skip_tls_verify);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &server.url)
            .await
            .map_err(|e| transport_error(server, e))?;

        ldap3::drive!(conn);

        let (dn, password) = match &options.credentials {
            BindCredentials::Simple { dn, password } => (dn.as_str(), password.as_str()),
            BindCredentials::Anonymous => ("", ""),
        };

        let result = ldap
            .with_timeout(options.timeout)
            .simple_bind(dn, password)
            .await
            .map_err(|e| transport_error(server, e))?;

        if result.rc != RC_SUCCESS {
            ldap.unbind().await.ok();
            let who = if dn.is_empty() { "anonymous" } else { dn };
            return Err(CasLdapError::bind_rejected(
                result.rc,
                format!(
                    "bind as {} rejected by {} (rc={}): {}",
                    who, server, result.rc, result.text
                ),
            ));
        }

        debug!(server = %server, "LDAP bind succeeded");

        Ok(Box::new(Ldap3Session {
            ldap,
            server: server.clone(),
            timeout: options.timeout,
        }))
    }
}

struct Ldap3Session {
    ldap: Ldap,
    server: ServerDescriptor,
    timeout: Duration,
}

fn scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

#[async_trait]
impl DirectorySession for Ldap3Session {
    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>> {
        let mut options = SearchOptions::new();
        if let Some(limit) = request.size_limit {
            options = options.sizelimit(limit);
        }

        let SearchResult(entries, result) = self
            .ldap
            .with_search_options(options)
            .with_timeout(self.timeout)
            .search(
                &request.base,
                scope(request.scope),
                &request.filter,
                request.attributes.clone(),
            )
            .await
            .map_err(|e| transport_error(&self.server, e))?;

        match result.rc {
            RC_SUCCESS | RC_SIZE_LIMIT_EXCEEDED => {}
            RC_NO_SUCH_OBJECT => {
                debug!(base = %request.base, "Search base does not exist");
                return Ok(vec![]);
            }
            rc => {
                return Err(CasLdapError::protocol(
                    rc,
                    format!("search under {} failed: {}", request.base, result.text),
                ))
            }
        }

        Ok(entries
            .into_iter()
            .filter(|entry| !entry.is_ref() && !entry.is_intermediate())
            .map(SearchEntry::construct)
            .map(|se| DirectoryEntry::from_parts(se.dn, se.attrs, se.bin_attrs))
            .collect())
    }

    async fn unbind(&mut self) -> Result<()> {
        self.ldap
            .unbind()
            .await
            .map_err(|e| transport_error(&self.server, e))
    }
}
