//! Pooled, failover-capable directory connections
//!
//! A [`ServerPool`] is built fresh for every [`DirectoryConnection::connect`]
//! call: one descriptor per configured server, a round-robin cursor, and a
//! failure counter per server. A server is skipped once its counter reaches
//! the `exhaust` budget; the pool fails only when every server is exhausted.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use casldap_core::{
    BindCredentials, CasLdapError, DirectoryEntry, LdapSettings, PoolSettings, PoolStrategy,
    Result, ServerDescriptor, ServerInfo,
};

// =============================================================================
// Transport Seams
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

/// One search operation as sent to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base: String,
    pub scope: SearchScope,
    pub filter: String,
    pub attributes: Vec<String>,
    /// Maximum entries the server should return; `None` for no limit
    pub size_limit: Option<i32>,
}

impl SearchRequest {
    pub fn subtree(base: impl Into<String>, filter: impl Into<String>, attributes: Vec<String>) -> Self {
        Self {
            base: base.into(),
            scope: SearchScope::Subtree,
            filter: filter.into(),
            attributes,
            size_limit: None,
        }
    }

    /// Read of the root DSE for capability discovery
    pub fn root_dse() -> Self {
        Self {
            base: String::new(),
            scope: SearchScope::Base,
            filter: "(objectClass=*)".to_string(),
            attributes: ServerInfo::ROOT_DSE_ATTRIBUTES
                .iter()
                .map(|a| a.to_string())
                .collect(),
            size_limit: None,
        }
    }

    pub fn with_size_limit(mut self, limit: i32) -> Self {
        self.size_limit = Some(limit);
        self
    }
}

/// Per-connection transport options derived from [`LdapSettings`]
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub credentials: BindCredentials,
    pub skip_tls_verify: bool,
    pub timeout: Duration,
}

impl ConnectOptions {
    pub fn from_settings(settings: &LdapSettings) -> Self {
        Self {
            credentials: settings.bind_credentials(),
            skip_tls_verify: settings.skip_tls_verify,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

/// Opens a bound session to one server.
///
/// Errors must use [`CasLdapError::connection`] when the server could not be
/// reached (the pool fails over) and [`CasLdapError::bind_rejected`] when the
/// server answered the bind with an error result (the pool stops).
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        server: &ServerDescriptor,
        options: &ConnectOptions,
    ) -> Result<Box<dyn DirectorySession>>;
}

/// A live, bound session
#[async_trait]
pub trait DirectorySession: Send {
    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>>;

    async fn unbind(&mut self) -> Result<()>;
}

// =============================================================================
// Server Pool
// =============================================================================

#[derive(Debug, Clone)]
struct PooledServer {
    descriptor: ServerDescriptor,
    failures: u32,
}

/// Backend descriptors with a selection cursor and per-server failure counts
#[derive(Debug, Clone)]
pub struct ServerPool {
    servers: Vec<PooledServer>,
    cursor: usize,
    strategy: PoolStrategy,
    budget: u32,
}

impl ServerPool {
    pub fn new(descriptors: Vec<ServerDescriptor>, settings: &PoolSettings) -> Result<Self> {
        if descriptors.is_empty() {
            return Err(CasLdapError::config_error(
                "at least one LDAP server must be configured",
            ));
        }

        // A passive pool makes a single pass over its servers.
        let budget = if settings.active {
            settings.exhaust.max(1)
        } else {
            1
        };

        Ok(Self {
            servers: descriptors
                .into_iter()
                .map(|descriptor| PooledServer {
                    descriptor,
                    failures: 0,
                })
                .collect(),
            cursor: 0,
            strategy: settings.strategy,
            budget,
        })
    }

    pub fn from_settings(settings: &LdapSettings) -> Result<Self> {
        Self::new(settings.server_descriptors()?, &settings.pool)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ServerDescriptor> {
        self.servers.iter().map(|s| &s.descriptor)
    }

    pub fn descriptor(&self, index: usize) -> &ServerDescriptor {
        &self.servers[index].descriptor
    }

    pub fn failures(&self, index: usize) -> u32 {
        self.servers[index].failures
    }

    /// Total attempts the pool allows before giving up
    pub fn attempt_budget(&self) -> usize {
        self.servers.len() * self.budget as usize
    }

    pub fn is_exhausted(&self) -> bool {
        self.servers.iter().all(|s| s.failures >= self.budget)
    }

    /// Index of the next server to try, advancing the cursor.
    pub fn next_candidate(&mut self) -> Option<usize> {
        let n = self.servers.len();
        let start = match self.strategy {
            PoolStrategy::RoundRobin => self.cursor,
            PoolStrategy::First => 0,
        };

        let index = (0..n)
            .map(|offset| (start + offset) % n)
            .find(|&i| self.servers[i].failures < self.budget)?;

        self.cursor = (index + 1) % n;
        Some(index)
    }

    pub fn record_failure(&mut self, index: usize) {
        self.servers[index].failures += 1;
    }

    pub fn record_success(&mut self, index: usize) {
        self.servers[index].failures = 0;
    }
}

// =============================================================================
// Connection
// =============================================================================

/// A bound connection to one server of the pool
pub struct DirectoryConnection {
    session: Box<dyn DirectorySession>,
    server: ServerDescriptor,
    server_info: ServerInfo,
}

impl std::fmt::Debug for DirectoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConnection")
            .field("server", &self.server)
            .field("server_info", &self.server_info)
            .finish_non_exhaustive()
    }
}

impl DirectoryConnection {
    /// Connect to the first available server of a freshly built pool.
    ///
    /// Unreachable servers are failed over within the pool's budget. A bind
    /// refused by a reachable server (bad credentials) is returned immediately
    /// as a `Connection` error carrying the result code.
    #[instrument(skip(settings, connector), fields(servers = settings.servers.len()))]
    pub async fn connect(settings: &LdapSettings, connector: &dyn Connector) -> Result<Self> {
        let mut pool = ServerPool::from_settings(settings)?;
        let options = ConnectOptions::from_settings(settings);
        let mut last_error: Option<CasLdapError> = None;
        let mut attempts = 0usize;

        while let Some(index) = pool.next_candidate() {
            attempts += 1;
            let server = pool.descriptor(index).clone();
            debug!(server = %server, attempt = attempts, "Trying LDAP server");

            match connector.open(&server, &options).await {
                Ok(session) => {
                    match Self::negotiate(session, server, options.credentials.is_anonymous()).await {
                        Ok(connection) => {
                            pool.record_success(index);
                            return Ok(connection);
                        }
                        Err(e) => {
                            warn!(server = %pool.descriptor(index), "LDAP server failed capability discovery: {}", e);
                            pool.record_failure(index);
                            last_error = Some(e);
                        }
                    }
                }
                Err(e @ CasLdapError::Connection { code: None, .. }) => {
                    warn!(server = %server, "LDAP server unavailable: {}", e);
                    pool.record_failure(index);
                    last_error = Some(e);
                }
                Err(e) => {
                    error!("Error establishing LDAP connection: {}", e);
                    return Err(e);
                }
            }
        }

        let err = CasLdapError::connection(format!(
            "no LDAP server available after {} attempts across {} servers{}",
            attempts,
            pool.len(),
            last_error
                .map(|e| format!(" (last error: {})", e))
                .unwrap_or_default()
        ));
        error!("Error establishing LDAP connection: {}", err);
        Err(err)
    }

    /// Read the root DSE. A transport failure fails the server; a server that
    /// refuses to publish its DSE is still usable.
    async fn negotiate(
        mut session: Box<dyn DirectorySession>,
        server: ServerDescriptor,
        anonymous: bool,
    ) -> Result<Self> {
        let server_info = if server.fetch_server_info {
            match session.search(&SearchRequest::root_dse()).await {
                Ok(entries) => entries
                    .first()
                    .map(ServerInfo::from_root_dse)
                    .unwrap_or_default(),
                Err(e @ CasLdapError::Connection { code: None, .. }) => {
                    session.unbind().await.ok();
                    return Err(e);
                }
                Err(e) => {
                    warn!(server = %server, "Root DSE not readable: {}", e);
                    ServerInfo::default()
                }
            }
        } else {
            ServerInfo::default()
        };

        info!(
            server = %server,
            anonymous,
            vendor = server_info.vendor_name.as_deref().unwrap_or("unknown"),
            "LDAP connection established"
        );

        Ok(Self {
            session,
            server,
            server_info,
        })
    }

    pub fn server(&self) -> &ServerDescriptor {
        &self.server
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    pub async fn search(&mut self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>> {
        self.session.search(request).await
    }

    /// Unbind; errors are logged and dropped since the connection is discarded.
    pub async fn close(mut self) {
        if let Err(e) = self.session.unbind().await {
            debug!(server = %self.server, "LDAP unbind failed: {}", e);
        }
    }
}
