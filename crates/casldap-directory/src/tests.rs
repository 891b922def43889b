//! Unit tests for casldap-directory

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use casldap_core::{
    AttributeMap, BindCredentials, CasLdapError, DirectoryEntry, LdapSettings, PoolSettings,
    PoolStrategy, Result, SearchError, ServerDescriptor, User, UserRepository,
};

use crate::connection::{ConnectOptions, Connector, DirectorySession, SearchRequest, SearchScope};

// =============================================================================
// Test Fixtures
// =============================================================================

#[derive(Default)]
struct DirectoryState {
    entries: Vec<DirectoryEntry>,
    root_dse: Option<DirectoryEntry>,
    unreachable: HashSet<String>,
    reject_bind: bool,
    opens: Vec<(String, BindCredentials)>,
    searches: Vec<SearchRequest>,
    unbinds: usize,
}

/// In-process directory that records everything the engine asks of it
#[derive(Clone, Default)]
struct FakeDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl FakeDirectory {
    fn with_entries(entries: Vec<DirectoryEntry>) -> Self {
        let dir = Self::default();
        dir.state.lock().unwrap().entries = entries;
        dir
    }

    fn unreachable(&self, url: &str) {
        self.state.lock().unwrap().unreachable.insert(url.to_string());
    }

    fn opens(&self) -> Vec<(String, BindCredentials)> {
        self.state.lock().unwrap().opens.clone()
    }

    /// Searches other than root DSE reads
    fn user_searches(&self) -> Vec<SearchRequest> {
        self.state
            .lock()
            .unwrap()
            .searches
            .iter()
            .filter(|r| r.scope != SearchScope::Base)
            .cloned()
            .collect()
    }

    fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Connector for FakeDirectory {
    async fn open(
        &self,
        server: &ServerDescriptor,
        options: &ConnectOptions,
    ) -> Result<Box<dyn DirectorySession>> {
        let mut state = self.state.lock().unwrap();
        state
            .opens
            .push((server.url.clone(), options.credentials.clone()));

        if state.unreachable.contains(&server.url) {
            return Err(CasLdapError::connection(format!("{}: connection refused", server)));
        }
        if state.reject_bind {
            return Err(CasLdapError::bind_rejected(49, "invalid credentials"));
        }

        Ok(Box::new(FakeSession {
            state: self.state.clone(),
        }))
    }
}

struct FakeSession {
    state: Arc<Mutex<DirectoryState>>,
}

#[async_trait]
impl DirectorySession for FakeSession {
    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>> {
        let mut state = self.state.lock().unwrap();
        state.searches.push(request.clone());

        if request.scope == SearchScope::Base && request.base.is_empty() {
            return Ok(state.root_dse.clone().into_iter().collect());
        }
        Ok(state.entries.clone())
    }

    async fn unbind(&mut self) -> Result<()> {
        self.state.lock().unwrap().unbinds += 1;
        Ok(())
    }
}

/// User store that keeps a copy of every saved record
#[derive(Default)]
struct MemoryUsers {
    saved: Mutex<Vec<User>>,
}

impl MemoryUsers {
    fn save_count(&self) -> usize {
        self.saved.lock().unwrap().len()
    }

    fn last_saved(&self) -> Option<User> {
        self.saved.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl UserRepository for MemoryUsers {
    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .saved
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create(&self, user: &User) -> Result<User> {
        Ok(user.clone())
    }

    async fn save(&self, user: &User) -> Result<()> {
        self.saved.lock().unwrap().push(user.clone());
        Ok(())
    }
}

const SERVERS: [&str; 3] = ["lds81", "ldap42", "ld4all"];

fn settings() -> LdapSettings {
    let mut settings = LdapSettings::new(SERVERS);
    settings.attributes = Some(vec!["uid".into(), "sn".into(), "ou".into()]);
    settings.search_base = Some("o=my_org".into());
    settings.search_filter = Some("(uid=%(user)s)".into());
    settings
}

fn jdoe_entry() -> DirectoryEntry {
    DirectoryEntry::new("uid=jdoe,o=my_org")
        .with_attr("givenName", ["John"])
        .with_attr("surname", ["Doe"])
        .with_attr("mail", ["jdoe@example.com"])
}

// =============================================================================
// Server Pool Tests
// =============================================================================

#[cfg(test)]
mod pool_tests {
    use super::*;
    use crate::connection::ServerPool;

    fn pool(settings: PoolSettings) -> ServerPool {
        let descriptors = SERVERS
            .iter()
            .map(|s| ServerDescriptor::parse(s, false).unwrap())
            .collect();
        ServerPool::new(descriptors, &settings).unwrap()
    }

    #[test]
    fn test_one_descriptor_per_server() {
        let pool = ServerPool::from_settings(&settings()).unwrap();
        assert_eq!(pool.len(), 3);
        let urls: Vec<&str> = pool.descriptors().map(|d| d.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["ldaps://lds81:636", "ldaps://ldap42:636", "ldaps://ld4all:636"]
        );
        assert!(pool.descriptors().all(|d| d.fetch_server_info));
    }

    #[test]
    fn test_round_robin_advances_cursor() {
        let mut pool = pool(PoolSettings::default());
        let order: Vec<usize> = (0..4).filter_map(|_| pool.next_candidate()).collect();
        assert_eq!(order, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_first_strategy_prefers_first_healthy_server() {
        let mut pool = pool(PoolSettings {
            strategy: PoolStrategy::First,
            ..PoolSettings::default()
        });
        assert_eq!(pool.next_candidate(), Some(0));
        assert_eq!(pool.next_candidate(), Some(0));
    }

    #[test]
    fn test_exhausted_servers_are_skipped() {
        let mut pool = pool(PoolSettings::default());
        for _ in 0..5 {
            pool.record_failure(0);
        }
        assert_eq!(pool.failures(0), 5);

        let order: Vec<usize> = (0..4).filter_map(|_| pool.next_candidate()).collect();
        assert_eq!(order, vec![1, 2, 1, 2]);
        assert!(!pool.is_exhausted());
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut pool = pool(PoolSettings::default());
        assert_eq!(pool.attempt_budget(), 15);

        while let Some(i) = pool.next_candidate() {
            pool.record_failure(i);
        }
        assert!(pool.is_exhausted());
        assert!(pool.next_candidate().is_none());
    }

    #[test]
    fn test_success_resets_failures() {
        let mut pool = pool(PoolSettings::default());
        pool.record_failure(1);
        pool.record_success(1);
        assert_eq!(pool.failures(1), 0);
    }

    #[test]
    fn test_passive_pool_makes_one_pass() {
        let pool = pool(PoolSettings {
            active: false,
            ..PoolSettings::default()
        });
        assert_eq!(pool.attempt_budget(), 3);
    }

    #[test]
    fn test_empty_pool_is_config_error() {
        assert!(matches!(
            ServerPool::new(vec![], &PoolSettings::default()),
            Err(CasLdapError::ConfigError { .. })
        ));
    }
}

// =============================================================================
// Connection Tests
// =============================================================================

#[cfg(test)]
mod connection_tests {
    use super::*;
    use crate::connection::DirectoryConnection;

    #[tokio::test]
    async fn test_anonymous_bind_without_credentials() {
        let dir = FakeDirectory::default();
        DirectoryConnection::connect(&settings(), dir.connector().as_ref())
            .await
            .unwrap();

        let opens = dir.opens();
        assert_eq!(opens.len(), 1);
        assert_eq!(opens[0].0, "ldaps://lds81:636");
        assert!(opens[0].1.is_anonymous());
    }

    #[tokio::test]
    async fn test_simple_bind_with_credentials() {
        let dir = FakeDirectory::default();
        let mut settings = settings();
        settings.bind_dn = Some("cn=reader,o=my_org".into());
        settings.bind_password = Some("secret".into());

        DirectoryConnection::connect(&settings, dir.connector().as_ref())
            .await
            .unwrap();

        assert_eq!(
            dir.opens()[0].1,
            BindCredentials::Simple {
                dn: "cn=reader,o=my_org".into(),
                password: "secret".into()
            }
        );
    }

    #[tokio::test]
    async fn test_half_configured_credentials_bind_anonymously() {
        let dir = FakeDirectory::default();
        let mut settings = settings();
        settings.bind_dn = Some("cn=reader,o=my_org".into());

        DirectoryConnection::connect(&settings, dir.connector().as_ref())
            .await
            .unwrap();
        assert!(dir.opens()[0].1.is_anonymous());
    }

    #[tokio::test]
    async fn test_reads_root_dse() {
        let dir = FakeDirectory::default();
        dir.state.lock().unwrap().root_dse = Some(
            DirectoryEntry::new("")
                .with_attr("supportedLDAPVersion", ["3"])
                .with_attr("vendorName", ["OpenLDAP"]),
        );

        let conn = DirectoryConnection::connect(&settings(), dir.connector().as_ref())
            .await
            .unwrap();

        assert!(conn.server_info().supports_v3());
        assert_eq!(conn.server_info().vendor_name.as_deref(), Some("OpenLDAP"));
        let searches = dir.state.lock().unwrap().searches.clone();
        assert_eq!(searches, vec![SearchRequest::root_dse()]);
    }

    #[tokio::test]
    async fn test_fails_over_to_next_server() {
        let dir = FakeDirectory::default();
        dir.unreachable("ldaps://lds81:636");

        let conn = DirectoryConnection::connect(&settings(), dir.connector().as_ref())
            .await
            .unwrap();

        assert_eq!(conn.server().url, "ldaps://ldap42:636");
        let urls: Vec<String> = dir.opens().into_iter().map(|(url, _)| url).collect();
        assert_eq!(urls, vec!["ldaps://lds81:636", "ldaps://ldap42:636"]);
    }

    #[tokio::test]
    async fn test_all_servers_down_is_connection_error() {
        let dir = FakeDirectory::default();
        for server in SERVERS {
            dir.unreachable(&format!("ldaps://{}:636", server));
        }

        let err = DirectoryConnection::connect(&settings(), dir.connector().as_ref())
            .await
            .unwrap_err();

        assert!(matches!(err, CasLdapError::Connection { .. }));
        // Each server gets the exhaust budget, then the pool gives up.
        assert_eq!(dir.opens().len(), SERVERS.len() * 5);
    }

    #[tokio::test]
    async fn test_rejected_bind_is_not_retried() {
        let dir = FakeDirectory::default();
        dir.state.lock().unwrap().reject_bind = true;

        let err = DirectoryConnection::connect(&settings(), dir.connector().as_ref())
            .await
            .unwrap_err();

        assert!(matches!(err, CasLdapError::Connection { code: Some(49), .. }));
        assert!(err.is_bind_rejection());
        assert_eq!(dir.opens().len(), 1);
    }

    #[tokio::test]
    async fn test_close_unbinds() {
        let dir = FakeDirectory::default();
        let conn = DirectoryConnection::connect(&settings(), dir.connector().as_ref())
            .await
            .unwrap();
        conn.close().await;
        assert_eq!(dir.state.lock().unwrap().unbinds, 1);
    }
}

// =============================================================================
// Search Tests
// =============================================================================

#[cfg(test)]
mod search_tests {
    use super::*;
    use crate::search::DirectorySearch;

    async fn search(dir: &FakeDirectory, settings: LdapSettings) -> DirectorySearch {
        DirectorySearch::connect(Arc::new(settings), dir.connector().as_ref())
            .await
            .unwrap()
    }

    async fn lookup(dir: &FakeDirectory, settings: LdapSettings, token: &str) -> Result<DirectoryEntry> {
        DirectorySearch::lookup(Arc::new(settings), dir.connector().as_ref(), token, false).await
    }

    fn all_servers_down(dir: &FakeDirectory) {
        for server in SERVERS {
            dir.unreachable(&format!("ldaps://{}:636", server));
        }
    }

    #[tokio::test]
    async fn test_empty_token_rejected_before_connecting() {
        let dir = FakeDirectory::with_entries(vec![jdoe_entry()]);
        all_servers_down(&dir);

        for token in ["", "   "] {
            let err = lookup(&dir, settings(), token).await.unwrap_err();
            assert_eq!(err.as_search_error(), Some(&SearchError::EmptyKey));
        }
        assert!(dir.opens().is_empty());
    }

    #[tokio::test]
    async fn test_empty_token_rejected_on_open_connection() {
        let dir = FakeDirectory::with_entries(vec![jdoe_entry()]);
        let mut search = search(&dir, settings()).await;

        let err = search.find_user("", false).await.unwrap_err();
        assert_eq!(err.as_search_error(), Some(&SearchError::EmptyKey));
        assert!(dir.user_searches().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_not_configured_before_connecting() {
        let dir = FakeDirectory::with_entries(vec![jdoe_entry()]);
        let mut settings = settings();
        settings.search_base = None;

        let err = lookup(&dir, settings, "jdoe").await.unwrap_err();
        assert_eq!(err.as_search_error(), Some(&SearchError::NotConfigured));
        assert!(dir.opens().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_closes_connection() {
        let dir = FakeDirectory::with_entries(vec![jdoe_entry()]);

        let entry = lookup(&dir, settings(), "jdoe").await.unwrap();
        assert_eq!(entry.dn, "uid=jdoe,o=my_org");
        assert_eq!(dir.state.lock().unwrap().unbinds, 1);
    }

    #[tokio::test]
    async fn test_not_configured_for_every_missing_subset() {
        let dir = FakeDirectory::with_entries(vec![jdoe_entry()]);

        for mask in 1u8..8 {
            let mut settings = settings();
            if mask & 1 != 0 {
                settings.attributes = None;
            }
            if mask & 2 != 0 {
                settings.search_base = None;
            }
            if mask & 4 != 0 {
                settings.search_filter = None;
            }

            let mut search = search(&dir, settings).await;
            let err = search.find_user("jschmoe", false).await.unwrap_err();
            assert_eq!(
                err.as_search_error(),
                Some(&SearchError::NotConfigured),
                "mask {:03b}",
                mask
            );
            assert!(err.to_string().contains("not configured for user lookup"));
        }
        assert!(dir.user_searches().is_empty());
    }

    #[tokio::test]
    async fn test_no_match() {
        let dir = FakeDirectory::default();
        let mut search = search(&dir, settings()).await;

        let err = search.find_user("jschmoe", false).await.unwrap_err();
        assert_eq!(
            err.as_search_error(),
            Some(&SearchError::NoMatch {
                token: "jschmoe".into()
            })
        );
        assert!(err.to_string().contains("No match found for jschmoe"));

        // Search uses the configured base, filter and attributes.
        let request = dir.user_searches().pop().unwrap();
        assert_eq!(request.base, "o=my_org");
        assert_eq!(request.scope, SearchScope::Subtree);
        assert_eq!(request.filter, "(uid=jschmoe)");
        assert_eq!(request.attributes, vec!["uid", "sn", "ou"]);
        assert_eq!(request.size_limit, Some(2));
    }

    #[tokio::test]
    async fn test_ambiguous_match() {
        let dir = FakeDirectory::with_entries(vec![
            DirectoryEntry::new("uid=jschmoe,ou=a,o=my_org"),
            DirectoryEntry::new("uid=jschmoe,ou=b,o=my_org"),
        ]);
        let mut search = search(&dir, settings()).await;

        let err = search.find_user("jschmoe", false).await.unwrap_err();
        assert_eq!(
            err.as_search_error(),
            Some(&SearchError::AmbiguousMatch {
                token: "jschmoe".into()
            })
        );
        assert!(err.to_string().contains("Found more than one entry for jschmoe"));
    }

    #[tokio::test]
    async fn test_single_match_returned() {
        let dir = FakeDirectory::with_entries(vec![jdoe_entry()]);
        let mut search = search(&dir, settings()).await;

        let entry = search.find_user("jdoe", false).await.unwrap();
        assert_eq!(entry, jdoe_entry());
    }

    #[tokio::test]
    async fn test_fetch_all_requests_wildcard() {
        let dir = FakeDirectory::with_entries(vec![jdoe_entry()]);
        let mut without_attributes = settings();
        without_attributes.attributes = None;

        for settings in [settings(), without_attributes] {
            let mut search = search(&dir, settings).await;
            search.find_user("jdoe", true).await.unwrap();

            let request = dir.user_searches().pop().unwrap();
            assert_eq!(request.attributes, vec!["*"]);
            assert_eq!(request.filter, "(uid=jdoe)");
        }
    }

    #[tokio::test]
    async fn test_token_is_escaped_in_sent_filter() {
        let dir = FakeDirectory::default();
        let mut search = search(&dir, settings()).await;

        search.find_user("*)(uid=*", false).await.unwrap_err();
        assert_eq!(
            dir.user_searches().pop().unwrap().filter,
            "(uid=\\2a\\29\\28uid=\\2a)"
        );
    }
}

// =============================================================================
// Attribute Resolver Tests
// =============================================================================

#[cfg(test)]
mod resolver_tests {
    use super::*;
    use crate::registry::UserInitRegistry;
    use crate::resolver::{apply_mapping, AttributeResolver, PopulateOutcome};
    use casldap_core::AttributeSource;

    fn resolver(
        dir: &FakeDirectory,
        map: Option<AttributeMap>,
    ) -> (AttributeResolver<MemoryUsers>, Arc<MemoryUsers>) {
        let mut settings = settings();
        settings.attributes = Some(vec!["*".into()]);
        settings.attribute_map = map;
        let users = Arc::new(MemoryUsers::default());
        (
            AttributeResolver::new(Arc::new(settings), dir.connector(), users.clone()),
            users,
        )
    }

    #[tokio::test]
    async fn test_no_mapping_is_a_noop() {
        let dir = FakeDirectory::with_entries(vec![jdoe_entry()]);
        let (resolver, users) = resolver(&dir, None);
        let mut user = User::new("jdoe");
        let before = user.clone();

        let outcome = resolver.populate(&mut user).await.unwrap();

        assert_eq!(outcome, PopulateOutcome::NotConfigured);
        assert!(dir.opens().is_empty());
        assert_eq!(users.save_count(), 0);
        assert_eq!(user, before);
    }

    #[tokio::test]
    async fn test_end_to_end_population() {
        let dir = FakeDirectory::with_entries(vec![jdoe_entry()]);
        let map = AttributeMap::new()
            .with_field("first_name", "givenName")
            .with_field("last_name", "surname")
            .with_field("email", "mail");
        let (resolver, users) = resolver(&dir, Some(map));
        let mut user = User::new("jdoe");

        let outcome = resolver.populate(&mut user).await.unwrap();

        assert_eq!(
            outcome,
            PopulateOutcome::Populated {
                dn: "uid=jdoe,o=my_org".into()
            }
        );
        assert_eq!(user.first_name, "John");
        assert_eq!(user.last_name, "Doe");
        assert_eq!(user.email, "jdoe@example.com");
        assert_eq!(users.save_count(), 1);
        assert_eq!(users.last_saved().unwrap().email, "jdoe@example.com");
        assert_eq!(dir.user_searches()[0].filter, "(uid=jdoe)");
    }

    #[test]
    fn test_fallback_chain_resolution() {
        let map = AttributeMap::new().with_field("email", vec!["mail", "eduPerson"]);

        let mut user = User::new("jdoe");
        let only_fallback = DirectoryEntry::new("uid=jdoe").with_attr("eduPerson", ["jd@edu"]);
        assert_eq!(apply_mapping(&map, &only_fallback, &mut user), 1);
        assert_eq!(user.email, "jd@edu");

        let both = only_fallback.clone().with_attr("mail", ["jd@mail"]);
        apply_mapping(&map, &both, &mut user);
        assert_eq!(user.email, "jd@mail");

        let neither = DirectoryEntry::new("uid=jdoe");
        assert_eq!(apply_mapping(&map, &neither, &mut user), 0);
        assert_eq!(user.email, "");
    }

    #[test]
    fn test_missing_single_attribute_clears_stale_value() {
        let map = AttributeMap::new().with_field("department", "ou");
        let mut user = User::new("jdoe");
        user.set_field("department", "Old Department".into());

        apply_mapping(&map, &DirectoryEntry::new("uid=jdoe"), &mut user);
        assert_eq!(user.field("department"), Some(""));
    }

    #[test]
    fn test_nested_mapping_uses_fallback_chains() {
        let map = AttributeMap::new().with_nested(
            "profile",
            [
                ("phone", AttributeSource::from("telephoneNumber")),
                ("title", AttributeSource::from(vec!["title", "ou"])),
                ("office", AttributeSource::from("roomNumber")),
            ],
        );
        let entry = DirectoryEntry::new("uid=jdoe")
            .with_attr("telephoneNumber", ["555-0100"])
            .with_attr("ou", ["History"]);
        let mut user = User::new("jdoe");
        user.set_related_field("profile", "office", "B-12".into());

        assert_eq!(apply_mapping(&map, &entry, &mut user), 2);
        assert_eq!(user.related_field("profile", "phone"), Some("555-0100"));
        assert_eq!(user.related_field("profile", "title"), Some("History"));
        assert_eq!(user.related_field("profile", "office"), Some(""));
    }

    #[tokio::test]
    async fn test_repeat_populate_is_idempotent() {
        let dir = FakeDirectory::with_entries(vec![jdoe_entry()]);
        let map = AttributeMap::new()
            .with_field("first_name", "givenName")
            .with_field("email", vec!["mail", "eduPerson"])
            .with_nested("profile", [("surname", "surname")]);
        let (resolver, _users) = resolver(&dir, Some(map));
        let mut user = User::new("jdoe");

        let snapshot = |u: &User| (u.first_name.clone(), u.email.clone(), u.related.clone());

        resolver.populate(&mut user).await.unwrap();
        let first = snapshot(&user);
        resolver.populate(&mut user).await.unwrap();

        assert_eq!(first, snapshot(&user));
        assert_eq!(first.1, "jdoe@example.com");
    }

    #[tokio::test]
    async fn test_extra_init_runs_after_mapping_and_before_save() {
        let dir = FakeDirectory::with_entries(vec![jdoe_entry()]);
        let map = AttributeMap::new().with_field("first_name", "givenName");
        let (resolver, users) = resolver(&dir, Some(map));
        let seen_by_hook = Arc::new(Mutex::new(None));

        let hook_users = users.clone();
        let hook_seen = seen_by_hook.clone();
        let resolver = resolver.with_extra_init(Arc::new(
            move |user: &mut User, entry: &DirectoryEntry| {
                let saves = hook_users.save_count();
                *hook_seen.lock().unwrap() =
                    Some((user.first_name.clone(), saves, entry.dn.clone()));
                user.is_staff = true;
            },
        ));

        let mut user = User::new("jdoe");
        resolver.populate(&mut user).await.unwrap();

        assert_eq!(
            *seen_by_hook.lock().unwrap(),
            Some(("John".to_string(), 0, "uid=jdoe,o=my_org".to_string()))
        );
        assert_eq!(users.save_count(), 1);
        assert!(users.last_saved().unwrap().is_staff);
    }

    #[tokio::test]
    async fn test_failed_lookup_leaves_user_untouched() {
        let dir = FakeDirectory::default();
        let (resolver, users) = resolver(&dir, Some(AttributeMap::new().with_field("email", "mail")));
        let mut user = User::new("ghost");
        user.email = "keep@example.com".into();
        let before = user.clone();

        let err = resolver.populate(&mut user).await.unwrap_err();

        assert!(err.is_search_error());
        assert_eq!(user, before);
        assert_eq!(users.save_count(), 0);
        assert_eq!(dir.state.lock().unwrap().unbinds, 1);
    }

    #[tokio::test]
    async fn test_empty_username_fails_without_connecting() {
        let dir = FakeDirectory::with_entries(vec![jdoe_entry()]);
        for server in SERVERS {
            dir.unreachable(&format!("ldaps://{}:636", server));
        }
        let (resolver, users) = resolver(&dir, Some(AttributeMap::new().with_field("email", "mail")));

        let err = resolver.populate(&mut User::new("")).await.unwrap_err();
        assert_eq!(err.as_search_error(), Some(&SearchError::EmptyKey));
        assert!(dir.opens().is_empty());
        assert_eq!(users.save_count(), 0);
    }

    #[tokio::test]
    async fn test_connection_failure_propagates() {
        let dir = FakeDirectory::with_entries(vec![jdoe_entry()]);
        for server in SERVERS {
            dir.unreachable(&format!("ldaps://{}:636", server));
        }
        let (resolver, users) = resolver(&dir, Some(AttributeMap::new().with_field("email", "mail")));

        let err = resolver.populate(&mut User::new("jdoe")).await.unwrap_err();
        assert!(matches!(err, CasLdapError::Connection { .. }));
        assert_eq!(users.save_count(), 0);
    }

    #[tokio::test]
    async fn test_registry_hook_resolved_by_name() {
        let dir = FakeDirectory::with_entries(vec![jdoe_entry()]);
        let mut settings = settings();
        settings.attribute_map = Some(AttributeMap::new().with_field("email", "mail"));
        settings.extra_user_init = Some("store_dn".into());
        let users = Arc::new(MemoryUsers::default());

        let resolver = AttributeResolver::from_registry(
            Arc::new(settings),
            dir.connector(),
            users.clone(),
            &UserInitRegistry::with_defaults(),
        )
        .unwrap();

        let mut user = User::new("jdoe");
        resolver.populate(&mut user).await.unwrap();
        assert_eq!(user.field("ldap_dn"), Some("uid=jdoe,o=my_org"));
    }

    #[test]
    fn test_unknown_hook_name_fails_at_startup() {
        let dir = FakeDirectory::default();
        let mut settings = settings();
        settings.extra_user_init = Some("myapp.hooks.init".into());

        let result = AttributeResolver::from_registry(
            Arc::new(settings),
            dir.connector(),
            Arc::new(MemoryUsers::default()),
            &UserInitRegistry::with_defaults(),
        );
        assert!(matches!(result, Err(CasLdapError::ConfigError { .. })));
    }
}

// =============================================================================
// Provisioning Trigger Tests
// =============================================================================

#[cfg(test)]
mod trigger_tests {
    use super::*;
    use crate::resolver::{AttributeResolver, PopulateOutcome};
    use crate::trigger::ProvisioningTrigger;
    use casldap_core::{AuthenticationContext, AuthenticationListener};

    fn trigger(dir: &FakeDirectory) -> (ProvisioningTrigger<MemoryUsers>, Arc<MemoryUsers>) {
        let mut settings = settings();
        settings.attributes = Some(vec!["givenName".into()]);
        settings.attribute_map = Some(AttributeMap::new().with_field("first_name", "givenName"));
        let users = Arc::new(MemoryUsers::default());
        let resolver = AttributeResolver::new(Arc::new(settings), dir.connector(), users.clone());
        (ProvisioningTrigger::new(Arc::new(resolver)), users)
    }

    #[tokio::test]
    async fn test_existing_user_is_not_provisioned() {
        let dir = FakeDirectory::with_entries(vec![jdoe_entry()]);
        let (trigger, users) = trigger(&dir);
        let mut user = User::new("jdoe");

        let outcome = trigger.provision(&mut user, false).await.unwrap();
        assert!(outcome.is_none());

        trigger
            .on_authenticated(&mut user, &AuthenticationContext::new(false))
            .await
            .unwrap();

        assert!(dir.opens().is_empty());
        assert_eq!(users.save_count(), 0);
        assert_eq!(user.first_name, "");
    }

    #[tokio::test]
    async fn test_new_user_is_provisioned() {
        let dir = FakeDirectory::with_entries(vec![jdoe_entry()]);
        let (trigger, users) = trigger(&dir);
        let mut user = User::new("jdoe");

        let outcome = trigger.provision(&mut user, true).await.unwrap();
        assert!(matches!(outcome, Some(PopulateOutcome::Populated { .. })));
        assert_eq!(user.first_name, "John");

        let mut other = User::new("jdoe");
        let context = AuthenticationContext {
            created: true,
            ticket: Some("ST-1".into()),
            ..AuthenticationContext::default()
        };
        trigger.on_authenticated(&mut other, &context).await.unwrap();

        assert_eq!(other.first_name, "John");
        assert_eq!(users.save_count(), 2);
    }

    #[tokio::test]
    async fn test_resolver_errors_reach_the_caller() {
        let dir = FakeDirectory::default();
        let (trigger, _users) = trigger(&dir);

        let err = trigger
            .on_authenticated(&mut User::new("ghost"), &AuthenticationContext::new(true))
            .await
            .unwrap_err();
        assert!(err.is_search_error());
    }
}
