//! Attribute reconciliation: directory entry -> local user record

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use casldap_core::{
    AttributeMap, DirectoryEntry, ExtraUserInit, FieldMapping, LdapSettings, Result, User,
    UserRepository,
};

use crate::connection::Connector;
use crate::registry::UserInitRegistry;
use crate::search::DirectorySearch;

/// What a call to [`AttributeResolver::populate`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopulateOutcome {
    /// No attribute map configured; nothing was looked up or saved
    NotConfigured,
    /// The record was populated from the entry at `dn` and saved
    Populated { dn: String },
}

/// Copy mapped attributes from `entry` onto `user`.
///
/// Nested mappings use the same fallback-chain resolution as top-level ones.
/// A field whose every candidate is absent is set to the empty string.
/// Returns how many fields were resolved from a present attribute.
pub fn apply_mapping(map: &AttributeMap, entry: &DirectoryEntry, user: &mut User) -> usize {
    let mut resolved = 0;

    for (field, mapping) in map {
        match mapping {
            FieldMapping::Attribute(source) => {
                let value = match source.resolve_present(entry) {
                    Some((attr, value)) => {
                        debug!(field = %field, attr = %attr, "Mapped field");
                        resolved += 1;
                        value.to_string()
                    }
                    None => {
                        debug!(field = %field, candidates = ?source.candidates(), "No mapped attribute present");
                        String::new()
                    }
                };
                user.set_field(field, value);
            }
            FieldMapping::Nested(sub_fields) => {
                for (sub_field, source) in sub_fields {
                    if source.resolve_present(entry).is_some() {
                        resolved += 1;
                    }
                    user.set_related_field(field, sub_field, source.resolve(entry));
                }
            }
        }
    }

    resolved
}

/// Populates local users from the directory according to the attribute map
pub struct AttributeResolver<R: UserRepository> {
    settings: Arc<LdapSettings>,
    connector: Arc<dyn Connector>,
    users: Arc<R>,
    extra_init: Option<Arc<dyn ExtraUserInit>>,
}

impl<R: UserRepository + 'static> AttributeResolver<R> {
    pub fn new(settings: Arc<LdapSettings>, connector: Arc<dyn Connector>, users: Arc<R>) -> Self {
        let unrequested = settings.unrequested_mapped_attributes();
        if !unrequested.is_empty() {
            warn!(
                attributes = ?unrequested,
                "Mapped attributes are not in the configured attribute list and will resolve empty"
            );
        }

        Self {
            settings,
            connector,
            users,
            extra_init: None,
        }
    }

    /// Build a resolver whose `extra_user_init` hook is looked up in `registry`.
    pub fn from_registry(
        settings: Arc<LdapSettings>,
        connector: Arc<dyn Connector>,
        users: Arc<R>,
        registry: &UserInitRegistry,
    ) -> Result<Self> {
        let extra_init = registry.resolve(&settings)?;
        let mut resolver = Self::new(settings, connector, users);
        resolver.extra_init = extra_init;
        Ok(resolver)
    }

    pub fn with_extra_init(mut self, hook: Arc<dyn ExtraUserInit>) -> Self {
        self.extra_init = Some(hook);
        self
    }

    pub fn settings(&self) -> &Arc<LdapSettings> {
        &self.settings
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        self.connector.clone()
    }

    pub fn users(&self) -> &Arc<R> {
        &self.users
    }

    /// Look `user` up by username, map the entry onto it, run the extra init
    /// hook, then save once.
    ///
    /// A failed lookup leaves `user` untouched and unsaved. Without an
    /// attribute map this is a logged no-op that never contacts the directory.
    #[instrument(skip(self, user), fields(username = %user.username))]
    pub async fn populate(&self, user: &mut User) -> Result<PopulateOutcome> {
        let Some(map) = self.settings.attribute_map() else {
            warn!("No attribute map configured; not populating user info from LDAP");
            return Ok(PopulateOutcome::NotConfigured);
        };

        let entry = DirectorySearch::lookup(
            self.settings.clone(),
            self.connector.as_ref(),
            &user.username,
            false,
        )
        .await?;

        let resolved = apply_mapping(map, &entry, user);

        if let Some(hook) = &self.extra_init {
            hook.init(user, &entry);
        }

        user.touch();
        self.users.save(user).await?;

        info!(
            dn = %entry.dn,
            fields = map.len(),
            resolved,
            "Populated user from LDAP"
        );

        Ok(PopulateOutcome::Populated { dn: entry.dn })
    }
}
