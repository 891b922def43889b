//! Named post-population hooks
//!
//! `extra_user_init` in the settings names a hook; the name is resolved once
//! at startup against this registry so a typo fails fast instead of on the
//! first login.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use casldap_core::{CasLdapError, DirectoryEntry, ExtraUserInit, LdapSettings, Result, User};

/// Metadata key written by the built-in `store_dn` hook
pub const LDAP_DN_METADATA_KEY: &str = "ldap_dn";

/// Registry of hooks available to `extra_user_init`
#[derive(Default, Clone)]
pub struct UserInitRegistry {
    hooks: HashMap<String, Arc<dyn ExtraUserInit>>,
}

impl UserInitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in hooks
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("store_dn", |user: &mut User, entry: &DirectoryEntry| {
            user.metadata
                .insert(LDAP_DN_METADATA_KEY.to_string(), entry.dn.clone());
        });
        registry
    }

    pub fn register<H>(&mut self, name: impl Into<String>, hook: H) -> &mut Self
    where
        H: ExtraUserInit + 'static,
    {
        let name = name.into();
        debug!(hook = %name, "Registering user init hook");
        self.hooks.insert(name, Arc::new(hook));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ExtraUserInit>> {
        self.hooks.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.hooks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve the hook named by `extra_user_init`, if any.
    pub fn resolve(&self, settings: &LdapSettings) -> Result<Option<Arc<dyn ExtraUserInit>>> {
        let Some(name) = settings.extra_user_init.as_deref().filter(|n| !n.is_empty()) else {
            return Ok(None);
        };

        match self.get(name) {
            Some(hook) => {
                info!(hook = %name, "Using extra user init hook");
                Ok(Some(hook))
            }
            None => Err(CasLdapError::config_error(format!(
                "extra_user_init `{}` is not a registered hook (known: {})",
                name,
                self.names().join(", ")
            ))),
        }
    }
}
