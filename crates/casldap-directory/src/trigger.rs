//! Provisioning on first login

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

use casldap_core::{AuthenticationContext, AuthenticationListener, Result, User, UserRepository};

use crate::resolver::{AttributeResolver, PopulateOutcome};

/// Runs the resolver for users created by the current login.
///
/// Existing users are left alone: directory data is copied once, at
/// provisioning time, and not re-synchronised on later logins. Resolver
/// errors are returned to the login flow, which decides whether to proceed.
pub struct ProvisioningTrigger<R: UserRepository> {
    resolver: Arc<AttributeResolver<R>>,
}

impl<R: UserRepository + 'static> ProvisioningTrigger<R> {
    pub fn new(resolver: Arc<AttributeResolver<R>>) -> Self {
        Self { resolver }
    }

    /// `None` when the user already existed and nothing ran.
    #[instrument(skip(self, user), fields(username = %user.username))]
    pub async fn provision(&self, user: &mut User, created: bool) -> Result<Option<PopulateOutcome>> {
        if !created {
            debug!("Existing user; skipping LDAP provisioning");
            return Ok(None);
        }
        self.resolver.populate(user).await.map(Some)
    }
}

#[async_trait]
impl<R: UserRepository + 'static> AuthenticationListener for ProvisioningTrigger<R> {
    async fn on_authenticated(
        &self,
        user: &mut User,
        context: &AuthenticationContext,
    ) -> Result<()> {
        self.provision(user, context.created).await.map(|_| ())
    }
}
