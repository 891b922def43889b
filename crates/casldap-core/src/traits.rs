//! Seams between the directory engine and its host application

use async_trait::async_trait;
use std::collections::HashMap;

use crate::{directory::DirectoryEntry, error::Result, models::User};

// =============================================================================
// User Storage
// =============================================================================

/// Persistence for local user records
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn create(&self, user: &User) -> Result<User>;

    /// Write every field of an existing record. Completes before returning.
    async fn save(&self, user: &User) -> Result<()>;

    /// Fetch the record for `username`, creating an empty one if needed.
    /// The flag is true when the record was created by this call.
    async fn get_or_create(&self, username: &str) -> Result<(User, bool)> {
        if let Some(user) = self.get_by_username(username).await? {
            return Ok((user, false));
        }
        let user = self.create(&User::new(username)).await?;
        Ok((user, true))
    }
}

// =============================================================================
// Post-population Hook
// =============================================================================

/// Custom initialisation run after attribute mapping and before save.
pub trait ExtraUserInit: Send + Sync {
    fn init(&self, user: &mut User, entry: &DirectoryEntry);
}

impl<F> ExtraUserInit for F
where
    F: Fn(&mut User, &DirectoryEntry) + Send + Sync,
{
    fn init(&self, user: &mut User, entry: &DirectoryEntry) {
        self(user, entry)
    }
}

// =============================================================================
// Authentication Events
// =============================================================================

/// Context handed over by the single-sign-on layer on a successful login
#[derive(Debug, Clone, Default)]
pub struct AuthenticationContext {
    /// The local record was created by this login
    pub created: bool,
    /// Attributes released by the SSO server
    pub attributes: HashMap<String, String>,
    pub ticket: Option<String>,
    pub service: Option<String>,
}

impl AuthenticationContext {
    pub fn new(created: bool) -> Self {
        Self {
            created,
            ..Self::default()
        }
    }
}

/// Receiver of authentication-success events
#[async_trait]
pub trait AuthenticationListener: Send + Sync {
    async fn on_authenticated(&self, user: &mut User, context: &AuthenticationContext)
        -> Result<()>;
}
