//! Local user record populated from the directory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::UserId;

/// Field names stored in dedicated columns. Any other mapped field lands in
/// [`User::metadata`].
pub const USER_COLUMNS: [&str; 3] = ["first_name", "last_name", "email"];

/// A local user account, keyed by its identity token (`username`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Identity token: directory search key and unique local key
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    /// Mapped fields without a dedicated column
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Related sub-records (e.g. a profile), keyed by relation then sub-field
    #[serde(default)]
    pub related: BTreeMap<String, BTreeMap<String, String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            username: username.into(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            is_staff: false,
            is_superuser: false,
            metadata: BTreeMap::new(),
            related: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn identity_token(&self) -> &str {
        &self.username
    }

    /// Assign a mapped field by name. Never fails: unknown names go to `metadata`.
    pub fn set_field(&mut self, field: &str, value: String) {
        match field {
            "first_name" => self.first_name = value,
            "last_name" => self.last_name = value,
            "email" => self.email = value,
            _ => {
                self.metadata.insert(field.to_string(), value);
            }
        }
    }

    pub fn field(&self, field: &str) -> Option<&str> {
        match field {
            "username" => Some(&self.username),
            "first_name" => Some(&self.first_name),
            "last_name" => Some(&self.last_name),
            "email" => Some(&self.email),
            _ => self.metadata.get(field).map(String::as_str),
        }
    }

    pub fn set_related_field(&mut self, relation: &str, field: &str, value: String) {
        self.related
            .entry(relation.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }

    pub fn related_field(&self, relation: &str, field: &str) -> Option<&str> {
        self.related
            .get(relation)
            .and_then(|sub| sub.get(field))
            .map(String::as_str)
    }

    /// Apply a permission escalation requested by an operator.
    pub fn grant(&mut self, grant: PrivilegeGrant) {
        match grant {
            PrivilegeGrant::None => {}
            PrivilegeGrant::Staff => self.is_staff = true,
            PrivilegeGrant::Admin => {
                self.is_staff = true;
                self.is_superuser = true;
            }
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Extra permissions given to an account at provisioning time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeGrant {
    #[default]
    None,
    Staff,
    /// Superuser; implies staff
    Admin,
}
