//! casldap directory - LDAP lookup and attribute reconciliation
//!
//! # Architecture
//!
//! - [`DirectoryConnection`]: binds to one server of a round-robin,
//!   failover [`ServerPool`] built per lookup
//! - [`DirectorySearch`]: exactly-one-result lookup of an identity token
//! - [`AttributeResolver`]: maps the found entry onto a local [`User`]
//!   (single attributes, fallback chains, nested sub-records), runs the
//!   optional extra init hook, and saves
//! - [`ProvisioningTrigger`]: runs the resolver on a user's first login
//!
//! The transport sits behind the [`Connector`] / [`DirectorySession`] traits;
//! [`Ldap3Connector`] is the production implementation.
//!
//! [`User`]: casldap_core::User

pub mod connection;
pub mod ldap;
pub mod registry;
pub mod resolver;
pub mod search;
pub mod trigger;

#[cfg(test)]
mod tests;

pub use connection::{
    ConnectOptions, Connector, DirectoryConnection, DirectorySession, SearchRequest, SearchScope,
    ServerPool,
};
pub use ldap::Ldap3Connector;
pub use registry::UserInitRegistry;
pub use resolver::{apply_mapping, AttributeResolver, PopulateOutcome};
pub use search::{check_token, DirectorySearch};
pub use trigger::ProvisioningTrigger;

pub use casldap_core::*;
