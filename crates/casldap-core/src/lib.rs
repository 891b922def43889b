//! casldap core - domain types, settings and errors for LDAP-backed user provisioning

pub mod directory;
pub mod error;
pub mod filter;
pub mod ids;
pub mod mapping;
pub mod models;
pub mod settings;
pub mod traits;


pub use directory::*;
pub use error::*;
pub use filter::*;
pub use ids::*;
pub use mapping::*;
pub use models::*;
pub use settings::*;
pub use traits::*;
