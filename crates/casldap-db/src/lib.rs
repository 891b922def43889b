//! PostgreSQL storage for casldap user records

pub mod migrations;
pub mod pool;
pub mod repositories;


pub use migrations::run_migrations;
pub use pool::{create_pool, DatabaseConfig};
pub use repositories::*;
