//! Repository implementations for PostgreSQL

pub mod user;

pub use user::*;
