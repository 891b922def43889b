//! Schema setup

use sqlx::PgPool;
use tracing::info;

use casldap_core::{CasLdapError, Result};

/// Embedded migrations, applied in order. Each is idempotent.
pub const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_users",
    include_str!("../migrations/0001_users.sql"),
)];

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for (name, sql) in MIGRATIONS {
        info!(migration = %name, "Applying migration");
        sqlx::raw_sql(sql)
            .execute(pool)
            .await
            .map_err(|e| CasLdapError::database_error(format!("Migration {} failed: {}", name, e)))?;
    }
    Ok(())
}
