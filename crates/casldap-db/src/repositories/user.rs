//! User repository implementation

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use casldap_core::{CasLdapError, Result, User, UserId, UserRepository};

const SELECT_USER: &str = r#"
    SELECT id, username, first_name, last_name, email, is_staff, is_superuser,
           metadata, related, created_at, updated_at
    FROM users
"#;

/// PostgreSQL implementation of UserRepository
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_err(e: sqlx::Error) -> CasLdapError {
    CasLdapError::database_error(e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| CasLdapError::Internal {
        message: e.to_string(),
    })
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let metadata: serde_json::Value = row.try_get("metadata").map_err(db_err)?;
    let related: serde_json::Value = row.try_get("related").map_err(db_err)?;

    Ok(User {
        id: UserId::from_uuid(row.try_get("id").map_err(db_err)?),
        username: row.try_get("username").map_err(db_err)?,
        first_name: row.try_get("first_name").map_err(db_err)?,
        last_name: row.try_get("last_name").map_err(db_err)?,
        email: row.try_get("email").map_err(db_err)?,
        is_staff: row.try_get("is_staff").map_err(db_err)?,
        is_superuser: row.try_get("is_superuser").map_err(db_err)?,
        metadata: serde_json::from_value(metadata).unwrap_or_default(),
        related: serde_json::from_value(related).unwrap_or_default(),
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

#[async_trait]
impl UserRepository for PgUserRepository {
    #[instrument(skip(self))]
    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("{} WHERE username = $1", SELECT_USER))
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn create(&self, user: &User) -> Result<User> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, first_name, last_name, email, is_staff,
                               is_superuser, metadata, related, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .bind(to_json(&user.metadata)?)
        .bind(to_json(&user.related)?)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!("Created user");
        Ok(user.clone())
    }

    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn save(&self, user: &User) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, email = $4, is_staff = $5,
                is_superuser = $6, metadata = $7, related = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .bind(to_json(&user.metadata)?)
        .bind(to_json(&user.related)?)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(CasLdapError::not_found("user", user.id.to_string()));
        }
        Ok(())
    }
}
