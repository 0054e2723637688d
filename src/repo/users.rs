use std::collections::BTreeMap;

use async_trait::async_trait;

use serde_json::Value;

use sqlx::types::Json;
use sqlx::PgPool;

use crate::domain::{User, UserId};
use crate::host::{SuppressionPolicy, UserDirectory};
use crate::repo::StoreResult;

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    login: String,
    email: String,
    attributes: Json<BTreeMap<String, Value>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            login: row.login,
            email: row.email,
            attributes: row.attributes.0,
        }
    }
}

/// Host user records and their do-not-email flag, read from the `users` table
#[derive(Debug, Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Set the do-not-email flag, as the host does when asked to
    #[tracing::instrument(name = "Set do-not-email flag", skip(self))]
    pub async fn set_do_not_email(&self, user_id: UserId, flag: bool) -> StoreResult<()> {
        sqlx::query("update users set do_not_email = $2 where id = $1")
            .bind(user_id)
            .bind(flag)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    #[tracing::instrument(name = "Fetch user by id", skip(self))]
    async fn find_by_id(&self, user_id: UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "select id, login, email, attributes from users where id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    #[tracing::instrument(name = "Fetch user by email", skip(self))]
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "select id, login, email, attributes from users where lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }
}

#[async_trait]
impl SuppressionPolicy for PgUserDirectory {
    async fn is_suppressed(&self, user_id: UserId) -> bool {
        let flag: Result<Option<(bool,)>, _> =
            sqlx::query_as("select do_not_email from users where id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await;

        match flag {
            Ok(row) => row.map(|(flag,)| flag).unwrap_or(false),
            Err(e) => {
                // Unknown policy state must not leak mail
                tracing::warn!(user_id, "Failed to read do-not-email flag: {}", e);
                true
            }
        }
    }
}
