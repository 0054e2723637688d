use async_trait::async_trait;

use chrono::Utc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use sqlx::PgPool;

use crate::domain::{RemoteInfo, SubscriberStatus, UserId};
use crate::repo::{StatusStore, StoreResult, Triggers};

/// Channel host-side listeners receive user change notifications on
pub const CHANGE_CHANNEL: &str = "user_changed";

const STATUS_RECORD: &str = "status";
const REMOTE_INFO_RECORD: &str = "remote_info";

/// Status store over the `subscriber_status` table, one JSONB row per record
#[derive(Debug, Clone)]
pub struct PgStatusStore {
    pool: PgPool,
}

impl PgStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch<T>(&self, user_id: UserId, record: &str) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            "select value from subscriber_status where user_id = $1 and record = $2",
        )
        .bind(user_id)
        .bind(record)
        .fetch_optional(&self.pool)
        .await?;

        let value = row
            .map(|(value,)| serde_json::from_value(value))
            .transpose()?;

        Ok(value)
    }

    async fn store<T>(
        &self,
        user_id: UserId,
        record: &str,
        value: &T,
        triggers: Triggers,
    ) -> StoreResult<()>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(value)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "insert into subscriber_status(user_id, record, value, updated_at) values ($1, $2, $3, $4) \
             on conflict (user_id, record) do update set value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(record)
        .bind(&value)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if triggers == Triggers::Fire {
            sqlx::query("select pg_notify($1, $2)")
                .bind(CHANGE_CHANNEL)
                .bind(user_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(())
    }
}

#[async_trait]
impl StatusStore for PgStatusStore {
    #[tracing::instrument(name = "Fetch subscriber status", skip(self))]
    async fn status(&self, user_id: UserId) -> StoreResult<Option<SubscriberStatus>> {
        self.fetch(user_id, STATUS_RECORD).await
    }

    #[tracing::instrument(name = "Save subscriber status", skip(self, status))]
    async fn save_status(
        &self,
        user_id: UserId,
        status: &SubscriberStatus,
        triggers: Triggers,
    ) -> StoreResult<()> {
        self.store(user_id, STATUS_RECORD, status, triggers).await
    }

    #[tracing::instrument(name = "Fetch subscriber remote info", skip(self))]
    async fn remote_info(&self, user_id: UserId) -> StoreResult<RemoteInfo> {
        Ok(self
            .fetch(user_id, REMOTE_INFO_RECORD)
            .await?
            .unwrap_or_default())
    }

    #[tracing::instrument(name = "Save subscriber remote info", skip(self, info))]
    async fn save_remote_info(
        &self,
        user_id: UserId,
        info: &RemoteInfo,
        triggers: Triggers,
    ) -> StoreResult<()> {
        self.store(user_id, REMOTE_INFO_RECORD, info, triggers).await
    }
}
