use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{RemoteInfo, SubscriberStatus, UserId};
use crate::repo::{StoreError, StoreResult};

/// Whether a write may notify host-side change listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Triggers {
    Fire,
    /// Write without notifying, so a sync cannot re-trigger itself
    Suppress,
}

/// Per-user persistence of the status snapshot and the remote metadata cache.
///
/// Both records are replaced whole on every write; last write wins.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn status(&self, user_id: UserId) -> StoreResult<Option<SubscriberStatus>>;

    async fn save_status(
        &self,
        user_id: UserId,
        status: &SubscriberStatus,
        triggers: Triggers,
    ) -> StoreResult<()>;

    /// Missing records read as an empty map
    async fn remote_info(&self, user_id: UserId) -> StoreResult<RemoteInfo>;

    async fn save_remote_info(
        &self,
        user_id: UserId,
        info: &RemoteInfo,
        triggers: Triggers,
    ) -> StoreResult<()>;
}

#[derive(Debug, Default)]
struct Records {
    status: HashMap<UserId, SubscriberStatus>,
    remote_info: HashMap<UserId, RemoteInfo>,
    notifications: Vec<UserId>,
}

/// In-process store, also recording the change notifications a write fired
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    records: Mutex<Records>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// User ids whose writes fired change notifications, in order
    pub fn notifications(&self) -> Vec<UserId> {
        self.records
            .lock()
            .map(|records| records.notifications.clone())
            .unwrap_or_default()
    }

    fn with_records<T>(&self, f: impl FnOnce(&mut Records) -> T) -> StoreResult<T> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("status store lock poisoned".into()))?;
        Ok(f(&mut records))
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn status(&self, user_id: UserId) -> StoreResult<Option<SubscriberStatus>> {
        self.with_records(|records| records.status.get(&user_id).cloned())
    }

    async fn save_status(
        &self,
        user_id: UserId,
        status: &SubscriberStatus,
        triggers: Triggers,
    ) -> StoreResult<()> {
        self.with_records(|records| {
            records.status.insert(user_id, status.clone());
            if triggers == Triggers::Fire {
                records.notifications.push(user_id);
            }
        })
    }

    async fn remote_info(&self, user_id: UserId) -> StoreResult<RemoteInfo> {
        self.with_records(|records| {
            records
                .remote_info
                .get(&user_id)
                .cloned()
                .unwrap_or_default()
        })
    }

    async fn save_remote_info(
        &self,
        user_id: UserId,
        info: &RemoteInfo,
        triggers: Triggers,
    ) -> StoreResult<()> {
        self.with_records(|records| {
            records.remote_info.insert(user_id, info.clone());
            if triggers == Triggers::Fire {
                records.notifications.push(user_id);
            }
        })
    }
}
