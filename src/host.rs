//! Interfaces to the host application this crate synchronizes on behalf of.

mod observer;
mod tasks;

pub use observer::TracingObserver;
pub use tasks::{DeferredJob, DeferredOperation, TaskError, TaskQueue};

use async_trait::async_trait;

use crate::domain::{ListId, User, UserId};
use crate::repo::StoreResult;

/// Read access to the host's user records
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, user_id: UserId) -> StoreResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
}

/// The host's do-not-email policy
#[async_trait]
pub trait SuppressionPolicy: Send + Sync {
    async fn is_suppressed(&self, user_id: UserId) -> bool;
}

/// Policy that never suppresses anyone
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSuppression;

#[async_trait]
impl SuppressionPolicy for NoSuppression {
    async fn is_suppressed(&self, _user_id: UserId) -> bool {
        false
    }
}

/// External facility that runs synchronization jobs later
pub trait DeferredTasks: Send + Sync {
    fn schedule(&self, job: DeferredJob) -> Result<(), TaskError>;
}

/// Notifications emitted back to the host
pub trait SyncObserver: Send + Sync {
    /// A user was synchronized with a list
    fn synchronized(&self, user: &User, list_id: &ListId);

    /// The host should update the user's do-not-email flag
    fn do_not_email(&self, user_id: UserId, flag: bool);
}
