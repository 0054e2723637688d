use crate::domain::{ListId, User, UserId};
use crate::host::SyncObserver;

/// Observer that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn synchronized(&self, user: &User, list_id: &ListId) {
        tracing::info!(user_id = user.id, list_id = %list_id, "User synchronized");
    }

    fn do_not_email(&self, user_id: UserId, flag: bool) {
        tracing::info!(user_id, flag, "Do-not-email flag requested");
    }
}
