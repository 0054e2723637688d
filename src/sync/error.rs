use crate::client::RemoteError;
use crate::domain::{ListId, UserId};
use crate::host::TaskError;
use crate::repo::StoreError;

pub type SyncResult<T> = Result<T, SyncError>;

/// Why a synchronization operation did not complete
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("No user found for {0}")]
    UserNotFound(String),
    #[error("Unknown list source '{0}'")]
    InvalidSource(String),
    #[error("Unexpected response from the email service: {0}")]
    RemoteProtocol(String),
    #[error("Email service call failed: {0}")]
    RemoteCall(#[source] RemoteError),
    #[error("No merge vars could be computed for list {0}")]
    NoMergeVars(ListId),
    #[error("User {0} is flagged do-not-email")]
    Suppressed(UserId),
    #[error("{} of {} lists failed", .failed.len(), .failed.len() + .succeeded.len())]
    PartialFailure {
        succeeded: Vec<ListId>,
        failed: Vec<(ListId, SyncError)>,
    },
    #[error("List {0} is not configured")]
    UnknownList(ListId),
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
    #[error("Failed to defer synchronization: {0}")]
    Deferral(#[from] TaskError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RemoteError> for SyncError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Protocol(msg) => Self::RemoteProtocol(msg),
            other => Self::RemoteCall(other),
        }
    }
}

impl SyncError {
    /// Log a failed operation; suppression is an expected skip
    pub(crate) fn log(&self, operation: &str) {
        match self {
            Self::Suppressed(user_id) => {
                tracing::debug!(operation, user_id, "Skipped, user is flagged do-not-email")
            }
            Self::PartialFailure { failed, .. } => {
                for (list_id, e) in failed {
                    tracing::warn!(operation, list_id = %list_id, "List failed: {}", e);
                }
            }
            other => tracing::warn!(operation, "Failed: {}", other),
        }
    }

    /// Lists that failed, for batch results
    pub fn failed_lists(&self) -> Vec<&ListId> {
        match self {
            Self::PartialFailure { failed, .. } => failed.iter().map(|(id, _)| id).collect(),
            _ => Vec::new(),
        }
    }
}
