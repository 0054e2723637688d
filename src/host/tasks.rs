use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::domain::{ListId, MergeVars, SyncAction, UserId};
use crate::host::DeferredTasks;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task queue is closed")]
    Closed,
}

/// A single-list mutation postponed for later execution
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredJob {
    pub user_id: UserId,
    pub list_id: ListId,
    pub operation: DeferredOperation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeferredOperation {
    Subscribe {
        merge_vars: Option<MergeVars>,
        action: SyncAction,
    },
    Unsubscribe {
        delete: bool,
        action: SyncAction,
    },
}

/// In-process queue of deferred jobs, drained by [`crate::sync::run_worker`]
#[derive(Debug, Clone)]
pub struct TaskQueue {
    sender: UnboundedSender<DeferredJob>,
}

impl TaskQueue {
    pub fn new() -> (Self, UnboundedReceiver<DeferredJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl DeferredTasks for TaskQueue {
    fn schedule(&self, job: DeferredJob) -> Result<(), TaskError> {
        tracing::debug!(user_id = job.user_id, list_id = %job.list_id, "Scheduling deferred job");
        self.sender.send(job).map_err(|_| TaskError::Closed)
    }
}
