use tokio::sync::mpsc::UnboundedReceiver;

use crate::host::DeferredJob;
use crate::sync::SubscriptionEngine;

/// Drain deferred jobs, running each inline until every sender is dropped
pub async fn run_worker(mut receiver: UnboundedReceiver<DeferredJob>, engine: SubscriptionEngine) {
    while let Some(job) = receiver.recv().await {
        // Failures are logged by the engine
        let _ = engine.run_job(job).await;
    }

    tracing::info!("Deferred task queue closed");
}
