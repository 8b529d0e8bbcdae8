//! Worker pool draining a work queue.

use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::queue::WorkQueue;
use crate::reconciler::{Action, Reconciler};

/// Runs `workers` concurrent reconcile loops over one queue.
pub struct WorkerPool {
    queue: WorkQueue,
    reconciler: Arc<dyn Reconciler>,
    workers: usize,
}

impl WorkerPool {
    pub fn new(queue: WorkQueue, reconciler: Arc<dyn Reconciler>, workers: usize) -> Self {
        Self {
            queue,
            reconciler,
            workers: workers.max(1),
        }
    }

    /// Run until `cancel` fires. In-flight reconciles are dropped on
    /// cancellation, which releases their scoped resources.
    pub async fn run(self, cancel: CancellationToken) {
        let kind = self.reconciler.kind();
        info!(kind = %kind, workers = self.workers, "Starting workers");

        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            let queue = self.queue.clone();
            let reconciler = self.reconciler.clone();
            let cancel = cancel.clone();
            workers.spawn(async move { run_worker(id, queue, reconciler, cancel).await });
        }

        cancel.cancelled().await;
        self.queue.shut_down();
        while workers.join_next().await.is_some() {}
        info!(kind = %kind, "Workers stopped");
    }
}

async fn run_worker(
    id: usize,
    queue: WorkQueue,
    reconciler: Arc<dyn Reconciler>,
    cancel: CancellationToken,
) {
    let kind = reconciler.kind();
    loop {
        let key = tokio::select! {
            _ = cancel.cancelled() => break,
            key = queue.get() => match key {
                Some(key) => key,
                None => break,
            },
        };

        debug!(kind = %kind, worker = id, key = %key, "Reconciling");
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                queue.done(&key);
                break;
            }
            result = reconciler.reconcile(&key) => result,
        };

        match result {
            Ok(Action::Done) => queue.forget(&key),
            Ok(Action::RequeueAfter(delay)) => {
                queue.forget(&key);
                queue.add_after(key.clone(), delay);
            }
            Err(e) if e.is_conflict() => {
                debug!(kind = %kind, key = %key, "Conflict, requeueing");
                queue.add_rate_limited(key.clone());
            }
            Err(e) => {
                warn!(kind = %kind, key = %key, error = %e, "Reconcile failed");
                queue.add_rate_limited(key.clone());
            }
        }
        queue.done(&key);
    }
}
