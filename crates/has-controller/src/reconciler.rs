//! Reconciler contract.

use async_trait::async_trait;
use has_core::ObjectKey;
use std::time::Duration;

use crate::ReconcileResult;
use crate::metrics::ResourceKind;

/// What the dispatcher does with a key after a successful reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing left to do until the next watch event.
    Done,
    /// Reconcile again after the delay.
    RequeueAfter(Duration),
}

/// One pass of the control loop for a single key.
///
/// Returning an error re-enqueues the key with backoff.
#[async_trait]
pub trait Reconciler: Send + Sync {
    fn kind(&self) -> ResourceKind;

    async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<Action>;
}
