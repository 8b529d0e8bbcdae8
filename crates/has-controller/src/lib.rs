//! Reconcilers for the application service.
//!
//! This crate handles:
//! - A per-kind work queue with de-duplication and exponential backoff
//! - Worker pools draining the queues until cancelled
//! - The Application, Component and ComponentDetectionQuery reconcilers
//! - The Component and Application finalizers
//! - Mapping cluster watch events onto queue keys
//! - Reconcile and git import metrics

pub mod application;
pub mod component;
pub mod config;
pub mod context;
pub mod detection;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod reconciler;
pub mod repository;
pub mod status;
pub mod watch;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::OperatorConfig;
pub use context::Context;
pub use error::{ReconcileError, ReconcileResult};
pub use metrics::{Metrics, ResourceKind};
pub use queue::WorkQueue;
pub use reconciler::{Action, Reconciler};
pub use repository::RepositoryManager;
pub use watch::{EventMapper, run_watchers};
pub use worker::WorkerPool;
