//! Resource store for the application service.
//!
//! Provides the store trait used by the reconcilers, backed by the cluster API
//! in production and by an in-memory map in tests.

pub mod cluster;
pub mod error;
pub mod memory;
pub mod store;

pub use cluster::KubeStore;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use store::{ResourceStore, StoreObject};
