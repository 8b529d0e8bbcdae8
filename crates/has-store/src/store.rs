//! Store trait.

use async_trait::async_trait;
use has_core::ObjectKey;
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

use crate::StoreResult;

/// Bounds shared by every resource kind the service stores.
pub trait StoreObject:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<K> StoreObject for K where
    K: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Namespaced CRUD over one resource kind.
///
/// Writes carrying a `resourceVersion` fail with a conflict when the stored
/// object has moved on. Deleting an object that still has finalizers only
/// marks it with a deletion timestamp; removing its last finalizer deletes it.
#[async_trait]
pub trait ResourceStore<K: StoreObject>: Send + Sync {
    /// Fetch an object; `None` when it does not exist.
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<K>>;

    /// List every object in a namespace.
    async fn list(&self, namespace: &str) -> StoreResult<Vec<K>>;

    async fn create(&self, obj: &K) -> StoreResult<K>;

    /// Replace metadata and spec. The stored status is kept.
    async fn replace(&self, obj: &K) -> StoreResult<K>;

    /// Replace the status subresource only.
    async fn replace_status(&self, obj: &K) -> StoreResult<K>;

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()>;
}
