//! Store backed by the Kubernetes API.

use async_trait::async_trait;
use has_core::ObjectKey;
use kube::Api;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::client::Client;
use std::marker::PhantomData;
use tracing::debug;

use crate::{ResourceStore, StoreError, StoreObject, StoreResult};

/// Store for one resource kind backed by the cluster API.
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> Clone for KubeStore<K> {
    fn clone(&self) -> Self {
        Self::new(self.client.clone())
    }
}

fn map_error(err: kube::Error, what: &str) -> StoreError {
    match &err {
        kube::Error::Api(response) => match response.code {
            404 => StoreError::NotFound(what.to_string()),
            409 => StoreError::Conflict(format!("{}: {}", what, response.message)),
            422 => StoreError::Invalid(format!("{}: {}", what, response.message)),
            _ => StoreError::Kube(err),
        },
        _ => StoreError::Kube(err),
    }
}

fn key_of<K: StoreObject>(obj: &K) -> StoreResult<ObjectKey> {
    let meta = obj.meta();
    match (meta.namespace.as_deref(), meta.name.as_deref()) {
        (Some(ns), Some(name)) => Ok(ObjectKey::new(ns, name)),
        _ => Err(StoreError::Invalid(
            "object has no namespace or name".to_string(),
        )),
    }
}

impl<K: StoreObject> KubeStore<K> {
    fn api(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl<K> ResourceStore<K> for KubeStore<K>
where
    K: StoreObject + kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
{
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<K>> {
        self.api(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| map_error(e, &key.to_string()))
    }

    async fn list(&self, namespace: &str) -> StoreResult<Vec<K>> {
        let list = self
            .api(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| map_error(e, namespace))?;
        Ok(list.items)
    }

    async fn create(&self, obj: &K) -> StoreResult<K> {
        let key = key_of(obj)?;
        debug!(kind = %K::kind(&()), key = %key, "Creating object");
        self.api(&key.namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| match map_error(e, &key.to_string()) {
                StoreError::Conflict(msg) => StoreError::AlreadyExists(msg),
                other => other,
            })
    }

    async fn replace(&self, obj: &K) -> StoreResult<K> {
        let key = key_of(obj)?;
        self.api(&key.namespace)
            .replace(&key.name, &PostParams::default(), obj)
            .await
            .map_err(|e| map_error(e, &key.to_string()))
    }

    async fn replace_status(&self, obj: &K) -> StoreResult<K> {
        let key = key_of(obj)?;
        let body = serde_json::to_vec(obj)?;
        self.api(&key.namespace)
            .replace_status(&key.name, &PostParams::default(), body)
            .await
            .map_err(|e| map_error(e, &key.to_string()))
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        debug!(kind = %K::kind(&()), key = %key, "Deleting object");
        self.api(&key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await
            .map_err(|e| map_error(e, &key.to_string()))?;
        Ok(())
    }
}
