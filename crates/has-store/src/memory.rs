//! In-memory store.
//!
//! Mirrors the API server behavior the reconcilers depend on: resource
//! versions, status as a separate subresource, and finalizer-gated deletion.

use async_trait::async_trait;
use chrono::Utc;
use has_core::ObjectKey;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::{ResourceStore, StoreError, StoreObject, StoreResult};

pub struct MemoryStore<K> {
    objects: Mutex<BTreeMap<ObjectKey, K>>,
    version: AtomicU64,
    write_conflicts: AtomicUsize,
    status_conflicts: AtomicUsize,
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            version: AtomicU64::new(0),
            write_conflicts: AtomicUsize::new(0),
            status_conflicts: AtomicUsize::new(0),
        }
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Copy the `status` field of `source` onto `target`.
fn with_status_of<K: StoreObject>(target: &K, source: &K) -> StoreResult<K> {
    let mut value = serde_json::to_value(target)?;
    let status = serde_json::to_value(source)?
        .get("status")
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    if let Some(map) = value.as_object_mut() {
        if status.is_null() {
            map.remove("status");
        } else {
            map.insert("status".to_string(), status);
        }
    }
    Ok(serde_json::from_value(value)?)
}

impl<K: StoreObject> MemoryStore<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ObjectKey, K>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn key_of(obj: &K) -> StoreResult<ObjectKey> {
        let meta = obj.meta();
        match (meta.namespace.as_deref(), meta.name.as_deref()) {
            (Some(ns), Some(name)) if !name.is_empty() => Ok(ObjectKey::new(ns, name)),
            _ => Err(StoreError::Invalid(
                "object has no namespace or name".to_string(),
            )),
        }
    }

    fn check_version(key: &ObjectKey, stored: &K, incoming: &K) -> StoreResult<()> {
        let expected = incoming.meta().resource_version.as_deref();
        let actual = stored.meta().resource_version.as_deref();
        match expected {
            Some(v) if Some(v) != actual => Err(StoreError::Conflict(format!(
                "{key}: the object has been modified; please apply your changes to the latest version"
            ))),
            _ => Ok(()),
        }
    }

    /// Seed an object as if it had been created by a client.
    pub fn insert(&self, obj: K) -> K {
        let mut obj = obj;
        let key = ObjectKey::of(&obj);
        obj.meta_mut().resource_version = Some(self.next_version());
        self.lock().insert(key, obj.clone());
        obj
    }

    /// Stored copy of an object, bypassing the async interface.
    pub fn snapshot(&self, key: &ObjectKey) -> Option<K> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Make the next `n` spec/metadata writes fail with a conflict.
    pub fn inject_conflicts(&self, n: usize) {
        self.write_conflicts.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` status writes fail with a conflict.
    pub fn inject_status_conflicts(&self, n: usize) {
        self.status_conflicts.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl<K: StoreObject> ResourceStore<K> for MemoryStore<K> {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<K>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn list(&self, namespace: &str) -> StoreResult<Vec<K>> {
        Ok(self
            .lock()
            .iter()
            .filter(|(key, _)| key.namespace == namespace)
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, obj: &K) -> StoreResult<K> {
        let key = Self::key_of(obj)?;
        let mut objects = self.lock();
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }

        let mut created = obj.clone();
        let version = self.next_version();
        let meta = created.meta_mut();
        meta.uid = Some(format!("uid-{version}"));
        meta.resource_version = Some(version);
        meta.creation_timestamp = Some(Time(Utc::now()));
        meta.deletion_timestamp = None;
        objects.insert(key, created.clone());
        Ok(created)
    }

    async fn replace(&self, obj: &K) -> StoreResult<K> {
        let key = Self::key_of(obj)?;
        let mut objects = self.lock();
        let stored = objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Self::check_version(&key, stored, obj)?;
        if take_one(&self.write_conflicts) {
            return Err(StoreError::Conflict(key.to_string()));
        }

        let mut updated = with_status_of(obj, stored)?;
        let stored_meta = stored.meta();
        let uid = stored_meta.uid.clone();
        let created_at = stored_meta.creation_timestamp.clone();
        let deleted_at = stored_meta.deletion_timestamp.clone();

        let meta = updated.meta_mut();
        meta.uid = uid;
        meta.creation_timestamp = created_at;
        meta.deletion_timestamp = deleted_at;
        meta.resource_version = Some(self.next_version());

        let finalizers_empty = meta.finalizers.as_ref().is_none_or(|f| f.is_empty());
        if meta.deletion_timestamp.is_some() && finalizers_empty {
            objects.remove(&key);
        } else {
            objects.insert(key, updated.clone());
        }
        Ok(updated)
    }

    async fn replace_status(&self, obj: &K) -> StoreResult<K> {
        let key = Self::key_of(obj)?;
        let mut objects = self.lock();
        let stored = objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Self::check_version(&key, stored, obj)?;
        if take_one(&self.status_conflicts) {
            return Err(StoreError::Conflict(key.to_string()));
        }

        let mut updated = with_status_of(stored, obj)?;
        updated.meta_mut().resource_version = Some(self.next_version());
        objects.insert(key, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        let mut objects = self.lock();
        let Some(stored) = objects.get_mut(key) else {
            return Err(StoreError::NotFound(key.to_string()));
        };

        let has_finalizers = stored
            .meta()
            .finalizers
            .as_ref()
            .is_some_and(|f| !f.is_empty());
        if !has_finalizers {
            objects.remove(key);
            return Ok(());
        }

        if stored.meta().deletion_timestamp.is_none() {
            let version = self.next_version();
            let meta = stored.meta_mut();
            meta.deletion_timestamp = Some(Time(Utc::now()));
            meta.resource_version = Some(version);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use has_core::api::{Application, ApplicationSpec, ApplicationStatus};
    use kube::api::ObjectMeta;

    fn app(name: &str) -> Application {
        let mut app = Application::new(
            name,
            ApplicationSpec {
                display_name: name.to_string(),
                ..Default::default()
            },
        );
        app.metadata.namespace = Some("default".to_string());
        app
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::<Application>::new();
        let created = store.create(&app("a1")).await.unwrap();
        assert!(created.metadata.resource_version.is_some());
        assert!(created.metadata.uid.is_some());

        let key = ObjectKey::new("default", "a1");
        let fetched = store.get(&key).await.unwrap().unwrap();
        assert_eq!(fetched.spec.display_name, "a1");

        let err = store.create(&app("a1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert!(store.get(&ObjectKey::new("default", "other")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let store = MemoryStore::<Application>::new();
        let created = store.create(&app("a1")).await.unwrap();

        let mut first = created.clone();
        first.spec.description = "first".to_string();
        store.replace(&first).await.unwrap();

        let mut second = created;
        second.spec.description = "second".to_string();
        let err = store.replace(&second).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_status_is_a_separate_subresource() {
        let store = MemoryStore::<Application>::new();
        let created = store.create(&app("a1")).await.unwrap();

        let mut with_status = created.clone();
        with_status.status = Some(ApplicationStatus {
            devfile: Some("schemaVersion: 2.2.0\n".to_string()),
            ..Default::default()
        });
        let updated = store.replace_status(&with_status).await.unwrap();
        assert!(updated.status.is_some());

        // A spec write without status keeps the stored status.
        let mut spec_only = updated.clone();
        spec_only.status = None;
        spec_only.spec.description = "changed".to_string();
        let replaced = store.replace(&spec_only).await.unwrap();
        assert!(replaced.status.is_some());
        assert_eq!(replaced.spec.description, "changed");
    }

    #[tokio::test]
    async fn test_delete_waits_for_finalizers() {
        let store = MemoryStore::<Application>::new();
        let mut obj = app("a1");
        obj.metadata = ObjectMeta {
            finalizers: Some(vec!["example.com/finalizer".to_string()]),
            ..obj.metadata
        };
        store.create(&obj).await.unwrap();
        let key = ObjectKey::new("default", "a1");

        store.delete(&key).await.unwrap();
        let marked = store.get(&key).await.unwrap().unwrap();
        assert!(marked.metadata.deletion_timestamp.is_some());

        let mut released = marked;
        released.metadata.finalizers = Some(vec![]);
        store.replace(&released).await.unwrap();
        assert!(!store.contains(&key));

        let err = store.delete(&key).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_conflicts() {
        let store = MemoryStore::<Application>::new();
        let created = store.create(&app("a1")).await.unwrap();

        store.inject_status_conflicts(1);
        assert!(store.replace_status(&created).await.unwrap_err().is_conflict());
        store.replace_status(&created).await.unwrap();
    }
}
