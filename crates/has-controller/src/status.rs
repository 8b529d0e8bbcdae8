//! Metadata and status write helpers shared by the reconcilers.

use has_core::ObjectKey;
use has_store::{ResourceStore, StoreObject, StoreResult};
use kube::Resource;
use tracing::debug;

/// Attempts made by [`update_status`] before a conflict is returned.
pub const MAX_CONFLICT_RETRIES: usize = 5;

pub fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Returns false when the finalizer was already present.
pub fn add_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
    if has_finalizer(obj, finalizer) {
        return false;
    }
    obj.meta_mut()
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer.to_string());
    true
}

pub fn remove_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
    let Some(finalizers) = obj.meta_mut().finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != finalizer);
    finalizers.len() != before
}

pub fn is_deleting<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

pub fn annotation<'a, K: Resource>(obj: &'a K, key: &str) -> Option<&'a str> {
    obj.meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

/// Numeric annotation; missing or malformed values read as zero.
pub fn counter<K: Resource>(obj: &K, key: &str) -> u32 {
    annotation(obj, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

pub fn set_annotation<K: Resource>(obj: &mut K, key: &str, value: impl Into<String>) {
    obj.meta_mut()
        .annotations
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), value.into());
}

pub fn remove_annotation<K: Resource>(obj: &mut K, key: &str) -> bool {
    obj.meta_mut()
        .annotations
        .as_mut()
        .is_some_and(|a| a.remove(key).is_some())
}

/// Apply `mutate` to the latest copy of an object and write its status,
/// re-reading on conflict. Nothing is written when `mutate` returns false.
/// `Ok(None)` when the object is gone.
pub async fn update_status<K, F>(
    store: &dyn ResourceStore<K>,
    key: &ObjectKey,
    mutate: F,
) -> StoreResult<Option<K>>
where
    K: StoreObject,
    F: Fn(&mut K) -> bool,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let Some(mut obj) = store.get(key).await? else {
            return Ok(None);
        };
        if !mutate(&mut obj) {
            return Ok(Some(obj));
        }
        match store.replace_status(&obj).await {
            Ok(updated) => return Ok(Some(updated)),
            Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
                debug!(key = %key, attempt, "Status write conflicted, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}
