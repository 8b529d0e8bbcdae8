//! Mapping cluster watch events onto work queue keys.
//!
//! Every event enqueues the object itself. Related objects are enqueued only
//! when the part of the object they depend on changed: an Application when a
//! Component joins, leaves or changes what it contributes to the Application
//! devfile, Components when their Application's devfile changes, and a
//! Component when one of its file content requests does.

use async_trait::async_trait;
use futures::StreamExt;
use has_core::ObjectKey;
use has_core::api::{Application, Component, ComponentDetectionQuery, SPIFileContentRequest};
use has_core::keys;
use has_store::ResourceStore;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, Event};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::pin::pin;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::queue::WorkQueue;
use crate::status::is_deleting;

/// Turns watch events into queue keys.
pub struct EventMapper {
    applications: WorkQueue,
    components: WorkQueue,
    detections: WorkQueue,
    component_store: Arc<dyn ResourceStore<Component>>,
    /// Last seen fingerprint per object, used to skip dependents.
    seen_applications: Mutex<HashMap<ObjectKey, u64>>,
    seen_components: Mutex<HashMap<ObjectKey, u64>>,
}

fn fingerprint(parts: impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    parts.hash(&mut hasher);
    hasher.finish()
}

/// Record `value` for `key`, returning true when it differs from the last one.
fn changed(seen: &Mutex<HashMap<ObjectKey, u64>>, key: &ObjectKey, value: u64) -> bool {
    let mut seen = seen.lock().unwrap_or_else(|e| e.into_inner());
    seen.insert(key.clone(), value) != Some(value)
}

fn forget(seen: &Mutex<HashMap<ObjectKey, u64>>, key: &ObjectKey) {
    seen.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
}

impl EventMapper {
    pub fn new(
        applications: WorkQueue,
        components: WorkQueue,
        detections: WorkQueue,
        component_store: Arc<dyn ResourceStore<Component>>,
    ) -> Self {
        Self {
            applications,
            components,
            detections,
            component_store,
            seen_applications: Mutex::new(HashMap::new()),
            seen_components: Mutex::new(HashMap::new()),
        }
    }

    pub async fn application_applied(&self, application: &Application) {
        let key = ObjectKey::of(application);
        self.applications.add(key.clone());

        let value = fingerprint((application.devfile(), is_deleting(application)));
        if changed(&self.seen_applications, &key, value) {
            self.enqueue_members(&key).await;
        }
    }

    pub async fn application_deleted(&self, application: &Application) {
        let key = ObjectKey::of(application);
        forget(&self.seen_applications, &key);
        self.enqueue_members(&key).await;
    }

    async fn enqueue_members(&self, application: &ObjectKey) {
        let components = match self.component_store.list(&application.namespace).await {
            Ok(components) => components,
            Err(e) => {
                warn!(application = %application, error = %e, "Unable to list components");
                return;
            }
        };
        for component in components
            .iter()
            .filter(|c| c.spec.application == application.name)
        {
            self.components.add(ObjectKey::of(component));
        }
    }

    pub fn component_applied(&self, component: &Component) {
        let key = ObjectKey::of(component);
        self.components.add(key.clone());

        let value = fingerprint((
            &component.spec.application,
            &component.spec.component_name,
            component.git_source().map(|g| &g.url),
            &component.spec.container_image,
            is_deleting(component),
        ));
        if changed(&self.seen_components, &key, value) {
            self.applications.add(application_key(component));
        }
    }

    pub fn component_deleted(&self, component: &Component) {
        let key = ObjectKey::of(component);
        forget(&self.seen_components, &key);
        self.components.add(key);
        self.applications.add(application_key(component));
    }

    pub fn detection_applied(&self, query: &ComponentDetectionQuery) {
        self.detections.add(ObjectKey::of(query));
    }

    /// Enqueue the Component that created a file content request, found
    /// through its controller owner or, failing that, the component label.
    pub fn file_request_applied(&self, request: &SPIFileContentRequest) {
        let namespace = request.namespace().unwrap_or_default();
        let owner = request
            .owner_references()
            .iter()
            .find(|o| o.kind == Component::kind(&()))
            .map(|o| o.name.clone())
            .or_else(|| request.labels().get(keys::LABEL_COMPONENT).cloned());
        match owner {
            Some(name) => self.components.add(ObjectKey::new(namespace, name)),
            None => debug!(request = %request.name_any(), "File content request has no owning component"),
        }
    }
}

fn application_key(component: &Component) -> ObjectKey {
    ObjectKey::new(
        component.namespace().unwrap_or_default(),
        &component.spec.application,
    )
}

/// A watched kind and how its events reach the queues.
#[async_trait]
trait Watched: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static {
    async fn applied(&self, mapper: &EventMapper);

    async fn deleted(&self, mapper: &EventMapper) {
        self.applied(mapper).await
    }
}

#[async_trait]
impl Watched for Application {
    async fn applied(&self, mapper: &EventMapper) {
        mapper.application_applied(self).await
    }

    async fn deleted(&self, mapper: &EventMapper) {
        mapper.application_deleted(self).await
    }
}

#[async_trait]
impl Watched for Component {
    async fn applied(&self, mapper: &EventMapper) {
        mapper.component_applied(self)
    }

    async fn deleted(&self, mapper: &EventMapper) {
        mapper.component_deleted(self)
    }
}

#[async_trait]
impl Watched for ComponentDetectionQuery {
    async fn applied(&self, mapper: &EventMapper) {
        mapper.detection_applied(self)
    }

    // Deleted queries need no work.
    async fn deleted(&self, _mapper: &EventMapper) {}
}

#[async_trait]
impl Watched for SPIFileContentRequest {
    async fn applied(&self, mapper: &EventMapper) {
        mapper.file_request_applied(self)
    }
}

fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// Watch the four kinds until `cancel` fires, feeding the mapper.
pub async fn run_watchers(
    client: Client,
    namespace: Option<String>,
    mapper: Arc<EventMapper>,
    cancel: CancellationToken,
) {
    let namespace = namespace.as_deref();
    let mut watches = JoinSet::new();
    watches.spawn(watch(api::<Application>(&client, namespace), mapper.clone(), cancel.clone()));
    watches.spawn(watch(api::<Component>(&client, namespace), mapper.clone(), cancel.clone()));
    watches.spawn(watch(
        api::<ComponentDetectionQuery>(&client, namespace),
        mapper.clone(),
        cancel.clone(),
    ));
    watches.spawn(watch(
        api::<SPIFileContentRequest>(&client, namespace),
        mapper,
        cancel.clone(),
    ));
    while watches.join_next().await.is_some() {}
    info!("Watchers stopped");
}

async fn watch<K: Watched>(api: Api<K>, mapper: Arc<EventMapper>, cancel: CancellationToken) {
    let kind = K::kind(&()).to_string();
    info!(kind = %kind, "Starting watch");
    let mut events = pin!(watcher::watcher(api, watcher::Config::default()).default_backoff());
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.next() => event,
        };
        match event {
            Some(Ok(Event::Apply(obj) | Event::InitApply(obj))) => obj.applied(&mapper).await,
            Some(Ok(Event::Delete(obj))) => obj.deleted(&mapper).await,
            Some(Ok(Event::Init)) => debug!(kind = %kind, "Watch (re)listing"),
            Some(Ok(Event::InitDone)) => debug!(kind = %kind, "Watch listed"),
            Some(Err(e)) => warn!(kind = %kind, error = %e, "Watch error"),
            None => break,
        }
    }
}
