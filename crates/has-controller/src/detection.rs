//! ComponentDetectionQuery reconciler.
//!
//! A query is processed once: the repository is analyzed, every detected
//! context becomes a Component stub, and the query is marked Completed.
//! Completed queries are never analyzed again.

use async_trait::async_trait;
use has_core::analyzer::{AnalysisRequest, AnalysisResult, DetectedContext, ROOT_CONTEXT};
use has_core::api::{
    ComponentDetectionDescription, ComponentDetectionQuery, ComponentDetectionQueryStatus,
    ComponentSource, ComponentSpec, GitSource, normalize_context,
};
use has_core::condition::{
    ConditionType, error_condition, find_condition, is_condition_true, ok_condition, set_condition,
};
use has_core::keys::PLACEHOLDER_APPLICATION;
use has_core::naming::{NameRequest, resolve_component_name};
use has_core::sanitize::sanitize_message;
use has_core::ObjectKey;
use has_devfile::deployment::{DeploymentParams, render_deployment};
use has_devfile::stub::extract_stub;
use has_devfile::Devfile;
use has_source::resolve::absolutize_kubernetes_uri;
use kube::ResourceExt;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::ReconcileResult;
use crate::metrics::ResourceKind;
use crate::queue::backoff;
use crate::reconciler::{Action, Reconciler};
use crate::status::update_status;

const MAX_ANALYZER_BACKOFF: Duration = Duration::from_secs(30);

type Detected = BTreeMap<String, ComponentDetectionDescription>;

pub struct DetectionReconciler {
    ctx: Arc<Context>,
}

impl DetectionReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    async fn reconcile_query(&self, key: &ObjectKey) -> ReconcileResult<Action> {
        let store = self.ctx.stores.detections.as_ref();
        let Some(query) = store.get(key).await? else {
            debug!(query = %key, "ComponentDetectionQuery no longer exists");
            return Ok(Action::Done);
        };
        if find_condition(query.conditions(), ConditionType::Completed).is_some() {
            debug!(query = %key, "ComponentDetectionQuery already completed");
            return Ok(Action::Done);
        }

        if !is_condition_true(query.conditions(), ConditionType::Processing) {
            let processing = ok_condition(ConditionType::Processing, "ComponentDetectionQuery is processing");
            update_status(store, key, |q| {
                set_condition(
                    &mut q.status.get_or_insert_with(Default::default).conditions,
                    processing.clone(),
                )
            })
            .await?;
        }

        let _permit = self
            .ctx
            .analysis_permits
            .acquire()
            .await
            .map_err(|_| has_core::Error::Cancelled)?;

        let namespace = query.namespace().unwrap_or_default();
        let token = match query.spec.secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => match self.ctx.token_from_secret(&namespace, secret).await {
                Ok(token) => Some(token),
                Err(e) => return self.fail(key, e, &[]).await,
            },
            None => None,
        };

        match self.detect(&query, token.as_deref()).await {
            Ok(detected) if detected.is_empty() => {
                let e = has_core::Error::NotFound(format!(
                    "no components detected in {}",
                    query.spec.git.url
                ));
                self.fail(key, e, &[]).await
            }
            Ok(detected) => self.complete(key, detected).await,
            Err(e) => {
                let secrets: Vec<&str> = token.as_deref().into_iter().collect();
                self.fail(key, e, &secrets).await
            }
        }
    }

    async fn detect(
        &self,
        query: &ComponentDetectionQuery,
        token: Option<&str>,
    ) -> has_core::Result<Detected> {
        let spec = &query.spec;
        let request = AnalysisRequest {
            repo_url: spec.git.url.clone(),
            revision: spec.git.revision.clone().filter(|r| !r.is_empty()),
            context: spec.git.context.clone(),
            token: token.map(str::to_string),
        };
        let result = self.analyze(&request).await?;

        let contexts: Vec<(String, DetectedContext)> = result
            .contexts
            .into_iter()
            .filter(|(_, found)| {
                !spec.recognized_content_only || found.is_recognized() || found.has_devfile()
            })
            .collect();
        let unique = spec.generate_component_name || contexts.len() > 1;

        let namespace = query.namespace().unwrap_or_default();
        let existing: HashSet<String> = self
            .ctx
            .stores
            .components
            .list(&namespace)
            .await?
            .iter()
            .map(|c| c.name_any())
            .collect();

        let mut detected = Detected::new();
        for (context, found) in contexts {
            let context = stub_context(spec.git.context.as_deref(), &context);
            let name = resolve_component_name(
                &NameRequest {
                    repo_url: &spec.git.url,
                    context: Some(&context),
                    unique,
                },
                |candidate| existing.contains(candidate) || detected.contains_key(candidate),
            )?;
            let description = self.describe(&spec.git, &context, &name, found, token).await?;
            debug!(component = %name, context = %context, devfile = description.devfile_found, "Detected component");
            detected.insert(name, description);
        }
        Ok(detected)
    }

    /// Run the analyzer, retrying retryable failures with exponential backoff.
    async fn analyze(&self, request: &AnalysisRequest) -> has_core::Result<AnalysisResult> {
        let config = &self.ctx.config;
        let attempts = config.analyzer_retry_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.ctx.analyzer.analyze(request).await {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = backoff(attempt - 1, config.analyzer_retry_backoff, MAX_ANALYZER_BACKOFF);
                    warn!(
                        analyzer = self.ctx.analyzer.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %sanitize_message(&e.to_string(), &[]),
                        "Analysis failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    async fn describe(
        &self,
        git: &GitSource,
        context: &str,
        name: &str,
        found: DetectedContext,
        token: Option<&str>,
    ) -> has_core::Result<ComponentDetectionDescription> {
        let mut stub = ComponentSpec {
            component_name: name.to_string(),
            application: PLACEHOLDER_APPLICATION.to_string(),
            source: Some(ComponentSource {
                git: Some(GitSource {
                    url: git.url.clone(),
                    revision: git.revision.clone().filter(|r| !r.is_empty()),
                    context: Some(context.to_string()),
                    devfile_url: found.devfile_url.clone(),
                    dockerfile_url: found.dockerfile_url.clone(),
                }),
            }),
            ..Default::default()
        };

        if let Some(content) = found.devfile.as_deref() {
            let mut devfile = Devfile::parse(content)?;
            if let Some(base) = found.devfile_url.as_deref() {
                absolutize_kubernetes_uri(&mut devfile, base);
            }
            self.inline_manifest(&mut devfile, token).await;
            let attributes = extract_stub(&devfile)?;
            stub.target_port = attributes
                .target_port
                .or_else(|| manifest_port(&devfile, name))
                .unwrap_or_default();
            stub.replicas = attributes.replicas;
            stub.route = attributes.route;
            stub.env = attributes.env;
            stub.resources = attributes.resources;
        }
        if stub.target_port == 0 {
            stub.target_port = found.ports.first().copied().unwrap_or_default();
        }

        Ok(ComponentDetectionDescription {
            language: found.language.clone(),
            project_type: found.project_type.clone(),
            devfile_found: found.has_devfile(),
            component_stub: stub,
        })
    }

    /// Fetch a kubernetes component manifest given by absolute URI so its
    /// container port can be read. Unreachable manifests are left alone.
    async fn inline_manifest(&self, devfile: &mut Devfile, token: Option<&str>) {
        let Some(kubernetes) = devfile
            .first_kubernetes_component_mut()
            .and_then(|c| c.kubernetes.as_mut())
        else {
            return;
        };
        if kubernetes.inlined.is_some() {
            return;
        }
        let Some(uri) = kubernetes.uri.clone() else {
            return;
        };
        match self.ctx.source.fetch(&uri, token).await {
            Ok(Some(manifest)) => kubernetes.inlined = Some(manifest),
            Ok(None) => debug!(uri = %uri, "Kubernetes manifest not found"),
            Err(e) => debug!(uri = %uri, error = %e, "Unable to fetch kubernetes manifest"),
        }
    }

    async fn complete(&self, key: &ObjectKey, detected: Detected) -> ReconcileResult<Action> {
        let store = self.ctx.stores.detections.as_ref();
        let count = detected.len();
        let completed = ok_condition(
            ConditionType::Completed,
            "ComponentDetectionQuery has successfully finished",
        );
        let written = update_status(store, key, |q| {
            let status = q.status.get_or_insert_with(ComponentDetectionQueryStatus::default);
            status.component_detected = detected.clone();
            set_condition(&mut status.conditions, completed.clone());
            true
        })
        .await;

        match written {
            Ok(_) => {
                info!(query = %key, components = count, "Component detection finished");
                self.ctx.metrics.reconcile_succeeded(ResourceKind::ComponentDetectionQuery);
                Ok(Action::Done)
            }
            Err(e) if e.is_conflict() => Err(e.into()),
            Err(e) => {
                warn!(query = %key, error = %e, "Unable to record detected components");
                let failed = error_condition(
                    ConditionType::Completed,
                    format!("unable to record detected components: {e}"),
                );
                update_status(store, key, |q| {
                    set_condition(
                        &mut q.status.get_or_insert_with(Default::default).conditions,
                        failed.clone(),
                    )
                })
                .await?;
                self.ctx.metrics.reconcile_failed(ResourceKind::ComponentDetectionQuery);
                Ok(Action::Done)
            }
        }
    }

    /// Mark the query as failed. Queries are one-shot, so system errors are
    /// recorded rather than retried; they still count as failures.
    async fn fail(&self, key: &ObjectKey, error: has_core::Error, secrets: &[&str]) -> ReconcileResult<Action> {
        let message = sanitize_message(&error.to_string(), secrets);
        warn!(query = %key, error = %message, "Component detection failed");
        let failed = error_condition(
            ConditionType::Completed,
            format!("ComponentDetectionQuery failed: {message}"),
        );
        update_status(self.ctx.stores.detections.as_ref(), key, |q| {
            set_condition(
                &mut q.status.get_or_insert_with(Default::default).conditions,
                failed.clone(),
            )
        })
        .await?;
        if !error.is_user_error() {
            self.ctx.metrics.reconcile_failed(ResourceKind::ComponentDetectionQuery);
        }
        Ok(Action::Done)
    }
}

/// Context of a detected component relative to the repository root.
fn stub_context(query_context: Option<&str>, detected: &str) -> String {
    let base = normalize_context(query_context.unwrap_or_default());
    let detected = normalize_context(detected);
    match (base.is_empty(), detected.is_empty()) {
        (true, true) => ROOT_CONTEXT.to_string(),
        (true, false) => detected.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{detected}"),
    }
}

/// Container port of the Deployment the devfile renders to.
fn manifest_port(devfile: &Devfile, name: &str) -> Option<i32> {
    let params = DeploymentParams {
        component_name: name.to_string(),
        ..Default::default()
    };
    let deployment = render_deployment(devfile, &params).ok()?;
    let pod = deployment.spec?.template.spec?;
    let port = pod.containers.first()?.ports.as_ref()?.first()?.container_port;
    Some(port)
}

#[async_trait]
impl Reconciler for DetectionReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ComponentDetectionQuery
    }

    async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<Action> {
        self.ctx.metrics.reconcile_started(ResourceKind::ComponentDetectionQuery);
        let result = self.reconcile_query(key).await;
        if let Err(e) = &result {
            if !e.is_user_error() && !e.is_conflict() {
                self.ctx.metrics.reconcile_failed(ResourceKind::ComponentDetectionQuery);
            }
        }
        result
    }
}
