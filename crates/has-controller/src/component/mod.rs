//! Component reconciler.
//!
//! Resolves the component devfile, merges the Spec into it, records it in
//! the status and keeps the GitOps repository in step with it.

mod finalizer;
mod gitops;
mod source;

use async_trait::async_trait;
use has_core::api::{Component, ComponentStatus};
use has_core::condition::{
    ConditionType, error_condition, find_condition, is_condition_true, ok_condition, set_condition,
};
use has_core::keys;
use has_core::sanitize::sanitize_message;
use has_core::ObjectKey;
use has_devfile::deployment::{DeploymentParams, default_image};
use has_devfile::merge::apply_component_spec;
use has_devfile::Devfile;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::ReconcileResult;
use crate::metrics::ResourceKind;
use crate::reconciler::{Action, Reconciler};
use crate::status::{
    add_finalizer, annotation, counter, is_deleting, remove_annotation, set_annotation,
    update_status,
};

use self::gitops::GitOpsOutcome;
use self::source::Acquired;

pub struct ComponentReconciler {
    ctx: Arc<Context>,
}

impl ComponentReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    fn deployment_params(&self, component: &Component) -> DeploymentParams {
        let namespace = component.namespace().unwrap_or_default();
        let spec = &component.spec;
        let image = spec
            .container_image
            .clone()
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| {
                default_image(&self.ctx.config.image_registry, &namespace, &spec.component_name)
            });
        DeploymentParams {
            component_name: spec.component_name.clone(),
            application: spec.application.clone(),
            namespace,
            image,
            port: (spec.target_port != 0).then_some(spec.target_port),
            replicas: spec.replicas,
            env: spec.env.clone(),
            resources: spec.resources.clone(),
        }
    }

    async fn reconcile_component(&self, key: &ObjectKey) -> ReconcileResult<Action> {
        let components = &self.ctx.stores.components;
        let Some(mut component) = components.get(key).await? else {
            debug!(component = %key, "Component no longer exists");
            return Ok(Action::Done);
        };

        if is_deleting(&component) {
            return finalizer::finalize(&self.ctx, component).await;
        }

        if add_finalizer(&mut component, keys::COMPONENT_FINALIZER) {
            components.replace(&component).await?;
            debug!(component = %key, "Added finalizer");
            return Ok(Action::Done);
        }

        let app_key = ObjectKey::new(&key.namespace, &component.spec.application);
        let Some(application) = self.ctx.stores.applications.get(&app_key).await? else {
            return self.application_missing(key, component).await;
        };
        if remove_annotation(&mut component, keys::ANNOTATION_APPLICATION_MISSING_COUNT) {
            component = components.replace(&component).await?;
        }

        let created = is_condition_true(component.conditions(), ConditionType::Created);
        let condition_type = if created {
            ConditionType::Updated
        } else {
            ConditionType::Created
        };
        let params = self.deployment_params(&component);
        let previous_yaml = component.devfile().map(str::to_string);

        let previous = match previous_yaml.as_deref().map(Devfile::parse).transpose() {
            Ok(previous) => previous,
            Err(e) => {
                let message = format!("unable to parse the component devfile: {e}");
                return self.fail(key, condition_type, message, e.into()).await;
            }
        };

        let mut devfile = match &previous {
            Some(devfile) => devfile.clone(),
            None => match source::acquire(&self.ctx, &component, &params).await {
                Ok(Acquired::Ready(devfile)) => devfile,
                Ok(Acquired::Pending(delay)) => {
                    debug!(component = %key, "Waiting for devfile content");
                    return Ok(Action::RequeueAfter(delay));
                }
                Err(e) => {
                    let message = format!("error getting devfile: {e}");
                    return self.fail(key, condition_type, message, e).await;
                }
            },
        };

        if let Err(e) = apply_component_spec(&mut devfile, &component.spec) {
            let message = format!("unable to apply the component spec: {e}");
            return self.fail(key, condition_type, message, e.into()).await;
        }
        let yaml = devfile.to_yaml()?;
        let changed = previous_yaml.as_deref() != Some(yaml.as_str());

        let original = component.status.clone().unwrap_or_default();
        let mut status = original.clone();
        status.devfile = Some(yaml);
        if let Some(image) = component.spec.container_image.as_deref().filter(|i| !i.is_empty()) {
            status.container_image = Some(image.to_string());
        }

        let force = annotation(&component, keys::ANNOTATION_FORCE_GENERATE_GITOPS) == Some("true");
        let request = gitops::SyncRequest {
            component: &component,
            application: &application,
            devfile: &devfile,
            previous: previous.as_ref(),
            params: &params,
            changed,
            force,
        };
        let outcome = gitops::sync(&self.ctx, &request, &mut status).await;

        if let GitOpsOutcome::Failed(e) = outcome {
            let message = sanitize_message(&format!("failed to generate GitOps resources: {e}"), &[]);
            set_condition(&mut status.conditions, error_condition(condition_type, message));
            self.write_status(key, &status).await?;
            if e.is_user_error() {
                warn!(component = %key, error = %e, "GitOps generation rejected");
                return Ok(Action::Done);
            }
            return Err(e.into());
        }

        let generated = matches!(outcome, GitOpsOutcome::Generated);
        let stale_failure = find_condition(&status.conditions, condition_type)
            .is_some_and(|c| c.status != "True");
        if !created || changed || generated || stale_failure {
            let message = if created {
                "Component has been successfully updated"
            } else {
                "Component has been successfully created"
            };
            set_condition(&mut status.conditions, ok_condition(condition_type, message));
        }

        if status != original {
            self.write_status(key, &status).await?;
            info!(component = %key, condition = %condition_type.as_str(), changed, "Reconciled component");
        }

        if force && generated {
            self.clear_force_annotation(key).await?;
        }

        self.ctx.metrics.reconcile_succeeded(ResourceKind::Component);
        Ok(Action::Done)
    }

    /// Count a reconcile that found no Application and fail once the count
    /// reaches the configured threshold.
    async fn application_missing(
        &self,
        key: &ObjectKey,
        mut component: Component,
    ) -> ReconcileResult<Action> {
        let config = &self.ctx.config;
        let count = counter(&component, keys::ANNOTATION_APPLICATION_MISSING_COUNT).saturating_add(1);
        if count < config.application_missing_threshold {
            set_annotation(&mut component, keys::ANNOTATION_APPLICATION_MISSING_COUNT, count.to_string());
            self.ctx.stores.components.replace(&component).await?;
            debug!(component = %key, application = %component.spec.application, count, "Application not found, requeueing");
            return Ok(Action::RequeueAfter(config.application_missing_requeue));
        }

        let condition_type = if is_condition_true(component.conditions(), ConditionType::Created) {
            ConditionType::Updated
        } else {
            ConditionType::Created
        };
        let message = format!("unable to get the Application {}", component.spec.application);
        warn!(component = %key, application = %component.spec.application, "Application not found");
        let condition = error_condition(condition_type, message);
        update_status(self.ctx.stores.components.as_ref(), key, |c| {
            set_condition(
                &mut c.status.get_or_insert_with(ComponentStatus::default).conditions,
                condition.clone(),
            )
        })
        .await?;
        Ok(Action::Done)
    }

    /// Record a failed condition. User errors end the reconcile; anything else
    /// is returned for a retry.
    async fn fail(
        &self,
        key: &ObjectKey,
        condition_type: ConditionType,
        message: String,
        error: has_core::Error,
    ) -> ReconcileResult<Action> {
        let condition = error_condition(condition_type, sanitize_message(&message, &[]));
        update_status(self.ctx.stores.components.as_ref(), key, |c| {
            set_condition(
                &mut c.status.get_or_insert_with(ComponentStatus::default).conditions,
                condition.clone(),
            )
        })
        .await?;

        if error.is_user_error() {
            warn!(component = %key, error = %sanitize_message(&error.to_string(), &[]), "Component cannot be reconciled");
            return Ok(Action::Done);
        }
        Err(error.into())
    }

    async fn write_status(&self, key: &ObjectKey, status: &ComponentStatus) -> ReconcileResult<()> {
        update_status(self.ctx.stores.components.as_ref(), key, |c| {
            if c.status.as_ref() == Some(status) {
                return false;
            }
            c.status = Some(status.clone());
            true
        })
        .await?;
        Ok(())
    }

    async fn clear_force_annotation(&self, key: &ObjectKey) -> ReconcileResult<()> {
        let components = &self.ctx.stores.components;
        if let Some(mut component) = components.get(key).await? {
            if remove_annotation(&mut component, keys::ANNOTATION_FORCE_GENERATE_GITOPS) {
                components.replace(&component).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Reconciler for ComponentReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Component
    }

    async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<Action> {
        self.ctx.metrics.reconcile_started(ResourceKind::Component);
        let result = self.reconcile_component(key).await;
        if let Err(e) = &result {
            if !e.is_user_error() && !e.is_conflict() {
                self.ctx.metrics.reconcile_failed(ResourceKind::Component);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{GITOPS_REPO, Harness, REPO, application, git_component, image_component, key};
    use has_core::api::{Application, ApplicationStatus};
    use has_store::ResourceStore;

    async fn run(reconciler: &ComponentReconciler, name: &str) -> Action {
        reconciler.reconcile(&key(name)).await.unwrap()
    }

    /// Application whose devfile points at a GitOps repository.
    fn gitops_application(extra_attributes: &str) -> Application {
        let mut app = application("a1", Some(GITOPS_REPO));
        app.status = Some(ApplicationStatus {
            devfile: Some(format!(
                "schemaVersion: 2.2.0\nmetadata:\n  name: petclinic\n  attributes:\n    gitOpsRepository.url: {GITOPS_REPO}\n{extra_attributes}"
            )),
            ..Default::default()
        });
        app
    }

    /// Reconcile until nothing is written; returns the number of passes.
    async fn settle(h: &Harness, reconciler: &ComponentReconciler, name: &str) -> usize {
        for pass in 1..=10 {
            let before = h.component(name).and_then(|c| c.metadata.resource_version);
            run(reconciler, name).await;
            let after = h.component(name).and_then(|c| c.metadata.resource_version);
            if before == after {
                return pass;
            }
        }
        panic!("component {name} did not settle");
    }

    fn condition_message(component: &Component, type_: ConditionType) -> Option<(String, String)> {
        find_condition(component.conditions(), type_).map(|c| (c.status.clone(), c.message.clone()))
    }

    #[tokio::test]
    async fn test_git_component_is_created() {
        let h = Harness::new();
        h.applications.insert(gitops_application(""));
        h.components.create(&git_component("backend", "a1", REPO)).await.unwrap();

        let reconciler = ComponentReconciler::new(h.ctx.clone());
        settle(&h, &reconciler, "backend").await;

        let component = h.component("backend").unwrap();
        assert!(component.finalizers().iter().any(|f| f == keys::COMPONENT_FINALIZER));
        let (status, _) = condition_message(&component, ConditionType::Created).unwrap();
        assert_eq!(status, "True");
        assert!(is_condition_true(component.conditions(), ConditionType::GitOpsResourcesGenerated));

        let devfile = Devfile::parse(component.devfile().unwrap()).unwrap();
        assert_eq!(devfile.metadata.name.as_deref(), Some("java-springboot"));
        let gitops = component.status.as_ref().unwrap().gitops.as_ref().unwrap();
        assert_eq!(gitops.repository_url.as_deref(), Some(GITOPS_REPO));
        assert_eq!(gitops.commit_id.as_deref(), Some("commit-1"));
        assert_eq!(h.gitops.calls(), vec!["generate:backend"]);

        let rendered = h.gitops.rendered.lock().unwrap()[0].clone();
        let container = &rendered.deployment.spec.unwrap().template.spec.unwrap().containers[0];
        assert_eq!(container.ports.as_ref().unwrap()[0].container_port, 8081);

        let (total, succeeded, failed) = h.ctx.metrics.git_imports();
        assert_eq!((total, succeeded, failed), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let h = Harness::new();
        h.applications.create(&application("a1", None)).await.unwrap();
        h.components.create(&image_component("web", "a1", "quay.io/org/web:1")).await.unwrap();

        let reconciler = ComponentReconciler::new(h.ctx.clone());
        settle(&h, &reconciler, "web").await;
        let settled = h.component("web").unwrap();

        run(&reconciler, "web").await;
        let again = h.component("web").unwrap();
        assert_eq!(settled.metadata.resource_version, again.metadata.resource_version);
        assert_eq!(settled.status, again.status);

        let status = again.status.unwrap();
        assert_eq!(status.container_image.as_deref(), Some("quay.io/org/web:1"));
        assert!(status.gitops.unwrap().resource_generation_skipped);
        assert!(h.gitops.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_application_threshold() {
        let h = Harness::new();
        h.components.create(&git_component("backend", "a1", REPO)).await.unwrap();
        let reconciler = ComponentReconciler::new(h.ctx.clone());

        assert_eq!(run(&reconciler, "backend").await, Action::Done);
        for _ in 0..2 {
            assert!(matches!(run(&reconciler, "backend").await, Action::RequeueAfter(_)));
        }
        assert_eq!(run(&reconciler, "backend").await, Action::Done);

        let component = h.component("backend").unwrap();
        let (status, message) = condition_message(&component, ConditionType::Created).unwrap();
        assert_eq!(status, "False");
        assert_eq!(message, "unable to get the Application a1");
        assert_eq!(h.ctx.metrics.failures(ResourceKind::Component), 0);

        h.applications.create(&application("a1", None)).await.unwrap();
        settle(&h, &reconciler, "backend").await;
        let component = h.component("backend").unwrap();
        assert!(is_condition_true(component.conditions(), ConditionType::Created));
        assert!(annotation(&component, keys::ANNOTATION_APPLICATION_MISSING_COUNT).is_none());
    }

    #[tokio::test]
    async fn test_missing_devfile_is_a_user_error() {
        let h = Harness::new();
        h.applications.create(&application("a1", None)).await.unwrap();
        h.components
            .create(&git_component("empty", "a1", "https://github.com/org/empty-repo"))
            .await
            .unwrap();

        let reconciler = ComponentReconciler::new(h.ctx.clone());
        settle(&h, &reconciler, "empty").await;

        let component = h.component("empty").unwrap();
        let (status, message) = condition_message(&component, ConditionType::Created).unwrap();
        assert_eq!(status, "False");
        assert!(message.starts_with("error getting devfile: "), "{message}");
        assert!(component.devfile().is_none());
        assert_eq!(h.ctx.metrics.failures(ResourceKind::Component), 0);
        let (_, succeeded, failed) = h.ctx.metrics.git_imports();
        assert_eq!((succeeded, failed), (0, 0));
    }

    #[tokio::test]
    async fn test_unreachable_devfile_url() {
        let h = Harness::new();
        h.applications.create(&application("a1", None)).await.unwrap();
        let mut component = git_component("backend", "a1", REPO);
        if let Some(git) = component.spec.source.as_mut().and_then(|s| s.git.as_mut()) {
            git.devfile_url = Some("https://bad/devfile.yaml".into());
        }
        h.components.create(&component).await.unwrap();

        let reconciler = ComponentReconciler::new(h.ctx.clone());
        settle(&h, &reconciler, "backend").await;

        let component = h.component("backend").unwrap();
        let condition = find_condition(component.conditions(), ConditionType::Created).unwrap();
        assert_eq!(condition.status, "False");
        assert_eq!(condition.reason, "Error");
        assert!(condition.message.contains("error getting devfile"), "{}", condition.message);
        assert_eq!(h.ctx.metrics.successes(ResourceKind::Component), 0);
    }

    #[tokio::test]
    async fn test_spec_change_updates_gitops() {
        let h = Harness::new();
        h.applications.insert(gitops_application("    gitOpsRepository.branch: live\n"));
        h.components.create(&git_component("backend", "a1", REPO)).await.unwrap();
        let reconciler = ComponentReconciler::new(h.ctx.clone());
        settle(&h, &reconciler, "backend").await;

        let mut component = h.component("backend").unwrap();
        component.spec.replicas = Some(2);
        component.spec.route = Some("backend.example.com".into());
        h.components.replace(&component).await.unwrap();
        settle(&h, &reconciler, "backend").await;

        let component = h.component("backend").unwrap();
        let (status, message) = condition_message(&component, ConditionType::Updated).unwrap();
        assert_eq!(status, "True");
        assert_eq!(message, "Component has been successfully updated");
        assert_eq!(h.gitops.calls(), vec!["generate:backend", "update:backend"]);
        assert_eq!(h.gitops.targets.lock().unwrap()[1].branch, "live");

        let devfile = Devfile::parse(component.devfile().unwrap()).unwrap();
        let attributes = &devfile.first_kubernetes_component().unwrap().attributes;
        assert_eq!(attributes.get_number(keys::ATTR_REPLICAS).unwrap(), Some(2));
        let rendered = h.gitops.rendered.lock().unwrap()[1].clone();
        assert_eq!(rendered.route.as_deref(), Some("backend.example.com"));
    }

    #[tokio::test]
    async fn test_force_generate_annotation_is_one_shot() {
        let h = Harness::new();
        h.applications.insert(gitops_application(""));
        h.components.create(&git_component("backend", "a1", REPO)).await.unwrap();
        let reconciler = ComponentReconciler::new(h.ctx.clone());
        settle(&h, &reconciler, "backend").await;

        let mut component = h.component("backend").unwrap();
        set_annotation(&mut component, keys::ANNOTATION_FORCE_GENERATE_GITOPS, "true");
        h.components.replace(&component).await.unwrap();
        settle(&h, &reconciler, "backend").await;

        let component = h.component("backend").unwrap();
        assert!(annotation(&component, keys::ANNOTATION_FORCE_GENERATE_GITOPS).is_none());
        assert!(is_condition_true(component.conditions(), ConditionType::GitOpsResourcesForceGenerated));
        assert_eq!(h.gitops.calls(), vec!["generate:backend", "regenerate:backend"]);
    }

    #[tokio::test]
    async fn test_force_generate_annotation_waits_for_generation() {
        let h = Harness::new();
        h.applications.insert(gitops_application(""));
        let mut component = git_component("backend", "a1", REPO);
        component.spec.skip_gitops_resource_generation = true;
        set_annotation(&mut component, keys::ANNOTATION_FORCE_GENERATE_GITOPS, "true");
        h.components.create(&component).await.unwrap();
        let reconciler = ComponentReconciler::new(h.ctx.clone());
        settle(&h, &reconciler, "backend").await;

        let component = h.component("backend").unwrap();
        assert_eq!(annotation(&component, keys::ANNOTATION_FORCE_GENERATE_GITOPS), Some("true"));
        assert!(component.status.unwrap().gitops.unwrap().resource_generation_skipped);
        assert!(h.gitops.calls().is_empty());
    }

    #[tokio::test]
    async fn test_gitops_failure_is_retried_and_sanitized() {
        let h = Harness::new();
        h.applications.insert(gitops_application(""));
        h.components.create(&git_component("backend", "a1", REPO)).await.unwrap();
        h.gitops.fail_next(1);

        let reconciler = ComponentReconciler::new(h.ctx.clone());
        run(&reconciler, "backend").await;
        assert!(reconciler.reconcile(&key("backend")).await.is_err());

        let component = h.component("backend").unwrap();
        let (status, message) =
            condition_message(&component, ConditionType::GitOpsResourcesGenerated).unwrap();
        assert_eq!(status, "False");
        assert!(!message.contains("x-access-token"), "{message}");
        assert_eq!(h.ctx.metrics.failures(ResourceKind::Component), 1);

        settle(&h, &reconciler, "backend").await;
        let component = h.component("backend").unwrap();
        assert!(is_condition_true(component.conditions(), ConditionType::Created));
        assert!(is_condition_true(component.conditions(), ConditionType::GitOpsResourcesGenerated));
    }
}
