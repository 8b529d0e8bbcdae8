//! Component deletion.
//!
//! The Application devfile entry goes first, then the GitOps resources.
//! GitOps cleanup is retried a bounded number of times; past that the
//! finalizer is removed anyway so deletion is never blocked for good.

use has_core::api::Component;
use has_core::gitops::GitOpsTarget;
use has_core::keys;
use has_core::sanitize::sanitize_message;
use has_core::ObjectKey;
use has_devfile::Devfile;
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::error::ReconcileResult;
use crate::metrics::ResourceKind;
use crate::reconciler::Action;
use crate::status::{counter, has_finalizer, is_deleting, remove_finalizer, set_annotation};

pub(super) async fn finalize(ctx: &Context, mut component: Component) -> ReconcileResult<Action> {
    if !has_finalizer(&component, keys::COMPONENT_FINALIZER) {
        return Ok(Action::Done);
    }
    let key = ObjectKey::of(&component);
    debug!(component = %key, "Finalizing component");

    remove_from_application(ctx, &component).await?;

    if let Err(e) = remove_gitops(ctx, &component).await {
        let attempts = counter(&component, keys::ANNOTATION_FINALIZE_COUNT).saturating_add(1);
        let message = sanitize_message(&e.to_string(), &[]);
        if attempts < ctx.config.finalize_retry_limit {
            set_annotation(&mut component, keys::ANNOTATION_FINALIZE_COUNT, attempts.to_string());
            ctx.stores.components.replace(&component).await?;
            warn!(component = %key, attempts, error = %message, "Failed to remove GitOps resources, will retry");
            return Err(e.into());
        }
        error!(component = %key, attempts, error = %message, "Giving up on GitOps resource removal");
    }

    remove_finalizer(&mut component, keys::COMPONENT_FINALIZER);
    ctx.stores.components.replace(&component).await?;
    info!(component = %key, "Component finalized");
    ctx.metrics.reconcile_succeeded(ResourceKind::Component);
    Ok(Action::Done)
}

/// Drop the component's project or image attribute from the Application
/// devfile. Skipped when the Application is gone or being deleted itself.
async fn remove_from_application(ctx: &Context, component: &Component) -> ReconcileResult<()> {
    let applications = &ctx.stores.applications;
    let app_key = ObjectKey::new(
        component.metadata.namespace.clone().unwrap_or_default(),
        &component.spec.application,
    );
    let Some(mut application) = applications.get(&app_key).await? else {
        return Ok(());
    };
    if is_deleting(&application) {
        return Ok(());
    }
    let Some(yaml) = application.devfile() else {
        return Ok(());
    };

    let mut devfile = match Devfile::parse(yaml) {
        Ok(devfile) => devfile,
        Err(e) => {
            error!(application = %app_key, error = %e, "Unable to parse application devfile, leaving it as is");
            return Ok(());
        }
    };

    let name = &component.spec.component_name;
    let removed = if component.git_source().is_some() {
        devfile.remove_project(name)
    } else {
        devfile
            .attributes_mut()
            .remove(&keys::container_image_attribute(name))
    };
    if !removed {
        debug!(application = %app_key, component = %name, "Component not present in application devfile");
        return Ok(());
    }

    let yaml = devfile.to_yaml()?;
    application.status.get_or_insert_with(Default::default).devfile = Some(yaml);
    applications.replace_status(&application).await?;
    debug!(application = %app_key, component = %name, "Removed component from application devfile");
    Ok(())
}

async fn remove_gitops(ctx: &Context, component: &Component) -> has_core::Result<()> {
    let Some(gitops) = component.status.as_ref().and_then(|s| s.gitops.as_ref()) else {
        return Ok(());
    };
    if gitops.resource_generation_skipped || gitops.commit_id.is_none() {
        return Ok(());
    }
    let Some(target) = GitOpsTarget::from_status(gitops) else {
        return Ok(());
    };

    let workdir = ctx.gitops_workdir()?;
    let commit = ctx
        .gitops
        .remove(workdir.path(), &target, &component.spec.component_name)
        .await?;
    debug!(component = %component.spec.component_name, commit = %commit, "Removed GitOps resources");
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::component::ComponentReconciler;
    use crate::reconciler::{Action, Reconciler};
    use crate::testing::{GITOPS_REPO, Harness, REPO, application, git_component, image_component, key};
    use has_core::api::{ApplicationStatus, ComponentStatus, GitOpsStatus};
    use has_core::keys;
    use has_devfile::Devfile;
    use has_store::ResourceStore;

    const APP_DEVFILE: &str = r#"schemaVersion: 2.2.0
metadata:
  name: petclinic
  attributes:
    containerImage/web: quay.io/org/web:1
projects:
  - name: backend
    git:
      remotes:
        origin: https://github.com/devfile-samples/devfile-sample-java-springboot-basic
"#;

    fn seed(h: &Harness) {
        let mut app = application("a1", None);
        app.status = Some(ApplicationStatus {
            devfile: Some(APP_DEVFILE.to_string()),
            ..Default::default()
        });
        h.applications.insert(app);

        let mut backend = git_component("backend", "a1", REPO);
        backend.metadata.finalizers = Some(vec![keys::COMPONENT_FINALIZER.to_string()]);
        backend.status = Some(ComponentStatus {
            gitops: Some(GitOpsStatus {
                repository_url: Some(GITOPS_REPO.to_string()),
                commit_id: Some("commit-0".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        h.components.insert(backend);

        let mut web = image_component("web", "a1", "quay.io/org/web:1");
        web.metadata.finalizers = Some(vec![keys::COMPONENT_FINALIZER.to_string()]);
        h.components.insert(web);
    }

    fn app_devfile(h: &Harness) -> Devfile {
        Devfile::parse(h.application("a1").unwrap().devfile().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_deleting_a_git_component() {
        let h = Harness::new();
        seed(&h);
        let reconciler = ComponentReconciler::new(h.ctx.clone());

        h.components.delete(&key("backend")).await.unwrap();
        assert_eq!(reconciler.reconcile(&key("backend")).await.unwrap(), Action::Done);

        assert!(h.component("backend").is_none());
        assert!(app_devfile(&h).project("backend").is_none());
        assert_eq!(h.gitops.calls(), vec!["remove:backend"]);
        assert_eq!(h.gitops.targets.lock().unwrap()[0].url, GITOPS_REPO);
    }

    #[tokio::test]
    async fn test_deleting_an_image_component() {
        let h = Harness::new();
        seed(&h);
        let reconciler = ComponentReconciler::new(h.ctx.clone());

        h.components.delete(&key("web")).await.unwrap();
        reconciler.reconcile(&key("web")).await.unwrap();

        assert!(h.component("web").is_none());
        let devfile = app_devfile(&h);
        assert!(!devfile.attributes().contains("containerImage/web"));
        assert!(devfile.project("backend").is_some());
        assert!(h.gitops.calls().is_empty());
    }

    #[tokio::test]
    async fn test_gitops_failures_do_not_block_deletion() {
        let h = Harness::new();
        seed(&h);
        h.gitops.fail_next(usize::MAX);
        let reconciler = ComponentReconciler::new(h.ctx.clone());
        h.components.delete(&key("backend")).await.unwrap();

        let limit = h.ctx.config.finalize_retry_limit as usize;
        for attempt in 1..limit {
            assert!(reconciler.reconcile(&key("backend")).await.is_err(), "attempt {attempt}");
            let component = h.component("backend").unwrap();
            assert_eq!(
                crate::status::counter(&component, keys::ANNOTATION_FINALIZE_COUNT) as usize,
                attempt
            );
        }
        assert_eq!(reconciler.reconcile(&key("backend")).await.unwrap(), Action::Done);
        assert!(h.component("backend").is_none());
        assert_eq!(h.gitops.calls().len(), limit);
        assert!(app_devfile(&h).project("backend").is_none());
    }

    #[tokio::test]
    async fn test_deleted_application_is_left_alone() {
        let h = Harness::new();
        seed(&h);
        let reconciler = ComponentReconciler::new(h.ctx.clone());
        h.applications.delete(&key("a1")).await.unwrap();

        h.components.delete(&key("backend")).await.unwrap();
        reconciler.reconcile(&key("backend")).await.unwrap();
        assert!(h.component("backend").is_none());
        assert_eq!(h.gitops.calls(), vec!["remove:backend"]);
    }

    #[tokio::test]
    async fn test_application_conflict_is_retried() {
        let h = Harness::new();
        seed(&h);
        let reconciler = ComponentReconciler::new(h.ctx.clone());
        h.components.delete(&key("backend")).await.unwrap();

        h.applications.inject_status_conflicts(1);
        let err = reconciler.reconcile(&key("backend")).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(h.component("backend").is_some());

        reconciler.reconcile(&key("backend")).await.unwrap();
        assert!(h.component("backend").is_none());
    }
}
