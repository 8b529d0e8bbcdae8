//! Application reconciler.
//!
//! Maintains the aggregated application devfile: one git project per
//! git-sourced Component, one `containerImage/<name>` attribute per
//! image-sourced Component, plus the GitOps and app model repositories.

use async_trait::async_trait;
use has_core::api::{Application, ApplicationStatus, Component};
use has_core::condition::{
    ConditionType, error_condition, find_condition, ok_condition, set_condition,
};
use has_core::gitops::DEFAULT_GITOPS_BRANCH;
use has_core::keys;
use has_core::naming::random_suffix;
use has_core::sanitize::sanitize_message;
use has_core::ObjectKey;
use has_devfile::Devfile;
use has_source::RepoUrl;
use kube::ResourceExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::error::ReconcileResult;
use crate::metrics::ResourceKind;
use crate::reconciler::{Action, Reconciler};
use crate::status::{
    add_finalizer, annotation, counter, has_finalizer, is_deleting, remove_finalizer,
    set_annotation, update_status,
};

pub struct ApplicationReconciler {
    ctx: Arc<Context>,
}

/// Outcome of folding the Components into the devfile.
#[derive(Debug, Default)]
struct Membership {
    projects: BTreeSet<String>,
    images: BTreeSet<String>,
    duplicates: Vec<String>,
}

impl ApplicationReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    async fn reconcile_application(&self, key: &ObjectKey) -> ReconcileResult<Action> {
        let applications = &self.ctx.stores.applications;
        let Some(mut application) = applications.get(key).await? else {
            debug!(application = %key, "Application no longer exists");
            return Ok(Action::Done);
        };

        if is_deleting(&application) {
            return self.finalize(key, application).await;
        }

        if add_finalizer(&mut application, keys::APPLICATION_FINALIZER) {
            applications.replace(&application).await?;
            debug!(application = %key, "Added finalizer");
            return Ok(Action::Done);
        }

        let components = self.components_of(key).await?;
        let original = application.status.clone().unwrap_or_default();
        let mut status = original.clone();

        let existing = application.devfile().map(str::to_string);
        let (mut devfile, initialized) = match existing.as_deref() {
            Some(yaml) => match Devfile::parse(yaml) {
                Ok(devfile) => (devfile, false),
                Err(e) => {
                    let message = format!("unable to parse the application devfile: {e}");
                    set_condition(&mut status.conditions, error_condition(ConditionType::Updated, message));
                    self.write_status(key, &status).await?;
                    return Ok(Action::Done);
                }
            },
            None => match self.initial_devfile(&mut application).await {
                Ok(devfile) => (devfile, true),
                Err(e) => {
                    let message = sanitize_message(&format!("unable to create the application devfile: {e}"), &[]);
                    set_condition(&mut status.conditions, error_condition(ConditionType::Created, message));
                    self.write_status(key, &status).await?;
                    if e.is_user_error() {
                        return Ok(Action::Done);
                    }
                    return Err(e.into());
                }
            },
        };

        devfile.metadata.name = Some(application.spec.display_name.clone());
        devfile.metadata.description =
            Some(application.spec.description.clone()).filter(|d| !d.is_empty());
        let membership = merge_components(&mut devfile, &components);
        prune_components(&mut devfile, &membership);

        let yaml = devfile.to_yaml()?;
        let changed = original.devfile.as_deref() != Some(yaml.as_str());
        status.devfile = Some(yaml);

        if initialized {
            set_condition(
                &mut status.conditions,
                ok_condition(ConditionType::Created, "Application has been successfully created"),
            );
        }
        if !membership.duplicates.is_empty() {
            let message = format!(
                "duplicate component name(s) in application: {}",
                membership.duplicates.join(", ")
            );
            warn!(application = %key, duplicates = ?membership.duplicates, "Skipping components with duplicate names");
            set_condition(&mut status.conditions, error_condition(ConditionType::Updated, message));
        } else if (changed && !initialized)
            || find_condition(&status.conditions, ConditionType::Updated)
                .is_some_and(|c| c.status != "True")
        {
            set_condition(
                &mut status.conditions,
                ok_condition(ConditionType::Updated, "Application has been successfully updated"),
            );
        }

        if status != original {
            self.write_status(key, &status).await?;
            info!(
                application = %key,
                projects = membership.projects.len(),
                images = membership.images.len(),
                "Reconciled application"
            );
        }

        self.ctx.metrics.reconcile_succeeded(ResourceKind::Application);
        Ok(Action::Done)
    }

    /// Live Components referencing the Application, oldest first.
    async fn components_of(&self, key: &ObjectKey) -> ReconcileResult<Vec<Component>> {
        let mut components: Vec<Component> = self
            .ctx
            .stores
            .components
            .list(&key.namespace)
            .await?
            .into_iter()
            .filter(|c| c.spec.application == key.name && !is_deleting(c))
            .collect();
        components.sort_by(|a, b| {
            let created = |c: &Component| c.metadata.creation_timestamp.as_ref().map(|t| t.0);
            created(a)
                .cmp(&created(b))
                .then_with(|| a.name_any().cmp(&b.name_any()))
        });
        Ok(components)
    }

    /// Fresh devfile for a new Application. Generates a GitOps repository when
    /// none is given and the operator is configured to create them.
    async fn initial_devfile(&self, application: &mut Application) -> has_core::Result<Devfile> {
        let mut devfile = Devfile::new(&application.spec.display_name);
        let gitops_repository = application.spec.git_ops_repository.clone();
        let mut app_model_url = application.spec.app_model_repository.as_ref().map(|r| r.url.clone());

        match gitops_repository {
            Some(repo) => {
                let attributes = devfile.attributes_mut();
                attributes.set_string(keys::ATTR_GITOPS_URL, &repo.url);
                if let Some(branch) = repo.branch.as_deref().filter(|b| !b.is_empty()) {
                    attributes.set_string(keys::ATTR_GITOPS_BRANCH, branch);
                }
                if let Some(context) = repo.context.as_deref().filter(|c| !c.is_empty()) {
                    attributes.set_string(keys::ATTR_GITOPS_CONTEXT, context);
                }
            }
            None => {
                if let Some(url) = self.generate_repository(application).await? {
                    let attributes = devfile.attributes_mut();
                    attributes.set_string(keys::ATTR_GITOPS_URL, &url);
                    attributes.set_string(keys::ATTR_GITOPS_BRANCH, DEFAULT_GITOPS_BRANCH);
                    app_model_url.get_or_insert(url);
                }
            }
        }

        if let Some(url) = app_model_url {
            devfile.attributes_mut().set_string(keys::ATTR_APP_MODEL_URL, &url);
        }
        Ok(devfile)
    }

    /// Create `<app>-<namespace>-<suffix>` in the configured organization.
    /// The name is saved on the Application before the repository exists, so
    /// a retry after a failed write creates nothing new.
    async fn generate_repository(&self, application: &mut Application) -> has_core::Result<Option<String>> {
        let (Some(repositories), Some(org)) = (
            self.ctx.repositories.as_ref(),
            self.ctx.config.gitops_org.as_deref(),
        ) else {
            return Ok(None);
        };
        if !self.ctx.config.generates_gitops_repositories() {
            return Ok(None);
        }

        let name = match annotation(application, keys::ANNOTATION_GITOPS_REPO_NAME) {
            Some(name) => name.to_string(),
            None => {
                let name = format!(
                    "{}-{}-{}",
                    application.name_any(),
                    application.namespace().unwrap_or_default(),
                    random_suffix()
                );
                set_annotation(application, keys::ANNOTATION_GITOPS_REPO_NAME, name.as_str());
                set_annotation(application, keys::ANNOTATION_GITOPS_REPO_GENERATED, "true");
                *application = self.ctx.stores.applications.replace(application).await?;
                name
            }
        };
        let url = repositories.create_repository(org, &name).await?;
        info!(application = %application.name_any(), repository = %url, "GitOps repository ready");
        Ok(Some(url))
    }

    async fn finalize(&self, key: &ObjectKey, mut application: Application) -> ReconcileResult<Action> {
        if !has_finalizer(&application, keys::APPLICATION_FINALIZER) {
            return Ok(Action::Done);
        }

        if let Err(e) = self.delete_generated_repository(&application).await {
            let attempts = counter(&application, keys::ANNOTATION_FINALIZE_COUNT).saturating_add(1);
            let message = sanitize_message(&e.to_string(), &[]);
            if attempts < self.ctx.config.finalize_retry_limit {
                set_annotation(&mut application, keys::ANNOTATION_FINALIZE_COUNT, attempts.to_string());
                self.ctx.stores.applications.replace(&application).await?;
                warn!(application = %key, attempts, error = %message, "Failed to delete GitOps repository, will retry");
                return Err(e.into());
            }
            error!(application = %key, attempts, error = %message, "Giving up on GitOps repository deletion");
        }

        remove_finalizer(&mut application, keys::APPLICATION_FINALIZER);
        self.ctx.stores.applications.replace(&application).await?;
        info!(application = %key, "Application finalized");
        self.ctx.metrics.reconcile_succeeded(ResourceKind::Application);
        Ok(Action::Done)
    }

    async fn delete_generated_repository(&self, application: &Application) -> has_core::Result<()> {
        if annotation(application, keys::ANNOTATION_GITOPS_REPO_GENERATED) != Some("true") {
            return Ok(());
        }
        let Some(repositories) = self.ctx.repositories.as_ref() else {
            return Ok(());
        };
        let Some(url) = application
            .devfile()
            .and_then(|yaml| Devfile::parse(yaml).ok())
            .and_then(|d| d.attributes().get_string(keys::ATTR_GITOPS_URL).ok().flatten())
        else {
            return Ok(());
        };

        let repo = RepoUrl::parse(&url)?;
        repositories.delete_repository(&repo.owner, &repo.name).await?;
        info!(application = %application.name_any(), repository = %url, "Deleted GitOps repository");
        Ok(())
    }

    async fn write_status(&self, key: &ObjectKey, status: &ApplicationStatus) -> ReconcileResult<()> {
        update_status(self.ctx.stores.applications.as_ref(), key, |app| {
            if app.status.as_ref() == Some(status) {
                return false;
            }
            app.status = Some(status.clone());
            true
        })
        .await?;
        Ok(())
    }
}

/// Upsert a project or image attribute for each Component. The first
/// Component claiming a name wins; later ones are reported as duplicates.
fn merge_components(devfile: &mut Devfile, components: &[Component]) -> Membership {
    let mut membership = Membership::default();
    for component in components {
        let name = &component.spec.component_name;
        let claimed = membership.projects.contains(name) || membership.images.contains(name);
        if let Some(git) = component.git_source() {
            if claimed {
                membership.duplicates.push(name.clone());
                continue;
            }
            devfile.upsert_project(name, &git.url);
            membership.projects.insert(name.clone());
        } else if let Some(image) = component.spec.container_image.as_deref().filter(|i| !i.is_empty()) {
            if claimed {
                membership.duplicates.push(name.clone());
                continue;
            }
            devfile
                .attributes_mut()
                .set_string(&keys::container_image_attribute(name), image);
            membership.images.insert(name.clone());
        }
    }
    membership
}

/// Remove projects and image attributes no live Component accounts for.
fn prune_components(devfile: &mut Devfile, membership: &Membership) {
    let stale_projects: Vec<String> = devfile
        .projects
        .iter()
        .map(|p| p.name.clone())
        .filter(|name| !membership.projects.contains(name))
        .collect();
    for name in stale_projects {
        devfile.remove_project(&name);
    }

    let stale_images: Vec<String> = devfile
        .attributes()
        .keys()
        .filter(|key| {
            key.strip_prefix(keys::ATTR_CONTAINER_IMAGE_PREFIX)
                .is_some_and(|name| !membership.images.contains(name))
        })
        .map(str::to_string)
        .collect();
    for key in stale_images {
        devfile.attributes_mut().remove(&key);
    }
}

#[async_trait]
impl Reconciler for ApplicationReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Application
    }

    async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<Action> {
        self.ctx.metrics.reconcile_started(ResourceKind::Application);
        let result = self.reconcile_application(key).await;
        if let Err(e) = &result {
            if !e.is_user_error() && !e.is_conflict() {
                self.ctx.metrics.reconcile_failed(ResourceKind::Application);
            }
        }
        result
    }
}
