//! Keeping a Component's GitOps resources in step with its devfile.

use has_core::api::{Application, Component, ComponentStatus, GitOpsStatus};
use has_core::condition::{ConditionType, error_condition, is_condition_true, ok_condition, set_condition};
use has_core::gitops::{GitOpsComponent, GitOpsTarget};
use has_core::keys;
use has_core::sanitize::sanitize_message;
use has_devfile::deployment::{DeploymentParams, render_deployment};
use has_devfile::Devfile;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::context::Context;

pub(super) enum GitOpsOutcome {
    /// Generation is turned off or the Application has no repository.
    Skipped,
    UpToDate,
    Generated,
    Failed(has_core::Error),
}

pub(super) struct SyncRequest<'a> {
    pub component: &'a Component,
    pub application: &'a Application,
    pub devfile: &'a Devfile,
    /// Devfile recorded before this reconcile, if any.
    pub previous: Option<&'a Devfile>,
    pub params: &'a DeploymentParams,
    pub changed: bool,
    pub force: bool,
}

/// GitOps repository named in the Application devfile.
pub(super) fn application_target(application: &Application) -> Option<GitOpsTarget> {
    let devfile = match application.devfile().map(Devfile::parse)? {
        Ok(devfile) => devfile,
        Err(e) => {
            warn!(application = %application.name_any(), error = %e, "Unable to parse application devfile");
            return None;
        }
    };
    let attributes = devfile.attributes();
    let url = attributes
        .get_string(keys::ATTR_GITOPS_URL)
        .ok()
        .flatten()
        .filter(|u| !u.is_empty())?;
    let branch = attributes.get_string(keys::ATTR_GITOPS_BRANCH).ok().flatten();
    let context = attributes.get_string(keys::ATTR_GITOPS_CONTEXT).ok().flatten();
    Some(GitOpsTarget::new(url, branch.as_deref(), context.as_deref()))
}

fn gitops_component(
    request: &SyncRequest<'_>,
    devfile: &Devfile,
) -> has_core::Result<GitOpsComponent> {
    let component = request.component;
    let route = component
        .spec
        .route
        .clone()
        .filter(|r| !r.is_empty())
        .or_else(|| {
            devfile
                .first_kubernetes_component()
                .and_then(|c| c.attributes.get_string(keys::ATTR_ROUTE).ok().flatten())
        });
    let mut annotations = BTreeMap::new();
    if let Some(source) = component.git_source() {
        annotations.insert("app.openshift.io/vcs-uri".to_string(), source.url.clone());
    }
    Ok(GitOpsComponent {
        name: component.spec.component_name.clone(),
        application: component.spec.application.clone(),
        namespace: component.namespace().unwrap_or_default(),
        deployment: render_deployment(devfile, request.params)?,
        route,
        annotations,
    })
}

/// Generate, update or regenerate the GitOps resources when anything is
/// pending, recording the result in `status`.
pub(super) async fn sync(
    ctx: &Context,
    request: &SyncRequest<'_>,
    status: &mut ComponentStatus,
) -> GitOpsOutcome {
    let component = request.component;
    let target = match application_target(request.application) {
        Some(target) if !component.spec.skip_gitops_resource_generation => target,
        _ => {
            let gitops = status.gitops.get_or_insert_with(GitOpsStatus::default);
            gitops.resource_generation_skipped = true;
            return GitOpsOutcome::Skipped;
        }
    };

    let previous = status.gitops.clone().unwrap_or_default();
    let pending = request.changed
        || request.force
        || previous.resource_generation_skipped
        || !is_condition_true(&status.conditions, ConditionType::GitOpsResourcesGenerated);
    if !pending {
        return GitOpsOutcome::UpToDate;
    }

    let result = generate(ctx, request, &target, previous.commit_id.as_deref()).await;
    match result {
        Ok(commit) => {
            info!(component = %component.name_any(), commit = %commit, branch = %target.branch, "Generated GitOps resources");
            status.gitops = Some(GitOpsStatus {
                repository_url: Some(target.url),
                branch: Some(target.branch),
                context: Some(target.context),
                commit_id: Some(commit),
                resource_generation_skipped: false,
            });
            set_condition(
                &mut status.conditions,
                ok_condition(
                    ConditionType::GitOpsResourcesGenerated,
                    "GitOps resources have been successfully generated",
                ),
            );
            if request.force {
                set_condition(
                    &mut status.conditions,
                    ok_condition(
                        ConditionType::GitOpsResourcesForceGenerated,
                        "GitOps resources have been regenerated",
                    ),
                );
            }
            GitOpsOutcome::Generated
        }
        Err(e) => {
            let message = sanitize_message(&e.to_string(), &[]);
            debug!(component = %component.name_any(), error = %message, "GitOps generation failed");
            set_condition(
                &mut status.conditions,
                error_condition(
                    ConditionType::GitOpsResourcesGenerated,
                    format!("unable to generate GitOps resources: {message}"),
                ),
            );
            GitOpsOutcome::Failed(e)
        }
    }
}

async fn generate(
    ctx: &Context,
    request: &SyncRequest<'_>,
    target: &GitOpsTarget,
    commit: Option<&str>,
) -> has_core::Result<String> {
    let after = gitops_component(request, request.devfile)?;
    let workdir = ctx.gitops_workdir()?;
    let gitops = &ctx.gitops;

    if request.force {
        return gitops.regenerate(workdir.path(), target, &after).await;
    }
    match (request.previous, commit) {
        (Some(previous), Some(_)) => {
            let before = gitops_component(request, previous)?;
            gitops.update(workdir.path(), target, &before, &after).await
        }
        _ => gitops.generate(workdir.path(), target, &after).await,
    }
}
