//! Getting a Component's devfile for the first time.
//!
//! Image components get a minimal devfile. Git components are resolved from
//! their repository, or through file content requests when they name a
//! secret for a private repository and give no explicit devfile or
//! Dockerfile URL. Either way a Dockerfile stands in when no devfile exists.

use has_core::api::{
    Component, FileContentPhase, GitSource, SPIFileContentRequest, SPIFileContentRequestSpec,
};
use has_core::keys;
use has_core::ObjectKey;
use has_devfile::deployment::{DeploymentParams, container_image_devfile, dockerfile_devfile};
use has_devfile::Devfile;
use has_source::resolve::{DevfileResolver, from_content};
use has_source::{DEVFILE_CANDIDATES, DOCKERFILE_CANDIDATES};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::context::Context;

/// Room left for the `-devfile-N` suffix in request names.
const REQUEST_NAME_PREFIX_LEN: usize = 50;

pub(super) enum Acquired {
    Ready(Devfile),
    /// Content is not available yet; look again after the delay.
    Pending(Duration),
}

pub(super) async fn acquire(
    ctx: &Context,
    component: &Component,
    params: &DeploymentParams,
) -> has_core::Result<Acquired> {
    let Some(git) = component.git_source() else {
        if component.is_image_component() {
            return Ok(Acquired::Ready(container_image_devfile(params)?));
        }
        return Err(has_core::Error::Validation(
            "component has neither a git source nor a container image".to_string(),
        ));
    };

    let result = from_git(ctx, component, git, params).await;
    match &result {
        Ok(Acquired::Ready(_)) => ctx.metrics.git_import_succeeded(),
        Err(e) if !e.is_user_error() => ctx.metrics.git_import_failed(),
        _ => {}
    }
    result
}

async fn from_git(
    ctx: &Context,
    component: &Component,
    git: &GitSource,
    params: &DeploymentParams,
) -> has_core::Result<Acquired> {
    let explicit_url = [&git.devfile_url, &git.dockerfile_url]
        .into_iter()
        .any(|u| u.as_deref().is_some_and(|u| !u.is_empty()));
    let private = component.spec.secret.as_deref().is_some_and(|s| !s.is_empty());
    if private && !explicit_url {
        return request_devfile(ctx, component, git, params).await;
    }

    ctx.metrics.git_import_started();
    let resolved = DevfileResolver::new(ctx.source.as_ref())
        .resolve(git, None, params)
        .await?;
    info!(component = %component.name_any(), origin = ?resolved.origin, "Resolved devfile");
    Ok(Acquired::Ready(resolved.devfile))
}

/// Walk the devfile candidates, then the Dockerfile candidates, through file
/// content requests, one request per candidate, moving on when the service
/// reports the file missing. The import counts as started with the first
/// request.
async fn request_devfile(
    ctx: &Context,
    component: &Component,
    git: &GitSource,
    params: &DeploymentParams,
) -> has_core::Result<Acquired> {
    let store = &ctx.stores.file_requests;
    let namespace = component.namespace().unwrap_or_default();
    let context = git.normalized_context();

    let candidates = DEVFILE_CANDIDATES
        .iter()
        .map(|c| (*c, false))
        .chain(DOCKERFILE_CANDIDATES.iter().map(|c| (*c, true)));

    for (index, (candidate, dockerfile)) in candidates.enumerate() {
        let file_path = if context.is_empty() {
            candidate.to_string()
        } else {
            format!("{context}/{candidate}")
        };
        let name = request_name(&component.name_any(), index);
        let Some(request) = store.get(&ObjectKey::new(&namespace, &name)).await? else {
            store.create(&new_request(component, &name, git, &file_path)?).await?;
            if index == 0 {
                ctx.metrics.git_import_started();
            }
            debug!(component = %component.name_any(), request = %name, path = %file_path, "Requested file content");
            return Ok(Acquired::Pending(ctx.config.file_request_poll));
        };

        let status = request.status.unwrap_or_default();
        match status.phase {
            FileContentPhase::AwaitingTokenData => {
                return Ok(Acquired::Pending(ctx.config.file_request_poll));
            }
            FileContentPhase::Delivered if dockerfile => {
                info!(component = %component.name_any(), path = %file_path, "Using Dockerfile");
                return Ok(Acquired::Ready(dockerfile_devfile(params, candidate)?));
            }
            FileContentPhase::Delivered => {
                let content = status.content.unwrap_or_default();
                return Ok(Acquired::Ready(from_content(&content, params)?));
            }
            FileContentPhase::Error => {
                let message = status.message.unwrap_or_default();
                if is_missing_file(&message) {
                    continue;
                }
                return Err(has_core::Error::Authentication(format!(
                    "unable to read {file_path} from {}: {message}",
                    git.url
                )));
            }
        }
    }

    Err(has_core::Error::NotFound(format!(
        "unable to find a devfile or Dockerfile in {} at context {:?}",
        git.url,
        if context.is_empty() { "./" } else { context }
    )))
}

fn request_name(component: &str, index: usize) -> String {
    let prefix: String = component.chars().take(REQUEST_NAME_PREFIX_LEN).collect();
    format!("{}-devfile-{index}", prefix.trim_end_matches('-'))
}

fn is_missing_file(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("not found") || message.contains("404") || message.contains("no such file")
}

fn new_request(
    component: &Component,
    name: &str,
    git: &GitSource,
    file_path: &str,
) -> has_core::Result<SPIFileContentRequest> {
    let owner = component.controller_owner_ref(&()).ok_or_else(|| {
        has_core::Error::Internal(format!("component {} has no uid", component.name_any()))
    })?;
    let mut request = SPIFileContentRequest::new(
        name,
        SPIFileContentRequestSpec {
            repo_url: git.url.clone(),
            file_path: file_path.to_string(),
            git_ref: git.revision.clone().filter(|r| !r.is_empty()),
        },
    );
    request.metadata.namespace = component.namespace();
    request.metadata.owner_references = Some(vec![owner]);
    request.metadata.labels = Some(BTreeMap::from([(
        keys::LABEL_COMPONENT.to_string(),
        component.name_any(),
    )]));
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DEVFILE, Harness, REPO, git_component, key};
    use has_core::api::SPIFileContentRequestStatus;
    use has_store::ResourceStore;

    async fn private_component(h: &Harness) -> Component {
        let mut component = git_component("backend", "a1", REPO);
        component.spec.secret = Some("repo-token".into());
        h.components.create(&component).await.unwrap()
    }

    fn params() -> DeploymentParams {
        DeploymentParams {
            component_name: "backend".into(),
            image: "quay.io/org/ws:user-ns-backend".into(),
            ..Default::default()
        }
    }

    async fn deliver(h: &Harness, name: &str, status: SPIFileContentRequestStatus) {
        let mut request = h.file_requests.snapshot(&key(name)).unwrap();
        request.status = Some(status);
        h.file_requests.replace_status(&request).await.unwrap();
    }

    #[test]
    fn test_request_name_is_bounded() {
        assert_eq!(request_name("backend", 0), "backend-devfile-0");
        let long = "a".repeat(70);
        assert_eq!(request_name(&long, 3).len(), REQUEST_NAME_PREFIX_LEN + "-devfile-3".len());
    }

    #[tokio::test]
    async fn test_image_component_gets_minimal_devfile() {
        let h = Harness::new();
        let mut component = git_component("web", "a1", REPO);
        component.spec.source = None;
        component.spec.container_image = Some("quay.io/org/web:1".into());

        let Acquired::Ready(devfile) = acquire(&h.ctx, &component, &params()).await.unwrap() else {
            panic!("expected a devfile");
        };
        assert!(devfile.has_kubernetes_component());
        assert_eq!(h.ctx.metrics.git_imports(), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_file_request_flow() {
        let h = Harness::new();
        let component = private_component(&h).await;

        let first = acquire(&h.ctx, &component, &params()).await.unwrap();
        assert!(matches!(first, Acquired::Pending(_)));
        let request = h.file_requests.snapshot(&key("backend-devfile-0")).unwrap();
        assert_eq!(request.spec.file_path, "devfile.yaml");
        assert_eq!(request.owner_references()[0].name, "backend");
        assert_eq!(
            request.labels().get(keys::LABEL_COMPONENT).map(String::as_str),
            Some("backend")
        );

        // Still waiting for the token.
        let waiting = acquire(&h.ctx, &component, &params()).await.unwrap();
        assert!(matches!(waiting, Acquired::Pending(_)));

        deliver(&h, "backend-devfile-0", SPIFileContentRequestStatus {
            phase: FileContentPhase::Error,
            message: Some("file devfile.yaml not found".into()),
            ..Default::default()
        })
        .await;
        let next = acquire(&h.ctx, &component, &params()).await.unwrap();
        assert!(matches!(next, Acquired::Pending(_)));
        let request = h.file_requests.snapshot(&key("backend-devfile-1")).unwrap();
        assert_eq!(request.spec.file_path, ".devfile.yaml");

        deliver(&h, "backend-devfile-1", SPIFileContentRequestStatus {
            phase: FileContentPhase::Delivered,
            content: Some(DEVFILE.into()),
            ..Default::default()
        })
        .await;
        let Acquired::Ready(devfile) = acquire(&h.ctx, &component, &params()).await.unwrap() else {
            panic!("expected a devfile");
        };
        assert_eq!(devfile.metadata.name.as_deref(), Some("java-springboot"));
        assert!(h.source.fetched.lock().unwrap().is_empty());
        assert_eq!(h.ctx.metrics.git_imports(), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_file_request_falls_back_to_dockerfile() {
        let h = Harness::new();
        let component = private_component(&h).await;
        let missing = || SPIFileContentRequestStatus {
            phase: FileContentPhase::Error,
            message: Some("404 Not Found".into()),
            ..Default::default()
        };

        for index in 0..DEVFILE_CANDIDATES.len() {
            let pending = acquire(&h.ctx, &component, &params()).await.unwrap();
            assert!(matches!(pending, Acquired::Pending(_)));
            deliver(&h, &format!("backend-devfile-{index}"), missing()).await;
        }
        acquire(&h.ctx, &component, &params()).await.unwrap();
        let name = format!("backend-devfile-{}", DEVFILE_CANDIDATES.len());
        assert_eq!(h.file_requests.snapshot(&key(&name)).unwrap().spec.file_path, "Dockerfile");

        deliver(&h, &name, SPIFileContentRequestStatus {
            phase: FileContentPhase::Delivered,
            content: Some("FROM registry.access.redhat.com/ubi9/nodejs-18\nEXPOSE 3000\n".into()),
            ..Default::default()
        })
        .await;
        let Acquired::Ready(devfile) = acquire(&h.ctx, &component, &params()).await.unwrap() else {
            panic!("expected a devfile");
        };
        let dockerfile = devfile.components[0].image.as_ref().unwrap().dockerfile.as_ref().unwrap();
        assert_eq!(dockerfile.uri.as_deref(), Some("Dockerfile"));
        assert!(devfile.has_kubernetes_component());
        assert_eq!(h.ctx.metrics.git_imports(), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_private_repository_without_any_candidate() {
        let h = Harness::new();
        let component = private_component(&h).await;
        let total = DEVFILE_CANDIDATES.len() + DOCKERFILE_CANDIDATES.len();

        for index in 0..total {
            acquire(&h.ctx, &component, &params()).await.unwrap();
            deliver(&h, &format!("backend-devfile-{index}"), SPIFileContentRequestStatus {
                phase: FileContentPhase::Error,
                message: Some("no such file".into()),
                ..Default::default()
            })
            .await;
        }
        let err = match acquire(&h.ctx, &component, &params()).await {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, has_core::Error::NotFound(_)));
        assert!(err.to_string().contains("devfile or Dockerfile"));
    }

    #[tokio::test]
    async fn test_file_request_error_is_an_authentication_failure() {
        let h = Harness::new();
        let component = private_component(&h).await;
        acquire(&h.ctx, &component, &params()).await.unwrap();

        deliver(&h, "backend-devfile-0", SPIFileContentRequestStatus {
            phase: FileContentPhase::Error,
            message: Some("access denied for token".into()),
            ..Default::default()
        })
        .await;
        let err = match acquire(&h.ctx, &component, &params()).await {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, has_core::Error::Authentication(_)));
        assert_eq!(h.ctx.metrics.git_imports().2, 0);
    }

    #[tokio::test]
    async fn test_explicit_devfile_url_bypasses_file_requests() {
        let h = Harness::new();
        let mut component = git_component("backend", "a1", REPO);
        component.spec.secret = Some("repo-token".into());
        if let Some(git) = component.spec.source.as_mut().and_then(|s| s.git.as_mut()) {
            git.devfile_url = Some("https://registry.example.com/devfiles/java/devfile.yaml".into());
        }
        h.source.put("https://registry.example.com/devfiles/java/devfile.yaml", DEVFILE);

        let acquired = acquire(&h.ctx, &component, &params()).await.unwrap();
        assert!(matches!(acquired, Acquired::Ready(_)));
        assert!(h.file_requests.is_empty());
    }
}
