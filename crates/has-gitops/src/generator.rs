//! GitOps generator that commits through the git command line.

use async_trait::async_trait;
use has_core::gitops::{GitOpsComponent, GitOpsGenerator, GitOpsTarget};
use has_source::SourceError;
use has_source::git::{self, classify_clone_error};
use has_source::repo::authenticated_url;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::render;

const DEFAULT_AUTHOR_NAME: &str = "application-service";
const DEFAULT_AUTHOR_EMAIL: &str = "application-service@redhat.com";

/// Clones the GitOps repository, rewrites the component's resources and
/// pushes a single commit.
pub struct GitCliGenerator {
    token: Option<String>,
    author_name: String,
    author_email: String,
}

impl GitCliGenerator {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
            author_name: DEFAULT_AUTHOR_NAME.to_string(),
            author_email: DEFAULT_AUTHOR_EMAIL.to_string(),
        }
    }

    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    fn secrets(&self) -> Vec<&str> {
        self.token.as_deref().into_iter().collect()
    }

    /// Check out `target.branch` under `workdir`, creating the branch when
    /// the remote does not have it yet.
    async fn checkout(&self, workdir: &Path, target: &GitOpsTarget) -> has_core::Result<PathBuf> {
        let dest = workdir.join("gitops");
        if dest.exists() {
            tokio::fs::remove_dir_all(&dest)
                .await
                .map_err(|e| has_core::Error::Internal(format!("unable to clean work directory: {e}")))?;
        }
        tokio::fs::create_dir_all(workdir)
            .await
            .map_err(|e| has_core::Error::Internal(format!("unable to create work directory: {e}")))?;

        let url = authenticated_url(&target.url, self.token.as_deref());
        let dest_str = dest.to_string_lossy().to_string();
        let secrets = self.secrets();

        debug!(branch = %target.branch, "Cloning GitOps repository");
        let args = [
            "clone",
            "--depth",
            "1",
            "--branch",
            target.branch.as_str(),
            url.as_str(),
            dest_str.as_str(),
        ];
        match git::run(workdir, &args, &secrets).await {
            Ok(_) => Ok(dest),
            Err(SourceError::Git { message, .. }) if message.contains("not found in upstream") => {
                if dest.exists() {
                    tokio::fs::remove_dir_all(&dest).await.map_err(SourceError::from)?;
                }
                git::run(workdir, &["clone", url.as_str(), dest_str.as_str()], &secrets)
                    .await
                    .map_err(classify_clone_error)?;
                git::run(&dest, &["checkout", "-B", target.branch.as_str()], &secrets).await?;
                Ok(dest)
            }
            Err(e) => Err(classify_clone_error(e)),
        }
    }

    /// Stage everything, then commit and push if anything changed.
    async fn commit_and_push(
        &self,
        repo: &Path,
        target: &GitOpsTarget,
        message: &str,
    ) -> has_core::Result<String> {
        let secrets = self.secrets();
        git::run(repo, &["add", "-A"], &secrets).await?;

        let status = git::run(repo, &["status", "--porcelain"], &secrets).await?;
        if status.is_empty() {
            debug!("GitOps repository already up to date");
            return Ok(git::head_commit(repo).await?);
        }

        let name = format!("user.name={}", self.author_name);
        let email = format!("user.email={}", self.author_email);
        git::run(
            repo,
            &["-c", name.as_str(), "-c", email.as_str(), "commit", "-m", message],
            &secrets,
        )
        .await?;

        let refspec = format!("HEAD:refs/heads/{}", target.branch);
        git::run(repo, &["push", "origin", refspec.as_str()], &secrets).await?;

        let commit = git::head_commit(repo).await?;
        info!(branch = %target.branch, commit = %commit, "Pushed GitOps changes");
        Ok(commit)
    }
}

#[async_trait]
impl GitOpsGenerator for GitCliGenerator {
    fn name(&self) -> &'static str {
        "git"
    }

    async fn generate(
        &self,
        workdir: &Path,
        target: &GitOpsTarget,
        component: &GitOpsComponent,
    ) -> has_core::Result<String> {
        let repo = self.checkout(workdir, target).await?;
        render::write_component(&repo, &target.context, component).await?;
        self.commit_and_push(
            &repo,
            target,
            &format!("Generate GitOps resources for component {}", component.name),
        )
        .await
    }

    async fn update(
        &self,
        workdir: &Path,
        target: &GitOpsTarget,
        before: &GitOpsComponent,
        after: &GitOpsComponent,
    ) -> has_core::Result<String> {
        let repo = self.checkout(workdir, target).await?;
        if before.name != after.name {
            render::remove_component(&repo, &target.context, &before.name).await?;
        }
        render::write_component(&repo, &target.context, after).await?;
        self.commit_and_push(
            &repo,
            target,
            &format!("Update GitOps resources for component {}", after.name),
        )
        .await
    }

    async fn remove(
        &self,
        workdir: &Path,
        target: &GitOpsTarget,
        component_name: &str,
    ) -> has_core::Result<String> {
        let repo = self.checkout(workdir, target).await?;
        if !render::remove_component(&repo, &target.context, component_name).await? {
            debug!(component = %component_name, "Component not present in GitOps repository");
        }
        self.commit_and_push(
            &repo,
            target,
            &format!("Remove GitOps resources for component {component_name}"),
        )
        .await
    }

    async fn regenerate(
        &self,
        workdir: &Path,
        target: &GitOpsTarget,
        component: &GitOpsComponent,
    ) -> has_core::Result<String> {
        let repo = self.checkout(workdir, target).await?;
        render::remove_component(&repo, &target.context, &component.name).await?;
        render::write_component(&repo, &target.context, component).await?;
        self.commit_and_push(
            &repo,
            target,
            &format!("Regenerate GitOps resources for component {}", component.name),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::tests::component;

    async fn git(dir: &Path, args: &[&str]) -> String {
        git::run(dir, args, &[]).await.unwrap()
    }

    /// Bare repository with one commit on `main`.
    async fn seeded_remote(root: &Path) -> String {
        let remote = root.join("remote.git");
        let seed = root.join("seed");
        std::fs::create_dir_all(&remote).unwrap();
        std::fs::create_dir_all(&seed).unwrap();
        git(&remote, &["init", "--bare", "--initial-branch=main"]).await;
        git(&seed, &["init", "--initial-branch=main"]).await;
        std::fs::write(seed.join("README.md"), "gitops\n").unwrap();
        git(&seed, &["add", "-A"]).await;
        git(
            &seed,
            &["-c", "user.name=t", "-c", "user.email=t@example.com", "commit", "-m", "init"],
        )
        .await;
        let remote_str = remote.to_string_lossy().to_string();
        git(&seed, &["push", remote_str.as_str(), "HEAD:refs/heads/main"]).await;
        remote_str
    }

    #[tokio::test]
    async fn test_generate_update_remove() {
        let root = tempfile::tempdir().unwrap();
        let remote = seeded_remote(root.path()).await;
        let remote_dir = PathBuf::from(&remote);
        let target = GitOpsTarget::new(remote.clone(), Some("main"), Some("/"));
        let generator = GitCliGenerator::new(None);
        let work = root.path().join("work");

        let first = generator
            .generate(&work, &target, &component("backend", Some(8080)))
            .await
            .unwrap();
        assert_eq!(git(&remote_dir, &["rev-parse", "refs/heads/main"]).await, first);

        // Same content, no new commit.
        let again = generator
            .generate(&work, &target, &component("backend", Some(8080)))
            .await
            .unwrap();
        assert_eq!(again, first);

        let renamed = generator
            .update(
                &work,
                &target,
                &component("backend", Some(8080)),
                &component("api", Some(8080)),
            )
            .await
            .unwrap();
        assert_ne!(renamed, first);
        let files = git(&remote_dir, &["ls-tree", "-r", "--name-only", "refs/heads/main"]).await;
        assert!(files.contains("components/api/base/deployment.yaml"));
        assert!(!files.contains("components/backend"));

        let removed = generator.remove(&work, &target, "api").await.unwrap();
        assert_ne!(removed, renamed);
        let files = git(&remote_dir, &["ls-tree", "-r", "--name-only", "refs/heads/main"]).await;
        assert!(!files.contains("components/api"));
        assert!(files.contains("components/kustomization.yaml"));
    }

    #[tokio::test]
    async fn test_missing_branch_is_created() {
        let root = tempfile::tempdir().unwrap();
        let remote = seeded_remote(root.path()).await;
        let target = GitOpsTarget::new(remote.clone(), Some("staging"), Some("envs/staging"));
        let generator = GitCliGenerator::new(None);

        let commit = generator
            .generate(&root.path().join("work"), &target, &component("web", None))
            .await
            .unwrap();
        let remote_dir = PathBuf::from(&remote);
        assert_eq!(git(&remote_dir, &["rev-parse", "refs/heads/staging"]).await, commit);
        let files = git(&remote_dir, &["ls-tree", "-r", "--name-only", "refs/heads/staging"]).await;
        assert!(files.contains("envs/staging/components/web/base/kustomization.yaml"));
    }
}
