//! In-memory collaborators and fixtures for reconciler tests.

use async_trait::async_trait;
use has_core::analyzer::{AnalysisRequest, AnalysisResult, Analyzer};
use has_core::api::{
    Application, ApplicationGitRepository, ApplicationSpec, Component, ComponentSource,
    ComponentSpec, ComponentDetectionQuery, GitSource, SPIFileContentRequest,
};
use has_core::gitops::{GitOpsComponent, GitOpsGenerator, GitOpsTarget};
use has_core::ObjectKey;
use has_source::{RepoUrl, SourceClient, SourceError, SourceResult};
use has_store::MemoryStore;
use k8s_openapi::api::core::v1::Secret;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::OperatorConfig;
use crate::context::{Context, Stores};
use crate::metrics::Metrics;
use crate::repository::RepositoryManager;

pub const NAMESPACE: &str = "user-ns";
pub const REPO: &str = "https://github.com/devfile-samples/devfile-sample-java-springboot-basic";
pub const RAW_DEVFILE: &str = "https://raw.githubusercontent.com/devfile-samples/devfile-sample-java-springboot-basic/main/devfile.yaml";
pub const GITOPS_REPO: &str = "https://github.com/redhat-appstudio-appdata/petclinic-gitops";

pub const DEVFILE: &str = r#"schemaVersion: 2.2.0
metadata:
  name: java-springboot
  language: java
components:
  - name: kubernetes-deploy
    kubernetes:
      endpoints:
        - name: http
          targetPort: 8081
"#;

/// Repository host serving files by URL.
#[derive(Default)]
pub struct FakeSourceClient {
    files: Mutex<HashMap<String, String>>,
    pub fetched: Mutex<Vec<String>>,
}

impl FakeSourceClient {
    pub fn put(&self, url: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(url.to_string(), content.to_string());
    }
}

#[async_trait]
impl SourceClient for FakeSourceClient {
    async fn fetch(&self, url: &str, _token: Option<&str>) -> SourceResult<Option<String>> {
        self.fetched.lock().unwrap().push(url.to_string());
        Ok(self.files.lock().unwrap().get(url).cloned())
    }

    async fn default_branch(&self, repo: &RepoUrl, _token: Option<&str>) -> SourceResult<String> {
        if repo.name.contains("unreachable") {
            return Err(SourceError::DefaultBranch(format!("{} is unreachable", repo.web_url())));
        }
        Ok("main".to_string())
    }
}

/// Analyzer replaying queued results, then `fallback`.
#[derive(Default)]
pub struct FakeAnalyzer {
    results: Mutex<VecDeque<has_core::Result<AnalysisResult>>>,
    pub fallback: Mutex<AnalysisResult>,
    pub requests: Mutex<Vec<AnalysisRequest>>,
}

impl FakeAnalyzer {
    pub fn push(&self, result: has_core::Result<AnalysisResult>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn set(&self, result: AnalysisResult) {
        *self.fallback.lock().unwrap() = result;
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> has_core::Result<AnalysisResult> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(result) = self.results.lock().unwrap().pop_front() {
            return result;
        }
        Ok(self.fallback.lock().unwrap().clone())
    }
}

/// GitOps generator recording each call as `op:component`.
#[derive(Default)]
pub struct FakeGitOps {
    pub calls: Mutex<Vec<String>>,
    pub targets: Mutex<Vec<GitOpsTarget>>,
    pub rendered: Mutex<Vec<GitOpsComponent>>,
    failures: AtomicUsize,
    commits: AtomicUsize,
}

impl FakeGitOps {
    /// Fail the next `n` calls with a transient error.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, op: &str, target: &GitOpsTarget, component: &str) -> has_core::Result<String> {
        self.calls.lock().unwrap().push(format!("{op}:{component}"));
        self.targets.lock().unwrap().push(target.clone());
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(has_core::Error::Transient(
                "git push failed: https://x-access-token@github.com unreachable".to_string(),
            ));
        }
        let n = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("commit-{n}"))
    }
}

#[async_trait]
impl GitOpsGenerator for FakeGitOps {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn generate(
        &self,
        _workdir: &Path,
        target: &GitOpsTarget,
        component: &GitOpsComponent,
    ) -> has_core::Result<String> {
        self.rendered.lock().unwrap().push(component.clone());
        self.record("generate", target, &component.name)
    }

    async fn update(
        &self,
        _workdir: &Path,
        target: &GitOpsTarget,
        _before: &GitOpsComponent,
        after: &GitOpsComponent,
    ) -> has_core::Result<String> {
        self.rendered.lock().unwrap().push(after.clone());
        self.record("update", target, &after.name)
    }

    async fn remove(
        &self,
        _workdir: &Path,
        target: &GitOpsTarget,
        component_name: &str,
    ) -> has_core::Result<String> {
        self.record("remove", target, component_name)
    }

    async fn regenerate(
        &self,
        _workdir: &Path,
        target: &GitOpsTarget,
        component: &GitOpsComponent,
    ) -> has_core::Result<String> {
        self.rendered.lock().unwrap().push(component.clone());
        self.record("regenerate", target, &component.name)
    }
}

#[derive(Default)]
pub struct FakeRepositories {
    pub created: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub create_calls: AtomicUsize,
}

#[async_trait]
impl RepositoryManager for FakeRepositories {
    async fn create_repository(&self, org: &str, name: &str) -> has_core::Result<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let full_name = format!("{org}/{name}");
        let mut created = self.created.lock().unwrap();
        if !created.contains(&full_name) {
            created.push(full_name);
        }
        Ok(format!("https://github.com/{org}/{name}"))
    }

    async fn delete_repository(&self, owner: &str, name: &str) -> has_core::Result<()> {
        self.deleted.lock().unwrap().push(format!("{owner}/{name}"));
        Ok(())
    }
}

pub fn test_config() -> OperatorConfig {
    OperatorConfig {
        application_missing_requeue: Duration::from_millis(10),
        analyzer_retry_backoff: Duration::from_millis(1),
        file_request_poll: Duration::from_millis(10),
        ..Default::default()
    }
}

/// Memory stores and fakes wired into a [`Context`].
pub struct Harness {
    pub applications: Arc<MemoryStore<Application>>,
    pub components: Arc<MemoryStore<Component>>,
    pub detections: Arc<MemoryStore<ComponentDetectionQuery>>,
    pub file_requests: Arc<MemoryStore<SPIFileContentRequest>>,
    pub secrets: Arc<MemoryStore<Secret>>,
    pub source: Arc<FakeSourceClient>,
    pub analyzer: Arc<FakeAnalyzer>,
    pub gitops: Arc<FakeGitOps>,
    pub repositories: Arc<FakeRepositories>,
    pub ctx: Arc<Context>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: OperatorConfig) -> Self {
        let applications = Arc::new(MemoryStore::new());
        let components = Arc::new(MemoryStore::new());
        let detections = Arc::new(MemoryStore::new());
        let file_requests = Arc::new(MemoryStore::new());
        let secrets = Arc::new(MemoryStore::new());
        let source = Arc::new(FakeSourceClient::default());
        let analyzer = Arc::new(FakeAnalyzer::default());
        let gitops = Arc::new(FakeGitOps::default());
        let repositories = Arc::new(FakeRepositories::default());

        let stores = Stores {
            applications: applications.clone(),
            components: components.clone(),
            detections: detections.clone(),
            file_requests: file_requests.clone(),
            secrets: secrets.clone(),
        };
        let ctx = Context::new(
            stores,
            source.clone(),
            analyzer.clone(),
            gitops.clone(),
            Arc::new(Metrics::new().unwrap()),
            config,
        )
        .with_repositories(repositories.clone());

        source.put(RAW_DEVFILE, DEVFILE);

        Self {
            applications,
            components,
            detections,
            file_requests,
            secrets,
            source,
            analyzer,
            gitops,
            repositories,
            ctx: Arc::new(ctx),
        }
    }

    pub fn application(&self, name: &str) -> Option<Application> {
        self.applications.snapshot(&ObjectKey::new(NAMESPACE, name))
    }

    pub fn component(&self, name: &str) -> Option<Component> {
        self.components.snapshot(&ObjectKey::new(NAMESPACE, name))
    }

    pub fn detection(&self, name: &str) -> Option<ComponentDetectionQuery> {
        self.detections.snapshot(&ObjectKey::new(NAMESPACE, name))
    }
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new(NAMESPACE, name)
}

pub fn application(name: &str, gitops_url: Option<&str>) -> Application {
    let mut app = Application::new(
        name,
        ApplicationSpec {
            display_name: "petclinic".to_string(),
            description: "Pet clinic".to_string(),
            git_ops_repository: gitops_url.map(|url| ApplicationGitRepository {
                url: url.to_string(),
                ..Default::default()
            }),
            app_model_repository: None,
        },
    );
    app.metadata.namespace = Some(NAMESPACE.to_string());
    app
}

pub fn git_component(name: &str, application: &str, url: &str) -> Component {
    let mut component = Component::new(
        name,
        ComponentSpec {
            component_name: name.to_string(),
            application: application.to_string(),
            source: Some(ComponentSource {
                git: Some(GitSource {
                    url: url.to_string(),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        },
    );
    component.metadata.namespace = Some(NAMESPACE.to_string());
    component
}

pub fn image_component(name: &str, application: &str, image: &str) -> Component {
    let mut component = Component::new(
        name,
        ComponentSpec {
            component_name: name.to_string(),
            application: application.to_string(),
            container_image: Some(image.to_string()),
            target_port: 8080,
            ..Default::default()
        },
    );
    component.metadata.namespace = Some(NAMESPACE.to_string());
    component
}
