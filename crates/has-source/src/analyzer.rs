//! Repository analyzer backed by a shallow git clone.

use async_trait::async_trait;
use has_core::analyzer::{AnalysisRequest, AnalysisResult, Analyzer, DetectedContext, ROOT_CONTEXT};
use has_core::api::normalize_context;
use has_devfile::Devfile;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::git::{self, classify_clone_error};
use crate::repo::RepoUrl;
use crate::resolve::{DEVFILE_CANDIDATES, DOCKERFILE_CANDIDATES};

/// How far below the analyzed directory components are looked for.
const MAX_SCAN_DEPTH: usize = 2;

const SKIPPED_DIRS: [&str; 6] = [
    "node_modules",
    "target",
    "vendor",
    "__pycache__",
    "dist",
    "build",
];

/// Analyzer that clones the repository and inspects its files.
pub struct GitAnalyzer {
    work_dir: Option<PathBuf>,
}

impl Default for GitAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl GitAnalyzer {
    pub fn new() -> Self {
        Self { work_dir: None }
    }

    /// Create clones under `work_dir` instead of the system temp directory.
    pub fn with_work_dir(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: Some(work_dir.into()),
        }
    }

    fn temp_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("has-analyze-");
        match &self.work_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
    }
}

#[async_trait]
impl Analyzer for GitAnalyzer {
    fn name(&self) -> &'static str {
        "git"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> has_core::Result<AnalysisResult> {
        let repo = RepoUrl::parse(&request.repo_url)?;
        let token = request.token.as_deref();

        // Removed when dropped, on every path out of this function.
        let workdir = self
            .temp_dir()
            .map_err(|e| has_core::Error::Internal(format!("unable to create work directory: {e}")))?;
        let checkout = workdir.path().join("repo");

        info!(repo = %repo.web_url(), "Analyzing repository");
        git::clone(&repo.clone_url(), token, request.revision.as_deref(), &checkout)
            .await
            .map_err(classify_clone_error)?;

        let revision = match request.revision.as_deref().filter(|r| !r.is_empty()) {
            Some(revision) => revision.to_string(),
            None => git::current_branch(&checkout).await?,
        };

        let context = normalize_context(request.context.as_deref().unwrap_or_default());
        let root = if context.is_empty() {
            checkout.clone()
        } else {
            checkout.join(context)
        };
        if !root.is_dir() {
            return Err(has_core::Error::NotFound(format!(
                "context {context} does not exist in {}",
                repo.web_url()
            )));
        }

        let contexts = detect_contexts(&root, |ctx, file| {
            let full = match (context.is_empty(), ctx.is_empty()) {
                (true, _) => ctx.to_string(),
                (false, true) => context.to_string(),
                (false, false) => format!("{context}/{ctx}"),
            };
            repo.raw_file_url(&revision, &full, file)
        })
        .await
        .map_err(|e| has_core::Error::Internal(format!("unable to scan repository: {e}")))?;

        info!(repo = %repo.web_url(), contexts = contexts.len(), "Repository analyzed");
        Ok(AnalysisResult { contexts })
    }
}

/// Inspect `root` and its subdirectories. `raw_url(context, file)` builds
/// the absolute URL of a file found in a context.
pub async fn detect_contexts<F>(
    root: &Path,
    raw_url: F,
) -> std::io::Result<BTreeMap<String, DetectedContext>>
where
    F: Fn(&str, &str) -> String + Send + Sync,
{
    let mut found = BTreeMap::new();

    if let Some(detected) = inspect(root, "", &raw_url).await? {
        found.insert(ROOT_CONTEXT.to_string(), detected);
        return Ok(found);
    }

    scan_directory(root, root, 1, &raw_url, &mut found).await?;
    Ok(found)
}

#[async_recursion::async_recursion]
async fn scan_directory(
    base: &Path,
    current: &Path,
    depth: usize,
    raw_url: &(dyn Fn(&str, &str) -> String + Send + Sync),
    found: &mut BTreeMap<String, DetectedContext>,
) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(current).await?;
    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if !path.is_dir() || name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_str()) {
            continue;
        }
        dirs.push(path);
    }
    dirs.sort();

    for dir in dirs {
        let relative = dir
            .strip_prefix(base)
            .unwrap_or(&dir)
            .to_string_lossy()
            .replace('\\', "/");
        match inspect(&dir, &relative, raw_url).await? {
            Some(detected) => {
                debug!(context = %relative, "Detected component context");
                found.insert(relative, detected);
            }
            None if depth < MAX_SCAN_DEPTH => {
                scan_directory(base, &dir, depth + 1, raw_url, found).await?;
            }
            None => {}
        }
    }
    Ok(())
}

/// Look for a devfile, a Dockerfile or language markers directly in `dir`.
async fn inspect(
    dir: &Path,
    context: &str,
    raw_url: &(dyn Fn(&str, &str) -> String + Send + Sync),
) -> std::io::Result<Option<DetectedContext>> {
    let mut detected = DetectedContext::default();
    let (language, project_type) = detect_language(dir).await;

    for candidate in DEVFILE_CANDIDATES {
        let path = dir.join(candidate);
        if !path.is_file() {
            continue;
        }
        let content = tokio::fs::read_to_string(&path).await?;
        if let Ok(devfile) = Devfile::parse(&content) {
            detected.language = devfile.metadata.language.clone();
            detected.project_type = devfile.metadata.project_type.clone();
            detected.ports = devfile
                .kubernetes_components()
                .filter_map(|c| c.kubernetes.as_ref())
                .flat_map(|k| k.endpoints.iter().map(|e| e.target_port))
                .collect();
        }
        detected.devfile = Some(content);
        detected.devfile_url = Some(raw_url(context, candidate));
        break;
    }

    if detected.devfile.is_none() {
        for candidate in DOCKERFILE_CANDIDATES {
            let path = dir.join(candidate);
            if !path.is_file() {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            detected.ports = exposed_ports(&content);
            detected.dockerfile_url = Some(raw_url(context, candidate));
            break;
        }
    }

    if detected.language.is_none() {
        detected.language = language;
    }
    if detected.project_type.is_none() {
        detected.project_type = project_type;
    }

    let anything = detected.devfile.is_some()
        || detected.dockerfile_url.is_some()
        || detected.language.is_some();
    Ok(anything.then_some(detected))
}

/// Language and project type from well-known build files.
async fn detect_language(dir: &Path) -> (Option<String>, Option<String>) {
    let has = |name: &str| dir.join(name).is_file();

    if has("pom.xml") || has("build.gradle") || has("build.gradle.kts") {
        let mut spring = false;
        for file in ["pom.xml", "build.gradle", "build.gradle.kts"] {
            if let Ok(content) = tokio::fs::read_to_string(dir.join(file)).await {
                spring |= content.contains("spring-boot");
            }
        }
        let project_type = if spring { "springboot" } else { "java" };
        return (Some("java".to_string()), Some(project_type.to_string()));
    }

    let markers: [(&[&str], &str, &str); 4] = [
        (&["package.json"], "javascript", "nodejs"),
        (&["go.mod"], "go", "go"),
        (&["requirements.txt", "pyproject.toml", "setup.py"], "python", "python"),
        (&["Cargo.toml"], "rust", "rust"),
    ];
    for (files, language, project_type) in markers {
        if files.iter().any(|f| has(f)) {
            return (Some(language.to_string()), Some(project_type.to_string()));
        }
    }
    (None, None)
}

/// Ports from `EXPOSE` instructions.
fn exposed_ports(dockerfile: &str) -> Vec<i32> {
    let mut ports = Vec::new();
    for line in dockerfile.lines() {
        let line = line.trim();
        let Some(rest) = line
            .get(..6)
            .filter(|kw| kw.eq_ignore_ascii_case("expose"))
            .map(|_| &line[6..])
        else {
            continue;
        };
        for token in rest.split_whitespace() {
            let number = token.split('/').next().unwrap_or_default();
            if let Ok(port) = number.parse::<i32>() {
                if !ports.contains(&port) {
                    ports.push(port);
                }
            }
        }
    }
    ports
}
