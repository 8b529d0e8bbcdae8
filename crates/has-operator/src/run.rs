//! Wiring the reconcilers to the cluster.

use anyhow::Context as _;
use has_controller::application::ApplicationReconciler;
use has_controller::component::ComponentReconciler;
use has_controller::context::Stores;
use has_controller::detection::DetectionReconciler;
use has_controller::{
    Context, EventMapper, Metrics, OperatorConfig, Reconciler, WorkQueue, WorkerPool, run_watchers,
};
use has_gitops::GitCliGenerator;
use has_source::{GitAnalyzer, GitHubClient, HttpSourceClient};
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn run(config: OperatorConfig) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .context("unable to create Kubernetes client")?;
    let metrics = Arc::new(Metrics::new().context("unable to register metrics")?);
    let stores = Stores::kube(client.clone());

    let source = HttpSourceClient::new(config.http_timeout, config.http_retry_attempts)?
        .with_metrics(metrics.github().clone());
    let gitops = GitCliGenerator::new(config.github_token.clone());
    let mut ctx = Context::new(
        stores.clone(),
        Arc::new(source),
        Arc::new(GitAnalyzer::new()),
        Arc::new(gitops),
        metrics.clone(),
        config.clone(),
    );
    match config.github_token.clone() {
        Some(token) => {
            let github = GitHubClient::new(token, config.http_timeout)?
                .with_metrics(metrics.github().clone());
            ctx = ctx.with_repositories(Arc::new(github));
        }
        None => warn!("No GitHub token configured, GitOps repositories will not be generated"),
    }
    let ctx = Arc::new(ctx);

    let applications = WorkQueue::new("applications");
    let components = WorkQueue::new("components");
    let detections = WorkQueue::new("componentdetectionqueries");
    let mapper = Arc::new(EventMapper::new(
        applications.clone(),
        components.clone(),
        detections.clone(),
        stores.components.clone(),
    ));

    let pools: [(WorkQueue, Arc<dyn Reconciler>); 3] = [
        (applications, Arc::new(ApplicationReconciler::new(ctx.clone()))),
        (components, Arc::new(ComponentReconciler::new(ctx.clone()))),
        (detections, Arc::new(DetectionReconciler::new(ctx.clone()))),
    ];

    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();
    for (queue, reconciler) in pools {
        let pool = WorkerPool::new(queue, reconciler, config.workers_per_kind);
        tasks.spawn(pool.run(cancel.clone()));
    }
    tasks.spawn(run_watchers(client, config.namespace.clone(), mapper, cancel.clone()));

    info!(
        namespace = config.namespace.as_deref().unwrap_or("*"),
        workers = config.workers_per_kind,
        "Operator started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("unable to listen for shutdown signal")?;
    info!("Shutting down");
    cancel.cancel();
    while tasks.join_next().await.is_some() {}
    Ok(())
}
