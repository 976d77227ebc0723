use anyhow::Context;
use chaptersplit::api::{self, AppState};
use chaptersplit::config::AppConfig;
use chaptersplit::services::detector::BoundaryDetector;
use chaptersplit::services::orchestrator::SplitOrchestrator;
use chaptersplit::services::splitter::ManifestSplitter;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    fmt().with_env_filter(filter).init();

    let detector = Arc::new(BoundaryDetector::new(&config.detection));
    let orchestrator = SplitOrchestrator::new(Arc::new(ManifestSplitter), &config.tasks);

    let state = AppState {
        orchestrator,
        detector,
        min_pages_per_chapter: config.detection.min_pages_per_chapter,
    };
    let app = api::router(state);

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("binding {}", config.bind_address()))?;
    tracing::info!(
        address = %listener.local_addr()?,
        output_dir = %config.tasks.output_dir.display(),
        max_concurrent_tasks = config.tasks.max_concurrent_tasks,
        "chaptersplit listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}
