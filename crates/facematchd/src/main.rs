use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod artifact;
mod config;
mod engine;
mod matcher;
mod request;
mod server;
mod verifier;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facematchd starting");

    let config = config::Config::from_env();
    tracing::info!(
        bind = %config.bind,
        model_dir = %config.model_dir.display(),
        scratch_dir = %config.scratch_dir.display(),
        metric = %config.policy.metric,
        threshold = config.policy.threshold,
        "configuration loaded"
    );

    tokio::fs::create_dir_all(&config.scratch_dir)
        .await
        .with_context(|| format!("cannot create scratch directory {}", config.scratch_dir.display()))?;

    // Fail fast if models are missing
    let engine = engine::spawn_engine(&config.model_dir, config.policy)
        .context("failed to start verification engine")?;
    let verifier = verifier::EngineVerifier::new(engine, config.fetch_timeout(), config.verify_timeout())
        .context("failed to build HTTP client")?;

    let state = server::AppState::new(Arc::new(verifier), config.scratch_dir.clone(), config.policy);
    let app = server::router(state, config.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("cannot bind {}", config.bind))?;

    tracing::info!(addr = %config.bind, "facematchd ready");
    server::serve(listener, app).await?;

    Ok(())
}
