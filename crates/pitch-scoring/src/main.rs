mod cache;
mod config;
mod error;
mod extract;
mod http;
mod model;
mod orchestrator;
mod repository;
mod server;
mod service;
mod slides;
mod store;

use std::sync::Arc;

use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pitch_common::classifier::{BoxedModel, ClassificationEngine};
use pitch_common::embedding::{EmbeddingZeroShot, ZeroShotOptions};
use pitch_common::redis::RedisCache;

use cache::ScoreCache;
use config::Config;
use orchestrator::ScoringOrchestrator;
use repository::ScoreRepository;
use server::PitchScoringServer;
use service::PitchService;
use store::DocumentStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting pitch-scoring service");

    let config = Config::from_env()?;
    info!(
        upload_dir = %config.upload_dir.display(),
        database = %config.database_path.display(),
        classifier_workers = config.classifier_workers,
        "configuration loaded"
    );

    let redis = RedisCache::new(config.redis_url.as_deref());
    if redis.is_available().await {
        info!("redis connected");
    } else {
        info!("redis unavailable, running without score cache");
    }
    let cache = ScoreCache::new(Arc::new(redis), config.score_cache_ttl_secs);

    // The model is loaded on the first scoring run, not here.
    let options = ZeroShotOptions {
        temperature: config.classifier_temperature,
        ..ZeroShotOptions::default()
    };
    let engine = Arc::new(ClassificationEngine::new(
        move || EmbeddingZeroShot::load(options.clone()).map(|m| Box::new(m) as BoxedModel),
        config.classifier_workers,
    ));

    let store = DocumentStore::open(&config.upload_dir).await?;
    let database_path = config.database_path.clone();
    let repository =
        tokio::task::spawn_blocking(move || ScoreRepository::open(&database_path)).await??;
    info!("database ready");

    let service = Arc::new(PitchService::new(
        store,
        repository,
        ScoringOrchestrator::new(engine),
        cache,
    ));

    let mcp_server = PitchScoringServer::new(Arc::clone(&service), config.max_upload_bytes);
    let mcp = StreamableHttpService::new(
        move || Ok(mcp_server.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    let app = http::router(service, config.max_upload_bytes).nest_service("/mcp", mcp);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "HTTP server ready, MCP mounted at /mcp");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .inspect_err(|e| tracing::error!(error = %e, "HTTP server error"))?;

    info!("pitch-scoring service shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
}
