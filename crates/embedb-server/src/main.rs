//! embedb server binary: config loading, tracing setup, engine startup,
//! and the axum serve loop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use embedb_core::{EmbedbConfig, Embedder, Engine, NoopEmbedder};
use embedb_server::{build_router, AppState, RemoteEmbedder};

/// embedb - an embedding index and similarity-search service
#[derive(Parser, Debug)]
#[command(name = "embedb-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "embedb.toml", env = "EMBEDB_CONFIG")]
    config: PathBuf,

    /// Data directory override
    #[arg(short, long, env = "EMBEDB_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Port override
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = EmbedbConfig::from_file(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting embedb server");
    tracing::info!(data_dir = %config.storage.data_dir.display(), "data directory");

    // Startup is blocking work (WAL replay, index build, HTTP client
    // construction), so it runs off the async runtime. The embedding
    // adapter is wired from explicit configuration, loaded once here and
    // read-only afterwards.
    let engine_config = config.clone();
    let engine = tokio::task::spawn_blocking(move || -> anyhow::Result<Engine> {
        let dimension = engine_config.hnsw.dimension;
        let embedder: Arc<dyn Embedder> = if engine_config.model.endpoint.is_some() {
            tracing::info!(
                model = %engine_config.model.name,
                cache_dir = %engine_config.model.cache_dir.display(),
                "embedding adapter: remote endpoint"
            );
            Arc::new(RemoteEmbedder::from_config(&engine_config.model, dimension)?)
        } else {
            tracing::warn!(
                "embedding adapter: none configured, text endpoints will return 503 \
                 (set model.endpoint to enable them)"
            );
            Arc::new(NoopEmbedder::new(dimension))
        };
        Ok(Engine::open(engine_config.clone(), embedder)?)
    })
    .await
    .context("engine startup task failed")??;

    let state = Arc::new(AppState { engine });
    let app = build_router(state, &config.server);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("embedb server listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
