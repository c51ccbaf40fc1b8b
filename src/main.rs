use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::fs;

use pixelforge::{
    AppState, Config,
    background::ScriptRemover,
    imagepig::ImagePigClient,
    logging, router,
    storage::{JsonRecordStore, LocalFileStorage},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let config = Config::from_env()?;
    if config.api_key.is_none() {
        tracing::warn!("API_KEY is not set; image generation and face swap will fail");
    }

    fs::create_dir_all(&config.public_dir)
        .await
        .with_context(|| format!("failed to create {}", config.public_dir.display()))?;
    fs::create_dir_all(&config.scratch_dir)
        .await
        .with_context(|| format!("failed to create {}", config.scratch_dir.display()))?;

    let records = JsonRecordStore::open(config.data_dir.clone()).await?;
    let files = LocalFileStorage::new(config.public_dir.clone());
    let imagepig = ImagePigClient::new(config.imagepig_base_url.clone(), config.api_key.clone())
        .with_timeouts(config.generate_timeout, config.faceswap_timeout);
    let remover = ScriptRemover::new(
        config.remove_bg_program.clone(),
        config.remove_bg_args.clone(),
        config.scratch_dir.clone(),
        config.remove_bg_timeout,
    );

    let http = reqwest::Client::builder()
        .timeout(config.fetch_timeout)
        .build()
        .context("failed to build HTTP client")?;

    let bind_address = config.bind_address.clone();
    let state = AppState {
        config: Arc::new(config),
        files: Arc::new(files),
        records: Arc::new(records),
        imagepig: Arc::new(imagepig),
        remover: Arc::new(remover),
        http,
    };

    let tcp_listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    tracing::info!("PixelForge server listening on http://{bind_address}");

    axum::serve(tcp_listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    tracing::info!("server stopped");
    Ok(())
}
