pub mod commands;
pub mod config;
pub mod db;
pub mod doc_processor;
pub mod error;
pub mod llm;
pub mod prompts;
pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};

use config::{Config, ProviderKind};
use db::blob::BlobStore;
use db::Database;
use llm::CompletionClient;
use server::AppState;

/// Open the stores, build the completion client and serve until shutdown.
pub async fn run(config: Config) -> Result<()> {
    let db = Database::open(&config.storage.database_path).with_context(|| {
        format!(
            "opening database: {}",
            config.storage.database_path.display()
        )
    })?;
    let blobs = BlobStore::new(&config.storage.blob_dir);

    if config.llm.provider == ProviderKind::OpenAi && config.llm.api_key.is_none() {
        tracing::warn!("no OpenAI API key configured; completion calls will be rejected");
    }
    let llm = CompletionClient::from_config(&config.llm).context("building HTTP client")?;
    tracing::info!(model = llm.model(), "completion client ready");

    let state = Arc::new(AppState { db, blobs, llm });
    let app = server::router(state, config.server.max_upload_bytes);

    let addr = config.server.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("book-chat listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
