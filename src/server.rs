//! HTTP surface:
//!
//! - `POST /api/upload`: multipart PDF upload
//! - `POST /api/chat`: assistant reply in a conversation
//! - `POST /api/summarize`: summary of a page range
//! - `GET  /api/books/{id}`: book, conversation and messages
//! - `GET  /api/books/{id}/pdf`: the original file
//! - `POST /api/conversations/{id}/messages`: store a reader turn
//! - `GET  /health`: server status

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::commands::{books, chat, summarize, upload};
use crate::db::blob::BlobStore;
use crate::db::Database;
use crate::llm::ChatModel;

/// Dependencies shared by every request.
pub struct AppState<M> {
    pub db: Database,
    pub blobs: BlobStore,
    pub llm: M,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router<M: ChatModel + 'static>(state: Arc<AppState<M>>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/upload", post(upload::upload::<M>))
        .route("/api/chat", post(chat::chat::<M>))
        .route("/api/summarize", post(summarize::summarize::<M>))
        .route("/api/books/{id}", get(books::get_book::<M>))
        .route("/api/books/{id}/pdf", get(books::get_pdf::<M>))
        .route(
            "/api/conversations/{id}/messages",
            post(books::post_message::<M>),
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
