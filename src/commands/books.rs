//! Reads and writes the browser client needs around a book: opening it
//! with its conversation, storing the reader's own turns, and serving the
//! original PDF back.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::commands::chat::ChatReply;
use crate::db::blob::BlobStore;
use crate::db::models::{Book, Conversation, Message, Role};
use crate::db::Database;
use crate::error::{ApiError, AppError, AppResult};
use crate::llm::ChatModel;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct BookView {
    pub book: Book,
    pub conversation: Conversation,
    /// Oldest first.
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct NewMessageBody {
    pub content: String,
}

/// Load a book with its conversation, creating the conversation if the
/// book has none yet.
pub fn open_book(db: &Database, book_id: &str) -> AppResult<BookView> {
    let book = db.get_book(book_id)?.ok_or(AppError::NotFound("Book"))?;
    let conversation = match db.get_conversation_by_book(&book.id)? {
        Some(conversation) => conversation,
        None => db.create_conversation(&book.id)?,
    };
    let messages = db.list_messages(&conversation.id)?;
    Ok(BookView {
        book,
        conversation,
        messages,
    })
}

/// Store a turn typed by the reader.
pub fn append_user_message(
    db: &Database,
    conversation_id: &str,
    content: &str,
) -> AppResult<Message> {
    if content.trim().is_empty() {
        return Err(AppError::Validation("Message content is empty".into()));
    }
    let conversation = db
        .get_conversation(conversation_id)?
        .ok_or(AppError::NotFound("Conversation"))?;
    Ok(db.add_message(&conversation.id, Role::User, content)?)
}

pub async fn load_pdf(db: &Database, blobs: &BlobStore, book_id: &str) -> AppResult<Vec<u8>> {
    let book = db.get_book(book_id)?.ok_or(AppError::NotFound("Book"))?;
    let key = book.pdf_url.ok_or(AppError::NotFound("PDF"))?;
    blobs.get(&key).await?.ok_or(AppError::NotFound("PDF"))
}

/// `GET /api/books/{id}`
pub async fn get_book<M: ChatModel + 'static>(
    State(state): State<Arc<AppState<M>>>,
    Path(book_id): Path<String>,
) -> Result<Json<BookView>, ApiError> {
    open_book(&state.db, &book_id)
        .map(Json)
        .map_err(|e| e.into_api("Failed to load book"))
}

/// `GET /api/books/{id}/pdf`
pub async fn get_pdf<M: ChatModel + 'static>(
    State(state): State<Arc<AppState<M>>>,
    Path(book_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = load_pdf(&state.db, &state.blobs, &book_id)
        .await
        .map_err(|e| e.into_api("Failed to load PDF"))?;
    Ok(([(header::CONTENT_TYPE, "application/pdf")], bytes))
}

/// `POST /api/conversations/{id}/messages`
pub async fn post_message<M: ChatModel + 'static>(
    State(state): State<Arc<AppState<M>>>,
    Path(conversation_id): Path<String>,
    body: Result<Json<NewMessageBody>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(body) = body?;
    append_user_message(&state.db, &conversation_id, &body.content)
        .map(|message| Json(ChatReply { message }))
        .map_err(|e| e.into_api("Failed to save message"))
}
