use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::blob::BlobStore;
use crate::db::models::{NewBook, ProcessedText};
use crate::db::Database;
use crate::doc_processor::{self, ExtractError, ExtractedPdf};
use crate::error::{ApiError, AppError, AppResult};
use crate::llm::ChatModel;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub book: UploadedBook,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct UploadedBook {
    pub id: String,
    pub title: String,
    pub pages: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Persist an extracted upload: book row, original file, conversation.
///
/// Only the book row is required. A failed blob write or `pdf_url` update
/// leaves `pdf_url` unset and a failed conversation insert leaves
/// `conversation_id` empty.
pub async fn ingest(
    db: &Database,
    blobs: &BlobStore,
    file_name: &str,
    bytes: &[u8],
    extracted: ExtractedPdf,
) -> AppResult<UploadedBook> {
    let processed = ProcessedText {
        text: extracted.text,
        pages: extracted.page_count,
        info: extracted.info,
    };
    let title = doc_processor::title_from_filename(file_name);
    let book = db.create_book(&NewBook {
        title: &title,
        processed_text: &processed,
        total_pages: extracted.page_count,
    })?;
    info!(book_id = %book.id, pages = book.total_pages, "created book from {file_name}");

    let key = format!("{}.pdf", book.id);
    match blobs.put(&key, bytes).await {
        Ok(()) => {
            if let Err(e) = db.set_book_pdf_url(&book.id, &key) {
                warn!(book_id = %book.id, "recording PDF location failed: {e}");
            }
        }
        Err(e) => warn!(book_id = %book.id, "storing original PDF failed, keeping text only: {e}"),
    }

    let conversation_id = match db.create_conversation(&book.id) {
        Ok(conversation) => Some(conversation.id),
        Err(e) => {
            warn!(book_id = %book.id, "creating conversation failed: {e}");
            None
        }
    };

    Ok(UploadedBook {
        id: book.id,
        title: book.title,
        pages: book.total_pages,
        conversation_id,
    })
}

/// The `file` part of a multipart upload as (file name, bytes).
async fn read_file_field(multipart: &mut Multipart) -> AppResult<(String, Vec<u8>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid upload: {e}")))?
    {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or("Untitled.pdf").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Invalid upload: {e}")))?;
            return Ok((file_name, bytes.to_vec()));
        }
    }
    Err(AppError::Validation("No file provided".into()))
}

async fn upload_pdf(
    db: &Database,
    blobs: &BlobStore,
    multipart: &mut Multipart,
) -> AppResult<UploadedBook> {
    let (file_name, bytes) = read_file_field(multipart).await?;

    let bytes = Arc::new(bytes);
    let parse_input = Arc::clone(&bytes);
    let extracted = tokio::task::spawn_blocking(move || doc_processor::extract_pdf(&parse_input))
        .await
        .map_err(|e| ExtractError::ExtractionFailed(format!("extraction task failed: {e}")))??;

    ingest(db, blobs, &file_name, &bytes, extracted).await
}

/// `POST /api/upload`
pub async fn upload<M: ChatModel + 'static>(
    State(state): State<Arc<AppState<M>>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    upload_pdf(&state.db, &state.blobs, &mut multipart)
        .await
        .map(|book| Json(UploadResponse { success: true, book }))
        .map_err(|e| e.into_api("Failed to process PDF"))
}
