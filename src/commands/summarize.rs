use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::models::{Message, Role, Summary};
use crate::db::Database;
use crate::doc_processor::{page_chunk, truncate_chars, SUMMARY_INPUT_CHARS};
use crate::error::{ApiError, AppError, AppResult};
use crate::llm::{complete, ChatModel, Completion, SUMMARY_MAX_TOKENS};
use crate::prompts::{summary_message, summary_request, SUMMARY_FALLBACK, SUMMARY_SYSTEM_PROMPT};
use crate::server::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeBody {
    pub book_id: String,
    pub page_start: i64,
    pub page_end: i64,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SummarizeResponse {
    pub summary: Summary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

/// Summarize a page range, reusing a stored summary for the same range.
///
/// Two concurrent misses for one range both call the model; the store
/// keeps whichever row lands first.
pub async fn summarize_pages<M: ChatModel>(
    db: &Database,
    llm: &M,
    request: &SummarizeBody,
) -> AppResult<SummarizeResponse> {
    let (start, end) = (request.page_start, request.page_end);

    let summary = match db.get_summary(&request.book_id, start, end)? {
        Some(cached) => {
            debug!(book_id = %request.book_id, start, end, "summary cache hit");
            cached
        }
        None => {
            let book = db
                .get_book(&request.book_id)?
                .ok_or(AppError::NotFound("Book"))?;

            let chunk = page_chunk(&book.processed_text.text, book.total_pages, start, end);
            let chunk = truncate_chars(chunk, SUMMARY_INPUT_CHARS);
            let user_turn = summary_request(start, end, chunk);

            let content = complete(
                llm,
                Completion {
                    system_prompt: SUMMARY_SYSTEM_PROMPT,
                    history: &[],
                    user_turn: Some(user_turn.as_str()),
                    max_tokens: SUMMARY_MAX_TOKENS,
                    fallback: SUMMARY_FALLBACK,
                },
            )
            .await?;

            let summary = db.create_summary(&book.id, start, end, &content)?;
            info!(book_id = %book.id, start, end, "stored new summary");
            summary
        }
    };

    let conversation_id = request
        .conversation_id
        .as_deref()
        .filter(|id| !id.is_empty());
    let message = match conversation_id {
        Some(conversation_id) => Some(db.add_message(
            conversation_id,
            Role::Assistant,
            &summary_message(start, end, &summary.content),
        )?),
        None => None,
    };

    Ok(SummarizeResponse { summary, message })
}

/// `POST /api/summarize`
pub async fn summarize<M: ChatModel + 'static>(
    State(state): State<Arc<AppState<M>>>,
    body: Result<Json<SummarizeBody>, JsonRejection>,
) -> Result<Json<SummarizeResponse>, ApiError> {
    let Json(body) = body?;
    summarize_pages(&state.db, &state.llm, &body)
        .await
        .map(Json)
        .map_err(|e| e.into_api("Failed to generate summary"))
}
