use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::models::{Message, Role};
use crate::db::Database;
use crate::error::{ApiError, AppError, AppResult};
use crate::llm::{complete, ChatMessage, ChatModel, Completion, CHAT_MAX_TOKENS};
use crate::prompts::{chat_system_prompt, CHAT_FALLBACK, NO_CONTEXT};
use crate::server::AppState;

/// Stored messages replayed to the model on each turn.
pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    pub conversation_id: String,
    pub message: String,
    #[serde(default)]
    pub book_context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub message: Message,
}

/// Generate and store the assistant's reply to `request.message`.
///
/// Only the reply is written. The client stores its own turn beforehand
/// through the message endpoint, so that turn is usually also the newest
/// history entry.
pub async fn reply<M: ChatModel>(
    db: &Database,
    llm: &M,
    request: &ChatBody,
) -> AppResult<Message> {
    let (conversation, book) = db
        .get_conversation_with_book(&request.conversation_id)?
        .ok_or(AppError::NotFound("Conversation"))?;

    let mut recent = db.recent_messages(&conversation.id, HISTORY_LIMIT)?;
    recent.reverse();
    let history: Vec<ChatMessage> = recent.iter().map(ChatMessage::from).collect();

    let context = request
        .book_context
        .as_deref()
        .filter(|c| !c.is_empty())
        .unwrap_or(NO_CONTEXT);
    let system_prompt = chat_system_prompt(&book.title, context);

    debug!(conversation_id = %conversation.id, history = history.len(), "chat turn");
    let text = complete(
        llm,
        Completion {
            system_prompt: &system_prompt,
            history: &history,
            user_turn: Some(request.message.as_str()),
            max_tokens: CHAT_MAX_TOKENS,
            fallback: CHAT_FALLBACK,
        },
    )
    .await?;

    Ok(db.add_message(&conversation.id, Role::Assistant, &text)?)
}

/// `POST /api/chat`
pub async fn chat<M: ChatModel + 'static>(
    State(state): State<Arc<AppState<M>>>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(body) = body?;
    reply(&state.db, &state.llm, &body)
        .await
        .map(|message| Json(ChatReply { message }))
        .map_err(|e| e.into_api("Failed to process message"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::seed_book;
    use crate::llm::testing::RecordingModel;

    fn body(conversation_id: &str, message: &str, context: Option<&str>) -> ChatBody {
        ChatBody {
            conversation_id: conversation_id.to_string(),
            message: message.to_string(),
            book_context: context.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_empty_conversation_sends_no_history() {
        let db = Database::open_in_memory().unwrap();
        let book = seed_book(&db, "text", 1);
        let conv = db.create_conversation(&book.id).unwrap();
        let llm = RecordingModel::replying("Hello reader");

        let msg = reply(&db, &llm, &body(&conv.id, "What is this?", Some("Chapter one")))
            .await
            .unwrap();

        assert_eq!(llm.calls(), 1);
        let request = llm.last_request();
        assert_eq!(request.max_tokens, 500);
        assert_eq!(request.messages.len(), 2);
        assert!(request.messages[0].content.contains("discussing \"Sample\""));
        assert!(request.messages[0].content.contains("Current context: Chapter one"));
        assert_eq!(request.messages[1], ChatMessage::user("What is this?"));

        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "Hello reader");
        assert_eq!(db.list_messages(&conv.id).unwrap(), vec![msg]);
    }

    #[tokio::test]
    async fn test_history_is_last_ten_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        let book = seed_book(&db, "text", 1);
        let conv = db.create_conversation(&book.id).unwrap();
        for i in 0..25 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            db.add_message(&conv.id, role, &format!("m{i}")).unwrap();
        }
        let llm = RecordingModel::replying("ok");

        reply(&db, &llm, &body(&conv.id, "next", None)).await.unwrap();

        let request = llm.last_request();
        let history: Vec<&str> = request.messages[1..request.messages.len() - 1]
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(
            history,
            ["m15", "m16", "m17", "m18", "m19", "m20", "m21", "m22", "m23", "m24"]
        );
        assert_eq!(request.messages[1].role, "assistant");
        assert!(request.messages[0].content.contains("No context available"));
    }

    #[tokio::test]
    async fn test_only_assistant_turn_is_stored() {
        let db = Database::open_in_memory().unwrap();
        let book = seed_book(&db, "text", 1);
        let conv = db.create_conversation(&book.id).unwrap();
        let llm = RecordingModel::default();

        let msg = reply(&db, &llm, &body(&conv.id, "hi", Some(""))).await.unwrap();

        assert_eq!(msg.content, CHAT_FALLBACK);
        let stored = db.list_messages(&conv.id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_unknown_conversation() {
        let db = Database::open_in_memory().unwrap();
        let llm = RecordingModel::replying("unused");

        let err = reply(&db, &llm, &body("missing", "hi", None)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("Conversation")));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_upstream_failure_writes_nothing() {
        let db = Database::open_in_memory().unwrap();
        let book = seed_book(&db, "text", 1);
        let conv = db.create_conversation(&book.id).unwrap();
        let llm = RecordingModel::failing();

        let err = reply(&db, &llm, &body(&conv.id, "hi", None)).await.unwrap_err();
        assert!(matches!(err, AppError::Completion(_)));
        assert!(db.list_messages(&conv.id).unwrap().is_empty());
    }
}
