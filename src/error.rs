use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::db::StoreError;
use crate::doc_processor::ExtractError;
use crate::llm::LlmError;

/// Failure of a request pipeline.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Extraction(#[from] ExtractError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("blob storage error: {0}")]
    Blob(#[from] std::io::Error),
    #[error("completion failed: {0}")]
    Completion(#[from] LlmError),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Log the error and collapse it into a response body.
    ///
    /// Upstream failures are reported to the caller only as `generic`.
    pub fn into_api(self, generic: &'static str) -> ApiError {
        let status = self.status();
        let message = match &self {
            AppError::Validation(_) | AppError::NotFound(_) => {
                tracing::warn!("{generic}: {}", self);
                self.to_string()
            }
            _ => {
                tracing::error!("{generic}: {}", self);
                generic.to_string()
            }
        };
        ApiError { status, message }
    }
}

/// JSON error response: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::warn!("rejected request body: {rejection}");
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: "Invalid request body".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Validation("No file provided".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NotFound("Book").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Store(StoreError::Poisoned).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_details_are_hidden() {
        let err = AppError::Completion(LlmError::Api {
            status: 401,
            message: "invalid key sk-123".into(),
        })
        .into_api("Failed to process message");
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Failed to process message");

        let err = AppError::NotFound("Conversation").into_api("Failed to process message");
        assert_eq!(err.message, "Conversation not found");
    }
}
