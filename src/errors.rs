use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("duplicate credential")]
    DuplicateCredential,

    #[error("no credentials available")]
    NoCredentials,

    #[error("credential not found")]
    NotFound,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("upstream error: {0}")]
    Transport(String),

    #[error("bad input: {0}")]
    BadInput(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            AppError::DuplicateCredential => (StatusCode::CONFLICT, self.to_string()),
            AppError::NoCredentials => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            // RefreshFailed is swallowed inside the scheduler loop; it only
            // reaches a response boundary via the admin surface.
            AppError::RefreshFailed(e) | AppError::Transport(e) => {
                (StatusCode::BAD_GATEWAY, e.clone())
            }
            AppError::BadInput(e) => (StatusCode::BAD_REQUEST, e.clone()),
            AppError::Database(e) => {
                tracing::error!("database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".into())
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".into())
            }
        };

        let body = Json(json!({ "error": msg }));
        (status, body).into_response()
    }
}
