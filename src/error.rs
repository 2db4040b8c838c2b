use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::ports::StoreError;
use crate::push::ScheduleError;
use crate::types::push::NotificationId;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no active signing keypair; generate or import keys first")]
    MissingSigningKey,

    #[error("notification {0} not found")]
    NotificationNotFound(NotificationId),

    #[error("{0}")]
    InvalidInput(String),

    #[error("failed to generate signing keypair: {0}")]
    KeyGeneration(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::MissingSigningKey => StatusCode::PRECONDITION_FAILED,
            EngineError::NotificationNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            EngineError::KeyGeneration(_) | EngineError::Store(_) | EngineError::Schedule(_) => {
                tracing::error!(error = %self, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
