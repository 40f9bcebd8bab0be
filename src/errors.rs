use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Standard error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upstream provider failed after the full retry schedule.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A derived step found no rows for its input layer.
    #[error("Prerequisite missing: {0}")]
    PrerequisiteMissing(String),

    /// A conflicting write to the same (spot, layer) is in flight.
    #[error("Store busy: {0}")]
    StoreBusy(String),

    /// Store invariants cannot be satisfied. Fatal to the current request.
    #[error("Store corrupt: {0}")]
    StoreCorrupt(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::ProviderUnavailable(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::PrerequisiteMissing(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::StoreBusy(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::StoreCorrupt(msg) => {
                tracing::error!("Store corruption: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal database error".to_string(),
                )
            }
        };

        (status, axum::Json(ErrorResponse { error: message })).into_response()
    }
}
