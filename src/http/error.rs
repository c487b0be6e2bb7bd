use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::engine::EngineError;

/// Error type for HTTP handlers. Renders as `{ "error": ..., "code": ... }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Malformed input caught before it reaches the engine.
    #[error("{0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Engine(err) => match err {
                EngineError::Conflict(existing) => {
                    let body = json!({
                        "error": message,
                        "code": "BOOKING_CONFLICT",
                        "conflictingBookingId": existing,
                    });
                    return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
                }
                EngineError::InvalidSpan { .. } => (StatusCode::BAD_REQUEST, "INVALID_INTERVAL"),
                EngineError::InvalidTransition { .. } => {
                    (StatusCode::BAD_REQUEST, "INVALID_TRANSITION")
                }
                EngineError::PartyTooLarge { .. } | EngineError::Invalid(_) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
                }
                EngineError::RoomNotFound(_) | EngineError::ReservationNotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND")
                }
                EngineError::AlreadyExists(_)
                | EngineError::DuplicateRoomNumber(_)
                | EngineError::RoomHasActiveReservations(_) => (StatusCode::CONFLICT, "CONFLICT"),
                EngineError::LimitExceeded(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "LIMIT_EXCEEDED")
                }
                EngineError::WalError(e) => {
                    tracing::error!(error = %e, "WAL failure while serving request");
                    let body = json!({
                        "error": "An internal error occurred",
                        "code": "INTERNAL_ERROR",
                    });
                    return (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response();
                }
            },
        };

        (status, axum::Json(json!({ "error": message, "code": code }))).into_response()
    }
}
