//! HTTP error mapping.
//!
//! Every failure leaves the API as `{"error": "<message>"}` with a status
//! code derived from the [`StudyCardsError`] variant.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use studycards_shared::StudyCardsError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    RateLimited { retry_after: u64 },
    /// Details are logged, never sent to the client.
    Internal(String),
}

impl ApiError {
    pub fn token_required() -> Self {
        Self::Unauthorized("Access token required".into())
    }

    pub fn unauthorized() -> Self {
        Self::Unauthorized("Unauthorized".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests, please try again later".to_string(),
            ),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let mut response = (status, Json(ErrorBody { error: message })).into_response();
        if let ApiError::RateLimited { retry_after } = &self {
            if let Ok(val) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, val);
            }
        }
        response
    }
}

impl From<StudyCardsError> for ApiError {
    fn from(err: StudyCardsError) -> Self {
        match err {
            StudyCardsError::NotFound { entity, .. } => {
                ApiError::NotFound(format!("{} not found", capitalize(entity)))
            }
            StudyCardsError::Validation { message } => ApiError::BadRequest(message),
            StudyCardsError::Conflict(message) => ApiError::BadRequest(message),
            StudyCardsError::Unauthorized(message) => ApiError::Unauthorized(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
