//! `/api/pia` handlers.
//!
//! Unlike the CRUD routes these need a user, so the bearer token has to be
//! a session token issued by login.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::{Extension, Json};

use studycards_core::{AssistantRequest, AssistantResponse, SilentProgress};
use studycards_shared::StudyCardsError;

use crate::error::ApiError;
use crate::middleware::AccessToken;
use crate::state::AppState;

pub async fn ask(
    State(state): State<AppState>,
    Extension(AccessToken(token)): Extension<AccessToken>,
    payload: Result<Json<AssistantRequest>, JsonRejection>,
) -> Result<Json<AssistantResponse>, ApiError> {
    let user_id = state.session_user(&token).await?;
    let Json(request) = payload?;

    let response = state
        .assistant
        .ask(&user_id, &request, &SilentProgress)
        .await
        .map_err(assistant_error)?;
    Ok(Json(response))
}

/// The whole request body is the suggestion context.
pub async fn suggestions(
    State(state): State<AppState>,
    Extension(AccessToken(token)): Extension<AccessToken>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<Vec<String>>, ApiError> {
    let user_id = state.session_user(&token).await?;
    let Json(context) = payload?;

    let suggestions = state
        .assistant
        .suggest(&user_id, &context)
        .await
        .map_err(assistant_error)?;
    Ok(Json(suggestions))
}

pub async fn related_cards(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.assistant.related_cards(&id).await?))
}

/// Anything but an unknown user is an internal error for the client.
fn assistant_error(err: StudyCardsError) -> ApiError {
    match err {
        StudyCardsError::Unauthorized(_) => ApiError::unauthorized(),
        other => ApiError::Internal(other.to_string()),
    }
}
