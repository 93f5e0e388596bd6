//! `/api/cards` handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

use studycards_core::study;
use studycards_shared::validators::{is_not_empty, validate_card};
use studycards_shared::{Card, CardCreate, CardUpdate, Difficulty};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub difficulty: Difficulty,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Card>>, ApiError> {
    Ok(Json(state.storage.list_cards().await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Card>, ApiError> {
    Ok(Json(state.storage.require_card(&id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CardCreate>, JsonRejection>,
) -> Result<(StatusCode, Json<Card>), ApiError> {
    let Json(dto) = payload?;
    validate_card(&dto)?;
    let card = state.storage.insert_card(&dto).await?;
    Ok((StatusCode::CREATED, Json(card)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<CardUpdate>, JsonRejection>,
) -> Result<Json<Card>, ApiError> {
    let Json(update) = payload?;
    if update.front.as_deref().is_some_and(|f| !is_not_empty(f))
        || update.back.as_deref().is_some_and(|b| !is_not_empty(b))
    {
        return Err(ApiError::BadRequest("card sides must not be empty".into()));
    }
    Ok(Json(state.storage.update_card(&id, &update).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.storage.delete_card(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<Json<Card>, ApiError> {
    let Json(req) = payload?;
    Ok(Json(study::review_card(&state.storage, &id, req.difficulty).await?))
}
