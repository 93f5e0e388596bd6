//! `/api/decks` handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use tracing::warn;

use studycards_core::study;
use studycards_shared::validators::{is_not_empty, validate_deck};
use studycards_shared::{Deck, DeckCreate, DeckStats, DeckUpdate};

use crate::error::ApiError;
use crate::middleware::AccessToken;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCardRequest {
    pub card_id: String,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Deck>>, ApiError> {
    Ok(Json(state.storage.list_decks().await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Deck>, ApiError> {
    Ok(Json(state.storage.require_deck(&id).await?))
}

pub async fn stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeckStats>, ApiError> {
    let deck = state.storage.require_deck(&id).await?;
    Ok(Json(study::deck_stats(&deck)))
}

/// Create a deck. The author is the session user when the token resolves.
pub async fn create(
    State(state): State<AppState>,
    Extension(AccessToken(token)): Extension<AccessToken>,
    payload: Result<Json<DeckCreate>, JsonRejection>,
) -> Result<(StatusCode, Json<Deck>), ApiError> {
    let Json(dto) = payload?;
    validate_deck(&dto)?;

    let author_id = match state.storage.session_user(&token).await {
        Ok(user_id) => user_id,
        Err(e) => {
            warn!(error = %e, "could not resolve deck author");
            None
        }
    };

    let deck = state.storage.insert_deck(&dto, author_id.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(deck)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<DeckUpdate>, JsonRejection>,
) -> Result<Json<Deck>, ApiError> {
    let Json(update) = payload?;
    if update.name.as_deref().is_some_and(|n| !is_not_empty(n)) {
        return Err(ApiError::BadRequest("deck name must not be empty".into()));
    }
    Ok(Json(state.storage.update_deck(&id, &update).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.storage.delete_deck(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_card(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<AddCardRequest>, JsonRejection>,
) -> Result<Json<Deck>, ApiError> {
    let Json(req) = payload?;
    Ok(Json(state.storage.add_card_to_deck(&id, &req.card_id).await?))
}

pub async fn remove_card(
    State(state): State<AppState>,
    Path((id, card_id)): Path<(String, String)>,
) -> Result<Json<Deck>, ApiError> {
    Ok(Json(state.storage.remove_card_from_deck(&id, &card_id).await?))
}
