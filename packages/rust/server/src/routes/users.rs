//! `/api/auth` and `/api/users` handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use studycards_core::{LoginResponse, auth, study};
use studycards_shared::validators::{is_email, is_username};
use studycards_shared::{LoginRequest, User, UserCreate, UserProgress, UserUpdate};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<UserCreate>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(dto) = payload?;
    let user = auth::register(&state.storage, &dto).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(req) = payload?;
    Ok(Json(auth::login(&state.storage, &req).await?))
}

/// A user with their authored decks.
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let mut user = state.storage.require_user(&id).await?;
    user.decks = state.storage.list_decks_by_author(&id).await?;
    Ok(Json(user))
}

pub async fn progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserProgress>, ApiError> {
    Ok(Json(study::user_progress(&state.storage, &id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UserUpdate>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let Json(update) = payload?;
    if update.email.as_deref().is_some_and(|e| !is_email(e)) {
        return Err(ApiError::BadRequest("invalid email address".into()));
    }
    if update.username.as_deref().is_some_and(|u| !is_username(u)) {
        return Err(ApiError::BadRequest(
            "username must be 3-20 letters, digits or underscores".into(),
        ));
    }

    let mut user = state.storage.update_user(&id, update).await?;
    user.decks = state.storage.list_decks_by_author(&id).await?;
    Ok(Json(user))
}
