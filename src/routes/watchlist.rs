use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::{MovieReference, WatchlistEntry},
    routes::AppState,
};

#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub movie_id: String,
    pub in_watchlist: bool,
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<WatchlistEntry>>> {
    let context = state.session(&headers).await?;
    let owner = context.require_session()?;
    Ok(Json(context.watchlist()?.list(&owner.user_id).await?))
}

pub async fn contains(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(movie_id): Path<String>,
) -> AppResult<Json<MembershipResponse>> {
    let context = state.session(&headers).await?;
    let owner = context.require_session()?;
    let in_watchlist = context
        .watchlist()?
        .contains(&owner.user_id, &movie_id)
        .await?;

    Ok(Json(MembershipResponse {
        movie_id,
        in_watchlist,
    }))
}

/// Reloads the watchlist from the backend
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<WatchlistEntry>>> {
    let context = state.session(&headers).await?;
    let owner = context.require_session()?;
    Ok(Json(context.watchlist()?.refresh(&owner.user_id).await?))
}

/// Idempotent: adding a listed movie again is a 204 too
pub async fn add(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(movie_id): Path<String>,
    Json(movie): Json<MovieReference>,
) -> AppResult<StatusCode> {
    let context = state.session(&headers).await?;
    let owner = context.require_session()?;

    if movie.id != movie_id {
        return Err(AppError::InvalidInput(format!(
            "Body describes {} but path names {}",
            movie.id, movie_id
        )));
    }

    context.watchlist()?.add(&owner.user_id, movie).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Idempotent: removing an absent movie is a 204 too
pub async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(movie_id): Path<String>,
) -> AppResult<StatusCode> {
    let context = state.session(&headers).await?;
    let owner = context.require_session()?;
    context.watchlist()?.remove(&owner.user_id, &movie_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(movie): Json<MovieReference>,
) -> AppResult<Json<MembershipResponse>> {
    let context = state.session(&headers).await?;
    let owner = context.require_session()?;
    let movie_id = movie.id.clone();
    let in_watchlist = context.watchlist()?.toggle(&owner.user_id, movie).await?;

    Ok(Json(MembershipResponse {
        movie_id,
        in_watchlist,
    }))
}
