use axum::{extract::State, http::HeaderMap, Json};

use crate::{error::AppResult, models::Profile, routes::AppState};

pub async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Profile>> {
    let context = state.session(&headers).await?;
    Ok(Json(context.profile().await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(profile): Json<Profile>,
) -> AppResult<Json<Profile>> {
    let context = state.session(&headers).await?;
    Ok(Json(context.update_profile(profile).await?))
}
