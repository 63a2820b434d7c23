use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    models::{MovieDetails, MovieKind, SearchPage},
    routes::AppState,
    services::catalog::{self, BrowsePage},
};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: String,
    #[serde(default = "first_page")]
    page: u32,
    #[serde(default)]
    kind: Option<MovieKind>,
}

fn first_page() -> u32 {
    1
}

/// Handler for movie search
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<SearchPage>> {
    let page = state
        .metadata
        .search_filtered(&params.q, params.page, params.kind)
        .await?;
    Ok(Json(page))
}

/// Handler for a single title's details
pub async fn details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MovieDetails>> {
    state
        .metadata
        .get_details(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No movie with id {}", id)))
}

/// Handler for the home page rows
pub async fn browse(State(state): State<AppState>) -> Json<BrowsePage> {
    Json(catalog::browse(state.metadata.as_ref()).await)
}
