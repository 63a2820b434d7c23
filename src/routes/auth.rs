use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Credentials, Registration, Session},
    routes::{bearer_token, AppState},
};

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub token: Uuid,
    pub session: Session,
}

/// Handler for account registration
pub async fn register(
    State(state): State<AppState>,
    Json(registration): Json<Registration>,
) -> AppResult<(StatusCode, Json<Session>)> {
    registration.validate().map_err(AppError::InvalidInput)?;

    let session = state.gateway.register(&registration).await?;
    tracing::info!(user_id = %session.user_id, "Registered");

    Ok((StatusCode::CREATED, Json(session)))
}

/// Handler for sign-in; the returned token authorizes every user-scoped call
pub async fn sign_in(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> AppResult<Json<SignInResponse>> {
    let (token, session) = state
        .sessions
        .sign_in(&credentials.email, &credentials.password)
        .await?;

    Ok(Json(SignInResponse { token, session }))
}

/// Handler for sign-out. Succeeds without a valid token.
pub async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    if let Ok(token) = bearer_token(&headers) {
        state.sessions.sign_out(&token).await;
    }
    StatusCode::NO_CONTENT
}

/// Handler returning the caller's session
pub async fn current_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Session>> {
    let context = state.session(&headers).await?;
    Ok(Json(context.require_session()?))
}
