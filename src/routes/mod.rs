use std::sync::Arc;

use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    gateway::RemoteGateway,
    middleware::{make_span_with_request_id, request_id_middleware},
    services::providers::MetadataProvider,
    sync::{SessionContext, SessionRegistry},
};

pub mod auth;
pub mod movies;
pub mod notifications;
pub mod profile;
pub mod watchlist;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn RemoteGateway>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(gateway: Arc<dyn RemoteGateway>, metadata: Arc<dyn MetadataProvider>) -> Self {
        let sessions = SessionRegistry::new(gateway.clone());
        Self::with_sessions(gateway, metadata, sessions)
    }

    pub fn with_sessions(
        gateway: Arc<dyn RemoteGateway>,
        metadata: Arc<dyn MetadataProvider>,
        sessions: SessionRegistry,
    ) -> Self {
        Self {
            gateway,
            metadata,
            sessions,
        }
    }

    /// Session of the request's bearer token, rejected locally when absent
    pub async fn session(&self, headers: &HeaderMap) -> AppResult<Arc<SessionContext>> {
        let token = bearer_token(headers)?;
        self.sessions.resolve(&token).await
    }
}

/// Parses `Authorization: Bearer <uuid>`
pub fn bearer_token(headers: &HeaderMap) -> AppResult<Uuid> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .and_then(|token| Uuid::parse_str(token.trim()).ok())
        .ok_or(AppError::Unauthenticated)
}

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        // Accounts
        .route("/auth/register", post(auth::register))
        .route("/auth/sign-in", post(auth::sign_in))
        .route("/auth/sign-out", post(auth::sign_out))
        .route("/auth/session", get(auth::current_session))
        .route("/profile", get(profile::get_profile).put(profile::update_profile))
        // Metadata
        .route("/movies/search", get(movies::search))
        .route("/movies/:id", get(movies::details))
        .route("/browse", get(movies::browse))
        // Watchlist
        .route("/watchlist", get(watchlist::list))
        .route("/watchlist/toggle", post(watchlist::toggle))
        .route("/watchlist/refresh", post(watchlist::refresh))
        .route(
            "/watchlist/:movie_id",
            put(watchlist::add)
                .get(watchlist::contains)
                .delete(watchlist::remove),
        )
        // Notifications
        .route("/notifications", get(notifications::list))
        .route("/notifications/stream", get(notifications::stream))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/refresh", post(notifications::refresh))
        .route("/notifications/:id/read", post(notifications::mark_read))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
