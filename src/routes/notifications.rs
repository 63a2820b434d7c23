use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;

use crate::{error::AppResult, models::Notification, routes::AppState};

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<FeedResponse>> {
    let feed = state.session(&headers).await?.notifications()?;

    Ok(Json(FeedResponse {
        notifications: feed.notifications().await,
        unread_count: feed.unread_count().await,
    }))
}

/// Reloads the feed from the backend
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<FeedResponse>> {
    let context = state.session(&headers).await?;
    let owner = context.require_session()?;
    let feed = context.notifications()?;
    let notifications = feed.refresh(&owner.user_id).await?;

    Ok(Json(FeedResponse {
        unread_count: notifications.iter().filter(|n| !n.read).count(),
        notifications,
    }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let feed = state.session(&headers).await?.notifications()?;
    feed.mark_read(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let context = state.session(&headers).await?;
    let owner = context.require_session()?;
    context
        .notifications()?
        .mark_all_read(&owner.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Server-sent events of notifications pushed to the caller's feed
///
/// The stream ends when the session is signed out.
pub async fn stream(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let feed = state.session(&headers).await?.notifications()?;
    let updates = BroadcastStream::new(feed.updates());
    let owner_id = feed.owner_id().to_string();
    drop(feed);

    tracing::info!(owner_id = %owner_id, "Notification stream client connected");

    let events = updates.filter_map(|result| async move {
        match result {
            Ok(notification) => Event::default()
                .event("notification")
                .id(notification.id.clone())
                .json_data(&notification)
                .ok()
                .map(Ok),
            Err(e) => {
                tracing::warn!(error = ?e, "Notification stream lagged");
                None
            }
        }
    });

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    ))
}
