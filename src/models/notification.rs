use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Number of notifications a feed loads and keeps
pub const FEED_WINDOW: usize = 20;

/// A notification produced remotely for one user. `read` is the only field
/// this service ever changes, and only from `false` to `true`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub message: String,
    pub related_movie_id: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Content of a notification about to be inserted by a producer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub owner_id: String,
    pub title: String,
    pub message: String,
    pub related_movie_id: Option<String>,
}

/// Feed order: `created_at` descending, ties by `id` descending
pub fn feed_order(a: &Notification, b: &Notification) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}
