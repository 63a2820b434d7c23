use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MovieReference;

/// A movie on a user's watchlist. At most one entry exists per `(owner_id, movie.id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchlistEntry {
    pub owner_id: String,
    pub movie: MovieReference,
    pub added_at: DateTime<Utc>,
}

impl WatchlistEntry {
    pub fn new(owner_id: impl Into<String>, movie: MovieReference) -> Self {
        Self {
            owner_id: owner_id.into(),
            movie,
            added_at: Utc::now(),
        }
    }
}

/// Most recently added first; ties by movie id descending
pub fn sort_entries(entries: &mut [WatchlistEntry]) {
    entries.sort_by(|a, b| {
        b.added_at
            .cmp(&a.added_at)
            .then_with(|| b.movie.id.cmp(&a.movie.id))
    });
}
