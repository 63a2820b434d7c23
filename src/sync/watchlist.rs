use std::sync::Arc;

use tokio::sync::RwLock;

use super::projection::{Toggle, WatchlistEvent, WatchlistProjection};
use crate::{
    error::{AppError, AppResult},
    gateway::RemoteGateway,
    models::{MovieReference, WatchlistEntry},
};

/// Watchlist of the signed-in user, cached locally and backed by the gateway
///
/// Mutations update the cache before the remote call and are not rolled back
/// when it fails; `load` re-synchronizes from the backend.
pub struct WatchlistStore {
    owner_id: String,
    gateway: Arc<dyn RemoteGateway>,
    projection: RwLock<WatchlistProjection>,
}

impl WatchlistStore {
    pub fn new(owner_id: impl Into<String>, gateway: Arc<dyn RemoteGateway>) -> Self {
        Self {
            owner_id: owner_id.into(),
            gateway,
            projection: RwLock::new(WatchlistProjection::default()),
        }
    }

    /// Rejects identifiers other than the session's without a network call
    fn authorize(&self, owner_id: &str) -> AppResult<()> {
        if owner_id == self.owner_id {
            Ok(())
        } else {
            Err(AppError::Unauthenticated)
        }
    }

    async fn apply(&self, event: WatchlistEvent) {
        let mut projection = self.projection.write().await;
        let current = std::mem::take(&mut *projection);
        *projection = current.apply(event);
    }

    /// Replaces the cache with the backend's current entries
    pub async fn load(&self) -> AppResult<Vec<WatchlistEntry>> {
        let entries = self.gateway.select_watchlist(&self.owner_id).await?;
        tracing::debug!(owner_id = %self.owner_id, entries = entries.len(), "Watchlist loaded");
        self.apply(WatchlistEvent::Loaded(entries)).await;
        Ok(self.projection.read().await.entries().to_vec())
    }

    /// Reloads from the backend, discarding optimistic changes it never accepted
    pub async fn refresh(&self, owner_id: &str) -> AppResult<Vec<WatchlistEntry>> {
        self.authorize(owner_id)?;
        self.load().await
    }

    /// Answers from the cache once loaded, otherwise asks the backend
    pub async fn contains(&self, owner_id: &str, movie_id: &str) -> AppResult<bool> {
        self.authorize(owner_id)?;

        if let Some(present) = self.projection.read().await.contains(movie_id) {
            return Ok(present);
        }

        Ok(self
            .gateway
            .select_watchlist_entry(owner_id, movie_id)
            .await?
            .is_some())
    }

    /// Adds a movie. Adding one that is already present succeeds.
    pub async fn add(&self, owner_id: &str, movie: MovieReference) -> AppResult<()> {
        self.authorize(owner_id)?;

        let entry = WatchlistEntry::new(owner_id, movie);
        self.apply(WatchlistEvent::Toggled(Toggle::Added(entry.clone())))
            .await;

        self.gateway
            .upsert_watchlist_entry(&entry)
            .await
            .inspect_err(|e| {
                tracing::warn!(owner_id, movie_id = %entry.movie.id, error = %e, "Watchlist add failed");
            })?;

        tracing::info!(owner_id, movie_id = %entry.movie.id, "Added to watchlist");
        Ok(())
    }

    /// Removes a movie. Removing one that is absent succeeds.
    pub async fn remove(&self, owner_id: &str, movie_id: &str) -> AppResult<()> {
        self.authorize(owner_id)?;

        self.apply(WatchlistEvent::Toggled(Toggle::Removed(movie_id.to_string())))
            .await;

        self.gateway
            .delete_watchlist_entry(owner_id, movie_id)
            .await
            .inspect_err(|e| {
                tracing::warn!(owner_id, movie_id, error = %e, "Watchlist remove failed");
            })?;

        tracing::info!(owner_id, movie_id, "Removed from watchlist");
        Ok(())
    }

    /// Adds the movie when absent, removes it when present. Returns the new membership.
    pub async fn toggle(&self, owner_id: &str, movie: MovieReference) -> AppResult<bool> {
        if self.contains(owner_id, &movie.id).await? {
            self.remove(owner_id, &movie.id).await?;
            Ok(false)
        } else {
            self.add(owner_id, movie).await?;
            Ok(true)
        }
    }

    /// Entries, most recently added first
    pub async fn list(&self, owner_id: &str) -> AppResult<Vec<WatchlistEntry>> {
        self.authorize(owner_id)?;

        {
            let projection = self.projection.read().await;
            if projection.is_loaded() {
                return Ok(projection.entries().to_vec());
            }
        }

        self.load().await
    }
}
