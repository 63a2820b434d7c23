//! Remote data gateway
//!
//! Typed access to the backend that owns accounts, watchlists and
//! notifications, plus a per-owner change stream of inserted notifications.
//! Two backends exist: Postgres (production) and an in-process store with the
//! same semantics.

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::{
    error::AppResult,
    models::{NewNotification, Notification, Profile, Registration, Session, WatchlistEntry},
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryGateway;
pub use postgres::PgGateway;

/// Buffer of a single owner's change stream
pub const CHANGE_STREAM_CAPACITY: usize = 64;

/// A change pushed by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    NotificationInserted(Notification),
}

/// Live change stream scoped to one owner
///
/// The task feeding the channel is aborted when the subscription is dropped,
/// so dropping is the only teardown needed.
pub struct Subscription {
    owner_id: String,
    events: mpsc::Receiver<ChangeEvent>,
    pump: JoinHandle<()>,
}

impl Subscription {
    pub fn new(owner_id: String, events: mpsc::Receiver<ChangeEvent>, pump: JoinHandle<()>) -> Self {
        Self {
            owner_id,
            events,
            pump,
        }
    }

    /// Narrows a backend-wide feed of inserts down to one owner
    ///
    /// The receiver must be obtained before this is called for no later insert
    /// to be missed.
    pub fn filtered(owner_id: &str, mut inserts: broadcast::Receiver<Notification>) -> Self {
        let (tx, rx) = mpsc::channel(CHANGE_STREAM_CAPACITY);
        let owner = owner_id.to_string();

        let pump = tokio::spawn(async move {
            loop {
                match inserts.recv().await {
                    Ok(n) if n.owner_id == owner => {
                        if tx.send(ChangeEvent::NotificationInserted(n)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(owner_id = %owner, skipped, "Change stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self::new(owner_id.to_string(), rx, pump)
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Next event, `None` once the stream has ended
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.pump.abort();
        tracing::debug!(owner_id = %self.owner_id, "Change stream closed");
    }
}

/// Record-oriented access to the backend
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Creates an account. Fails with `EmailTaken` when the email is registered.
    async fn register(&self, registration: &Registration) -> AppResult<Session>;

    /// Verifies credentials. Fails with `InvalidCredentials` on mismatch.
    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session>;

    async fn get_profile(&self, user_id: &str) -> AppResult<Profile>;

    async fn update_profile(&self, user_id: &str, profile: &Profile) -> AppResult<Profile>;

    /// Every known account, used by notification producers
    async fn list_user_ids(&self) -> AppResult<Vec<String>>;

    /// All entries of an owner, most recently added first
    async fn select_watchlist(&self, owner_id: &str) -> AppResult<Vec<WatchlistEntry>>;

    async fn select_watchlist_entry(
        &self,
        owner_id: &str,
        movie_id: &str,
    ) -> AppResult<Option<WatchlistEntry>>;

    /// Inserts keyed on `(owner_id, movie.id)`; an existing entry is left as is
    async fn upsert_watchlist_entry(&self, entry: &WatchlistEntry) -> AppResult<()>;

    /// Deletes if present; deleting an absent entry succeeds
    async fn delete_watchlist_entry(&self, owner_id: &str, movie_id: &str) -> AppResult<()>;

    /// Most recent notifications of an owner in feed order
    async fn select_notifications(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> AppResult<Vec<Notification>>;

    /// Inserts an unread notification and publishes it on the change stream
    async fn insert_notification(&self, notification: &NewNotification) -> AppResult<Notification>;

    async fn update_notification_read(&self, owner_id: &str, id: &str) -> AppResult<()>;

    /// Marks every unread notification of an owner as read, returning how many changed
    async fn update_all_read(&self, owner_id: &str) -> AppResult<u64>;

    /// Opens a change stream of notifications inserted for `owner_id` from now on
    async fn subscribe_notifications(&self, owner_id: &str) -> AppResult<Subscription>;
}
