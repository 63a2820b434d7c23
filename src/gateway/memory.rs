use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{RemoteGateway, Subscription};
use crate::{
    error::{AppError, AppResult},
    models::{
        feed_order, sort_entries, NewNotification, Notification, Profile, Registration, Session,
        WatchlistEntry,
    },
};

struct StoredUser {
    email: String,
    password: String,
    profile: Profile,
}

impl StoredUser {
    fn session(&self, user_id: &str) -> Session {
        Session {
            user_id: user_id.to_string(),
            email: self.email.clone(),
            display_name: self.profile.display_name.clone(),
            avatar_url: self.profile.avatar_url.clone(),
        }
    }
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, StoredUser>,
    watchlist: HashMap<(String, String), WatchlistEntry>,
    notifications: HashMap<String, Notification>,
}

/// In-process backend for development and tests
///
/// Holds everything in memory, credentials included, and loses it on restart.
pub struct InMemoryGateway {
    state: RwLock<MemoryState>,
    inserts: broadcast::Sender<Notification>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        let (inserts, _) = broadcast::channel(256);
        Self {
            state: RwLock::new(MemoryState::default()),
            inserts,
        }
    }
}

#[async_trait::async_trait]
impl RemoteGateway for InMemoryGateway {
    async fn register(&self, registration: &Registration) -> AppResult<Session> {
        let mut state = self.state.write().await;
        let email = registration.email.trim().to_lowercase();

        if state.users.values().any(|u| u.email == email) {
            return Err(AppError::EmailTaken);
        }

        let user_id = Uuid::new_v4().to_string();
        let user = StoredUser {
            email,
            password: registration.password.clone(),
            profile: Profile {
                display_name: registration.display_name.clone(),
                ..Profile::default()
            },
        };
        let session = user.session(&user_id);
        state.users.insert(user_id, user);

        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session> {
        let state = self.state.read().await;
        let email = email.trim().to_lowercase();

        state
            .users
            .iter()
            .find(|(_, u)| u.email == email && u.password == password)
            .map(|(id, u)| u.session(id))
            .ok_or(AppError::InvalidCredentials)
    }

    async fn get_profile(&self, user_id: &str) -> AppResult<Profile> {
        let state = self.state.read().await;
        state
            .users
            .get(user_id)
            .map(|u| u.profile.clone())
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }

    async fn update_profile(&self, user_id: &str, profile: &Profile) -> AppResult<Profile> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))?;
        user.profile = profile.clone();
        Ok(user.profile.clone())
    }

    async fn list_user_ids(&self) -> AppResult<Vec<String>> {
        let state = self.state.read().await;
        Ok(state.users.keys().cloned().collect())
    }

    async fn select_watchlist(&self, owner_id: &str) -> AppResult<Vec<WatchlistEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<_> = state
            .watchlist
            .values()
            .filter(|e| e.owner_id == owner_id)
            .cloned()
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn select_watchlist_entry(
        &self,
        owner_id: &str,
        movie_id: &str,
    ) -> AppResult<Option<WatchlistEntry>> {
        let state = self.state.read().await;
        Ok(state
            .watchlist
            .get(&(owner_id.to_string(), movie_id.to_string()))
            .cloned())
    }

    async fn upsert_watchlist_entry(&self, entry: &WatchlistEntry) -> AppResult<()> {
        let mut state = self.state.write().await;
        state
            .watchlist
            .entry((entry.owner_id.clone(), entry.movie.id.clone()))
            .or_insert_with(|| entry.clone());
        Ok(())
    }

    async fn delete_watchlist_entry(&self, owner_id: &str, movie_id: &str) -> AppResult<()> {
        let mut state = self.state.write().await;
        state
            .watchlist
            .remove(&(owner_id.to_string(), movie_id.to_string()));
        Ok(())
    }

    async fn select_notifications(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> AppResult<Vec<Notification>> {
        let state = self.state.read().await;
        let mut items: Vec<_> = state
            .notifications
            .values()
            .filter(|n| n.owner_id == owner_id)
            .cloned()
            .collect();
        items.sort_by(feed_order);
        items.truncate(limit);
        Ok(items)
    }

    async fn insert_notification(&self, notification: &NewNotification) -> AppResult<Notification> {
        let inserted = Notification {
            id: Uuid::new_v4().to_string(),
            owner_id: notification.owner_id.clone(),
            title: notification.title.clone(),
            message: notification.message.clone(),
            related_movie_id: notification.related_movie_id.clone(),
            read: false,
            created_at: Utc::now(),
        };

        {
            let mut state = self.state.write().await;
            state
                .notifications
                .insert(inserted.id.clone(), inserted.clone());
        }

        // No live subscribers is not an error
        let _ = self.inserts.send(inserted.clone());

        Ok(inserted)
    }

    async fn update_notification_read(&self, owner_id: &str, id: &str) -> AppResult<()> {
        let mut state = self.state.write().await;
        if let Some(n) = state.notifications.get_mut(id) {
            if n.owner_id == owner_id {
                n.read = true;
            }
        }
        Ok(())
    }

    async fn update_all_read(&self, owner_id: &str) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for n in state
            .notifications
            .values_mut()
            .filter(|n| n.owner_id == owner_id && !n.read)
        {
            n.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn subscribe_notifications(&self, owner_id: &str) -> AppResult<Subscription> {
        // Registered before returning so no insert after this call is missed
        let subscription = Subscription::filtered(owner_id, self.inserts.subscribe());
        tracing::debug!(owner_id = %owner_id, "In-memory change stream opened");
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ChangeEvent;
    use crate::models::{MovieKind, MovieReference};

    fn registration(email: &str) -> Registration {
        Registration {
            display_name: "Ada".to_string(),
            email: email.to_string(),
            password: "secret1".to_string(),
        }
    }

    fn movie(id: &str) -> MovieReference {
        MovieReference {
            id: id.to_string(),
            title: "Title".to_string(),
            year: "1994".to_string(),
            poster_url: "N/A".to_string(),
            kind: MovieKind::Movie,
        }
    }

    fn new_notification(owner: &str) -> NewNotification {
        NewNotification {
            owner_id: owner.to_string(),
            title: "New".to_string(),
            message: "msg".to_string(),
            related_movie_id: None,
        }
    }

    #[tokio::test]
    async fn test_register_then_sign_in() {
        let gateway = InMemoryGateway::new();
        let registered = gateway.register(&registration("ada@example.com")).await.unwrap();

        let session = gateway.sign_in("ADA@example.com", "secret1").await.unwrap();
        assert_eq!(session.user_id, registered.user_id);
        assert_eq!(session.display_name, "Ada");
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let gateway = InMemoryGateway::new();
        gateway.register(&registration("ada@example.com")).await.unwrap();

        let result = gateway.register(&registration("ada@example.com")).await;
        assert!(matches!(result, Err(AppError::EmailTaken)));
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let gateway = InMemoryGateway::new();
        gateway.register(&registration("ada@example.com")).await.unwrap();

        let result = gateway.sign_in("ada@example.com", "wrong").await;
        assert!(matches!(result, Err(AppError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_upsert_keeps_first_entry() {
        let gateway = InMemoryGateway::new();
        let first = WatchlistEntry::new("u1", movie("tt0111161"));
        let mut second = first.clone();
        second.added_at = first.added_at + chrono::Duration::seconds(10);

        gateway.upsert_watchlist_entry(&first).await.unwrap();
        gateway.upsert_watchlist_entry(&second).await.unwrap();

        let entries = gateway.select_watchlist("u1").await.unwrap();
        assert_eq!(entries, vec![first]);
    }

    #[tokio::test]
    async fn test_change_stream_filters_by_owner() {
        let gateway = InMemoryGateway::new();
        let mut subscription = gateway.subscribe_notifications("u1").await.unwrap();

        gateway.insert_notification(&new_notification("u2")).await.unwrap();
        let mine = gateway.insert_notification(&new_notification("u1")).await.unwrap();

        let event = subscription.recv().await.unwrap();
        assert_eq!(event, ChangeEvent::NotificationInserted(mine));
    }

    #[tokio::test]
    async fn test_update_all_read_counts_only_unread() {
        let gateway = InMemoryGateway::new();
        let first = gateway.insert_notification(&new_notification("u1")).await.unwrap();
        gateway.insert_notification(&new_notification("u1")).await.unwrap();
        gateway.insert_notification(&new_notification("u2")).await.unwrap();

        gateway.update_notification_read("u1", &first.id).await.unwrap();
        assert_eq!(gateway.update_all_read("u1").await.unwrap(), 1);

        let items = gateway.select_notifications("u1", 20).await.unwrap();
        assert!(items.iter().all(|n| n.read));
        let others = gateway.select_notifications("u2", 20).await.unwrap();
        assert!(others.iter().all(|n| !n.read));
    }
}
