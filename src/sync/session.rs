use std::sync::{Arc, Mutex, MutexGuard};

use super::{FeedSubscription, NotificationFeed, WatchlistStore};
use crate::{
    error::{AppError, AppResult},
    gateway::RemoteGateway,
    models::{Profile, Session},
};

/// Everything that exists only while a user is signed in
struct ActiveSession {
    session: Session,
    watchlist: Arc<WatchlistStore>,
    notifications: Arc<NotificationFeed>,
    // Dropped with the session, which releases the change stream
    _subscription: FeedSubscription,
}

impl ActiveSession {
    /// Loads the user's state and opens the notification stream
    async fn establish(gateway: Arc<dyn RemoteGateway>, session: Session) -> AppResult<Self> {
        let owner_id = session.user_id.clone();
        let watchlist = Arc::new(WatchlistStore::new(&owner_id, gateway.clone()));
        let notifications = Arc::new(NotificationFeed::new(&owner_id, gateway));

        watchlist.load().await?;
        notifications.load(&owner_id).await?;
        let subscription = notifications.subscribe(&owner_id).await?;

        Ok(Self {
            session,
            watchlist,
            notifications,
            _subscription: subscription,
        })
    }
}

/// Identity of one signed-in client and owner of its per-user state
///
/// Signing out, or signing in again, drops the watchlist store, the feed and
/// the change stream bound to the previous identity before anything else.
pub struct SessionContext {
    gateway: Arc<dyn RemoteGateway>,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionContext {
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        Self {
            gateway,
            active: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        // Critical sections never panic midway; a poisoned lock still holds valid state
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Verifies credentials with the backend and activates the session.
    /// On failure the current state is left untouched.
    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session> {
        let session = self.gateway.sign_in(email, password).await?;
        let established = ActiveSession::establish(self.gateway.clone(), session.clone()).await?;

        let previous = self.lock().replace(established);
        if let Some(previous) = previous {
            tracing::info!(user_id = %previous.session.user_id, "Replacing active session");
        }

        tracing::info!(user_id = %session.user_id, "Signed in");
        Ok(session)
    }

    /// Releases every subscription of the current session, then forgets it.
    /// Does nothing when signed out.
    pub fn sign_out(&self) {
        let previous = self.lock().take();
        if let Some(active) = previous {
            let user_id = active.session.user_id.clone();
            drop(active);
            tracing::info!(user_id = %user_id, "Signed out");
        }
    }

    pub fn current_session(&self) -> Option<Session> {
        self.lock().as_ref().map(|a| a.session.clone())
    }

    pub fn require_session(&self) -> AppResult<Session> {
        self.current_session().ok_or(AppError::Unauthenticated)
    }

    pub fn watchlist(&self) -> AppResult<Arc<WatchlistStore>> {
        self.lock()
            .as_ref()
            .map(|a| a.watchlist.clone())
            .ok_or(AppError::Unauthenticated)
    }

    pub fn notifications(&self) -> AppResult<Arc<NotificationFeed>> {
        self.lock()
            .as_ref()
            .map(|a| a.notifications.clone())
            .ok_or(AppError::Unauthenticated)
    }

    /// Reads the signed-in user's profile
    pub async fn profile(&self) -> AppResult<Profile> {
        let session = self.require_session()?;
        self.gateway.get_profile(&session.user_id).await
    }

    /// Saves the profile and carries name and avatar over to the live session
    pub async fn update_profile(&self, profile: Profile) -> AppResult<Profile> {
        let session = self.require_session()?;
        if profile.display_name.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Display name cannot be empty".to_string(),
            ));
        }

        let saved = self
            .gateway
            .update_profile(&session.user_id, &profile)
            .await?;

        if let Some(active) = self.lock().as_mut() {
            if active.session.user_id == session.user_id {
                active.session.display_name = saved.display_name.clone();
                active.session.avatar_url = saved.avatar_url.clone();
            }
        }

        Ok(saved)
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.sign_out();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{InMemoryGateway, MockRemoteGateway};
    use crate::models::{MovieKind, MovieReference, NewNotification, Registration};
    use std::time::Duration;

    async fn registered_gateway() -> (Arc<InMemoryGateway>, Session) {
        let gateway = Arc::new(InMemoryGateway::new());
        let session = gateway
            .register(&Registration {
                display_name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                password: "secret1".to_string(),
            })
            .await
            .unwrap();
        (gateway, session)
    }

    #[tokio::test]
    async fn test_sign_in_establishes_state() {
        let (gateway, registered) = registered_gateway().await;
        let context = SessionContext::new(gateway);

        let session = context.sign_in("ada@example.com", "secret1").await.unwrap();

        assert_eq!(session.user_id, registered.user_id);
        assert_eq!(context.current_session(), Some(session.clone()));

        let watchlist = context.watchlist().unwrap();
        watchlist
            .add(
                &session.user_id,
                MovieReference {
                    id: "tt0111161".to_string(),
                    title: "The Shawshank Redemption".to_string(),
                    year: "1994".to_string(),
                    poster_url: "N/A".to_string(),
                    kind: MovieKind::Movie,
                },
            )
            .await
            .unwrap();
        assert!(watchlist.contains(&session.user_id, "tt0111161").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_sign_in_leaves_state_untouched() {
        let (gateway, _) = registered_gateway().await;
        let context = SessionContext::new(gateway);
        let session = context.sign_in("ada@example.com", "secret1").await.unwrap();

        let result = context.sign_in("ada@example.com", "wrong").await;

        assert!(matches!(result, Err(AppError::InvalidCredentials)));
        assert_eq!(context.current_session(), Some(session));
    }

    #[tokio::test]
    async fn test_signed_out_operations_fail_fast() {
        let mut gateway = MockRemoteGateway::new();
        gateway.expect_get_profile().times(0);

        let context = SessionContext::new(Arc::new(gateway));

        assert!(context.current_session().is_none());
        assert!(matches!(context.watchlist(), Err(AppError::Unauthenticated)));
        assert!(matches!(context.notifications(), Err(AppError::Unauthenticated)));
        assert!(matches!(context.profile().await, Err(AppError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_sign_out_is_idempotent_and_releases_stream() {
        let (gateway, registered) = registered_gateway().await;
        let context = SessionContext::new(gateway.clone());
        context.sign_in("ada@example.com", "secret1").await.unwrap();
        let feed = context.notifications().unwrap();

        context.sign_out();
        context.sign_out();
        assert!(context.current_session().is_none());
        tokio::task::yield_now().await;

        gateway
            .insert_notification(&NewNotification {
                owner_id: registered.user_id.clone(),
                title: "After sign-out".to_string(),
                message: "msg".to_string(),
                related_movie_id: None,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The stale feed handle stopped receiving pushes
        assert!(feed.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_push_reaches_active_session() {
        let (gateway, registered) = registered_gateway().await;
        let context = SessionContext::new(gateway.clone());
        context.sign_in("ada@example.com", "secret1").await.unwrap();
        let mut updates = context.notifications().unwrap().updates();

        gateway
            .insert_notification(&NewNotification {
                owner_id: registered.user_id.clone(),
                title: "New on Netflux".to_string(),
                message: "msg".to_string(),
                related_movie_id: None,
            })
            .await
            .unwrap();

        let pushed = tokio::time::timeout(Duration::from_secs(1), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pushed.title, "New on Netflux");
        assert_eq!(context.notifications().unwrap().unread_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_profile_refreshes_session_identity() {
        let (gateway, _) = registered_gateway().await;
        let context = SessionContext::new(gateway);
        context.sign_in("ada@example.com", "secret1").await.unwrap();

        let saved = context
            .update_profile(Profile {
                display_name: "Ada L.".to_string(),
                bio: "Film fan".to_string(),
                favorite_genre: Some("Sci-Fi".to_string()),
                avatar_url: Some("https://example.com/a.png".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(saved.favorite_genre.as_deref(), Some("Sci-Fi"));
        let session = context.current_session().unwrap();
        assert_eq!(session.display_name, "Ada L.");
        assert_eq!(session.avatar_url.as_deref(), Some("https://example.com/a.png"));
    }
}
