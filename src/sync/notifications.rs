use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use super::projection::{FeedEvent, NotificationProjection};
use crate::{
    error::{AppError, AppResult},
    gateway::{ChangeEvent, RemoteGateway, Subscription},
    models::{Notification, FEED_WINDOW},
};

/// Capacity of the fan-out to feed listeners
const UPDATES_CAPACITY: usize = 32;

/// Recent notifications of the signed-in user with live inserts applied
///
/// A notification inserted between the initial `load` snapshot and the start
/// of `subscribe` may not be delivered until the next load. Applying a
/// duplicate delivery is harmless because the projection merges on id.
pub struct NotificationFeed {
    owner_id: String,
    gateway: Arc<dyn RemoteGateway>,
    projection: Arc<RwLock<NotificationProjection>>,
    updates: broadcast::Sender<Notification>,
}

/// Live binding between the gateway change stream and a feed
///
/// Dropping it stops delivery immediately.
pub struct FeedSubscription {
    owner_id: String,
    pump: JoinHandle<()>,
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.pump.abort();
        tracing::info!(owner_id = %self.owner_id, "Notification subscription released");
    }
}

impl NotificationFeed {
    pub fn new(owner_id: impl Into<String>, gateway: Arc<dyn RemoteGateway>) -> Self {
        let (updates, _) = broadcast::channel(UPDATES_CAPACITY);
        Self {
            owner_id: owner_id.into(),
            gateway,
            projection: Arc::new(RwLock::new(NotificationProjection::default())),
            updates,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn authorize(&self, owner_id: &str) -> AppResult<()> {
        if owner_id == self.owner_id {
            Ok(())
        } else {
            Err(AppError::Unauthenticated)
        }
    }

    async fn apply(projection: &RwLock<NotificationProjection>, event: FeedEvent) {
        let mut guard = projection.write().await;
        let current = std::mem::take(&mut *guard);
        *guard = current.apply(event);
    }

    /// Loads the most recent notifications into the feed and returns the feed
    pub async fn load(&self, owner_id: &str) -> AppResult<Vec<Notification>> {
        self.authorize(owner_id)?;

        let snapshot = self
            .gateway
            .select_notifications(owner_id, FEED_WINDOW)
            .await?;
        tracing::debug!(owner_id, loaded = snapshot.len(), "Notifications loaded");

        Self::apply(&self.projection, FeedEvent::Loaded(snapshot)).await;
        Ok(self.notifications().await)
    }

    /// Re-runs the initial load, picking up anything the change stream missed
    pub async fn refresh(&self, owner_id: &str) -> AppResult<Vec<Notification>> {
        self.load(owner_id).await
    }

    /// Starts applying inserts pushed for `owner_id`
    ///
    /// Each newly inserted notification is merged into the feed and then sent
    /// once to every receiver obtained from [`NotificationFeed::updates`].
    pub async fn subscribe(&self, owner_id: &str) -> AppResult<FeedSubscription> {
        self.authorize(owner_id)?;

        let stream = self.gateway.subscribe_notifications(owner_id).await?;
        let pump = tokio::spawn(Self::pump(
            stream,
            self.projection.clone(),
            self.updates.clone(),
        ));

        tracing::info!(owner_id, "Notification subscription established");
        Ok(FeedSubscription {
            owner_id: owner_id.to_string(),
            pump,
        })
    }

    async fn pump(
        mut stream: Subscription,
        projection: Arc<RwLock<NotificationProjection>>,
        updates: broadcast::Sender<Notification>,
    ) {
        while let Some(event) = stream.recv().await {
            let ChangeEvent::NotificationInserted(notification) = event;
            if notification.owner_id != stream.owner_id() {
                continue;
            }

            let is_new = {
                let mut guard = projection.write().await;
                let current = std::mem::take(&mut *guard);
                let is_new = !current.contains(&notification.id);
                *guard = current.apply(FeedEvent::Inserted(notification.clone()));
                is_new
            };

            if is_new {
                tracing::debug!(notification_id = %notification.id, "Notification pushed");
                let _ = updates.send(notification);
            }
        }

        tracing::debug!(owner_id = %stream.owner_id(), "Change stream ended");
    }

    /// Receiver of notifications newly delivered by the change stream
    pub fn updates(&self) -> broadcast::Receiver<Notification> {
        self.updates.subscribe()
    }

    /// Marks one notification read, locally first
    pub async fn mark_read(&self, id: &str) -> AppResult<()> {
        Self::apply(&self.projection, FeedEvent::MarkedRead(id.to_string())).await;

        self.gateway
            .update_notification_read(&self.owner_id, id)
            .await
            .inspect_err(|e| {
                tracing::warn!(notification_id = id, error = %e, "Mark read failed");
            })
    }

    /// Marks every notification read. The local unread count is zero as soon
    /// as this is called, whatever the remote call does.
    pub async fn mark_all_read(&self, owner_id: &str) -> AppResult<()> {
        self.authorize(owner_id)?;

        Self::apply(&self.projection, FeedEvent::MarkedAllRead).await;

        let changed = self
            .gateway
            .update_all_read(owner_id)
            .await
            .inspect_err(|e| {
                tracing::warn!(owner_id, error = %e, "Mark all read failed");
            })?;

        tracing::info!(owner_id, changed, "Marked all notifications read");
        Ok(())
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.projection.read().await.items().to_vec()
    }

    pub async fn unread_count(&self) -> usize {
        self.projection.read().await.unread_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{InMemoryGateway, MockRemoteGateway};
    use crate::models::NewNotification;
    use std::time::Duration;

    fn new_notification(owner: &str, title: &str) -> NewNotification {
        NewNotification {
            owner_id: owner.to_string(),
            title: title.to_string(),
            message: "msg".to_string(),
            related_movie_id: Some("tt0816692".to_string()),
        }
    }

    async fn wait_for_count(feed: &NotificationFeed, expected: usize) {
        for _ in 0..100 {
            if feed.notifications().await.len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("feed never reached {} items", expected);
    }

    #[tokio::test]
    async fn test_load_returns_twenty_most_recent() {
        let gateway = Arc::new(InMemoryGateway::new());
        for i in 0..25 {
            gateway
                .insert_notification(&new_notification("u1", &format!("n{}", i)))
                .await
                .unwrap();
        }

        let feed = NotificationFeed::new("u1", gateway.clone());
        let items = feed.load("u1").await.unwrap();

        assert_eq!(items.len(), FEED_WINDOW);
        assert!(items
            .windows(2)
            .all(|w| crate::models::feed_order(&w[0], &w[1]).is_le()));
    }

    #[tokio::test]
    async fn test_push_is_applied_and_announced_once() {
        let gateway = Arc::new(InMemoryGateway::new());
        let feed = NotificationFeed::new("u1", gateway.clone());
        feed.load("u1").await.unwrap();

        let _subscription = feed.subscribe("u1").await.unwrap();
        let mut updates = feed.updates();

        let inserted = gateway
            .insert_notification(&new_notification("u1", "Interstellar"))
            .await
            .unwrap();
        gateway
            .insert_notification(&new_notification("u2", "Someone else"))
            .await
            .unwrap();

        let announced = tokio::time::timeout(Duration::from_secs(1), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(announced, inserted);

        wait_for_count(&feed, 1).await;
        assert_eq!(feed.unread_count().await, 1);
    }

    #[tokio::test]
    async fn test_dropped_subscription_stops_delivery() {
        let gateway = Arc::new(InMemoryGateway::new());
        let feed = NotificationFeed::new("u1", gateway.clone());

        let subscription = feed.subscribe("u1").await.unwrap();
        drop(subscription);
        tokio::task::yield_now().await;

        gateway
            .insert_notification(&new_notification("u1", "Too late"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(feed.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_mark_all_read_three_of_five() {
        let gateway = Arc::new(InMemoryGateway::new());
        let mut inserted = Vec::new();
        for i in 0..5 {
            inserted.push(
                gateway
                    .insert_notification(&new_notification("u1", &format!("n{}", i)))
                    .await
                    .unwrap(),
            );
        }
        gateway.update_notification_read("u1", &inserted[0].id).await.unwrap();
        gateway.update_notification_read("u1", &inserted[1].id).await.unwrap();

        let feed = NotificationFeed::new("u1", gateway.clone());
        feed.load("u1").await.unwrap();
        assert_eq!(feed.unread_count().await, 3);

        feed.mark_all_read("u1").await.unwrap();

        let items = feed.notifications().await;
        assert_eq!(items.len(), 5);
        assert!(items.iter().all(|n| n.read));
        assert_eq!(feed.unread_count().await, 0);
        assert!(gateway
            .select_notifications("u1", FEED_WINDOW)
            .await
            .unwrap()
            .iter()
            .all(|n| n.read));
    }

    #[tokio::test]
    async fn test_mark_read_updates_remote() {
        let gateway = Arc::new(InMemoryGateway::new());
        let inserted = gateway
            .insert_notification(&new_notification("u1", "n"))
            .await
            .unwrap();

        let feed = NotificationFeed::new("u1", gateway.clone());
        feed.load("u1").await.unwrap();
        feed.mark_read(&inserted.id).await.unwrap();
        feed.mark_read(&inserted.id).await.unwrap();

        assert_eq!(feed.unread_count().await, 0);
        let remote = gateway.select_notifications("u1", FEED_WINDOW).await.unwrap();
        assert!(remote[0].read);
    }

    #[tokio::test]
    async fn test_mark_all_read_is_optimistic_on_remote_failure() {
        let mut gateway = MockRemoteGateway::new();
        gateway.expect_select_notifications().returning(|owner, _| {
            Ok(vec![Notification {
                id: "n1".to_string(),
                owner_id: owner.to_string(),
                title: "t".to_string(),
                message: "m".to_string(),
                related_movie_id: None,
                read: false,
                created_at: chrono::Utc::now(),
            }])
        });
        gateway
            .expect_update_all_read()
            .returning(|_| Err(AppError::Internal("backend unavailable".to_string())));

        let feed = NotificationFeed::new("u1", Arc::new(gateway));
        feed.load("u1").await.unwrap();

        let result = feed.mark_all_read("u1").await;
        assert!(result.is_err());
        assert_eq!(feed.unread_count().await, 0);
    }

    #[tokio::test]
    async fn test_other_owner_rejected_locally() {
        let mut gateway = MockRemoteGateway::new();
        gateway.expect_select_notifications().times(0);
        gateway.expect_subscribe_notifications().times(0);

        let feed = NotificationFeed::new("u1", Arc::new(gateway));

        assert!(matches!(feed.load("u2").await, Err(AppError::Unauthenticated)));
        assert!(matches!(feed.subscribe("u2").await, Err(AppError::Unauthenticated)));
    }
}
