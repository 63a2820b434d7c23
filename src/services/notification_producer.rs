use std::sync::Arc;
use std::time::Duration;

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use tokio::task::JoinHandle;

use crate::{
    error::AppResult,
    gateway::RemoteGateway,
    models::{MovieKind, MovieReference, NewNotification},
    services::providers::MetadataProvider,
};

/// Queries one of which is used to find a release to announce
pub const RELEASE_QUERIES: [&str; 3] = ["2025", "new", "latest"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// `None` when the search turned up nothing to announce
    pub movie: Option<MovieReference>,
    pub sent: usize,
}

pub fn release_notification(owner_id: &str, movie: &MovieReference) -> NewNotification {
    NewNotification {
        owner_id: owner_id.to_string(),
        title: format!("🎬 New on Netflux: {}", movie.title),
        message: format!(
            "{} ({}) is now available. Watch it now!",
            movie.title, movie.year
        ),
        related_movie_id: Some(movie.id.clone()),
    }
}

/// Announces one randomly picked new release to every known user
///
/// A failed insert for one user is logged and skipped; `sent` counts the
/// successful ones. Inserts go through the gateway, so signed-in users receive them over their
/// change stream like any other notification.
pub async fn broadcast_new_release<R: Rng + Send>(
    gateway: &dyn RemoteGateway,
    provider: &dyn MetadataProvider,
    rng: &mut R,
) -> AppResult<BroadcastOutcome> {
    let query = RELEASE_QUERIES.choose(rng).copied().unwrap_or("new");
    let page = provider
        .search_filtered(query, 1, Some(MovieKind::Movie))
        .await?;

    let Some(movie) = page.results.choose(rng).cloned() else {
        tracing::info!(query, "No movies found, nothing to announce");
        return Ok(BroadcastOutcome {
            movie: None,
            sent: 0,
        });
    };

    let user_ids = gateway.list_user_ids().await?;
    let mut sent = 0;
    for user_id in &user_ids {
        match gateway
            .insert_notification(&release_notification(user_id, &movie))
            .await
        {
            Ok(_) => sent += 1,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Release notification not delivered");
            }
        }
    }

    tracing::info!(
        movie_id = %movie.id,
        title = %movie.title,
        sent,
        failed = user_ids.len() - sent,
        "Sent new release notifications"
    );

    Ok(BroadcastOutcome {
        movie: Some(movie),
        sent,
    })
}

/// Runs [`broadcast_new_release`] every `period`, starting one period from now
pub fn spawn_producer(
    gateway: Arc<dyn RemoteGateway>,
    provider: Arc<dyn MetadataProvider>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        let mut interval = tokio::time::interval(period);
        interval.tick().await;

        tracing::info!(period_secs = period.as_secs(), "Notification producer started");

        loop {
            interval.tick().await;
            if let Err(e) = broadcast_new_release(gateway.as_ref(), provider.as_ref(), &mut rng).await
            {
                tracing::error!(error = %e, "New release broadcast failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::gateway::{InMemoryGateway, MockRemoteGateway};
    use crate::models::Notification;
    use crate::models::{MovieDetails, Registration, SearchPage};
    use std::sync::Mutex;

    struct StubProvider {
        results: Vec<MovieReference>,
        seen: Mutex<Vec<(String, Option<MovieKind>)>>,
    }

    #[async_trait::async_trait]
    impl MetadataProvider for StubProvider {
        async fn search_filtered(
            &self,
            query: &str,
            _page: u32,
            kind: Option<MovieKind>,
        ) -> AppResult<SearchPage> {
            self.seen.lock().unwrap().push((query.to_string(), kind));
            Ok(SearchPage {
                total_count: self.results.len() as u32,
                results: self.results.clone(),
            })
        }

        async fn get_details(&self, _id: &str) -> AppResult<Option<MovieDetails>> {
            Err(AppError::Internal("unused".to_string()))
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    fn interstellar() -> MovieReference {
        MovieReference {
            id: "tt0816692".to_string(),
            title: "Interstellar".to_string(),
            year: "2014".to_string(),
            poster_url: "N/A".to_string(),
            kind: MovieKind::Movie,
        }
    }

    async fn gateway_with_users(n: usize) -> InMemoryGateway {
        let gateway = InMemoryGateway::new();
        for i in 0..n {
            gateway
                .register(&Registration {
                    display_name: format!("user{}", i),
                    email: format!("user{}@example.com", i),
                    password: "secret1".to_string(),
                })
                .await
                .unwrap();
        }
        gateway
    }

    #[test]
    fn test_release_notification_text() {
        let n = release_notification("u1", &interstellar());
        assert_eq!(n.title, "🎬 New on Netflux: Interstellar");
        assert_eq!(n.message, "Interstellar (2014) is now available. Watch it now!");
        assert_eq!(n.related_movie_id.as_deref(), Some("tt0816692"));
    }

    #[tokio::test]
    async fn test_broadcast_notifies_every_user() {
        let gateway = gateway_with_users(3).await;
        let provider = StubProvider {
            results: vec![interstellar()],
            seen: Mutex::new(vec![]),
        };
        let mut rng = StdRng::seed_from_u64(7);

        let outcome = broadcast_new_release(&gateway, &provider, &mut rng)
            .await
            .unwrap();

        assert_eq!(outcome.sent, 3);
        assert_eq!(outcome.movie, Some(interstellar()));

        for user_id in gateway.list_user_ids().await.unwrap() {
            let feed = gateway.select_notifications(&user_id, 20).await.unwrap();
            assert_eq!(feed.len(), 1);
            assert!(!feed[0].read);
        }

        let seen = provider.seen.lock().unwrap();
        assert!(RELEASE_QUERIES.contains(&seen[0].0.as_str()));
        assert_eq!(seen[0].1, Some(MovieKind::Movie));
    }

    #[tokio::test]
    async fn test_broadcast_without_results_sends_nothing() {
        let gateway = gateway_with_users(2).await;
        let provider = StubProvider {
            results: vec![],
            seen: Mutex::new(vec![]),
        };
        let mut rng = StdRng::seed_from_u64(7);

        let outcome = broadcast_new_release(&gateway, &provider, &mut rng)
            .await
            .unwrap();

        assert_eq!(outcome, BroadcastOutcome { movie: None, sent: 0 });
        for user_id in gateway.list_user_ids().await.unwrap() {
            assert!(gateway.select_notifications(&user_id, 20).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_broadcast_continues_past_failed_insert() {
        let mut gateway = MockRemoteGateway::new();
        gateway
            .expect_list_user_ids()
            .returning(|| Ok(vec!["gone".to_string(), "u2".to_string(), "u3".to_string()]));
        let delivered = std::sync::Arc::new(Mutex::new(Vec::new()));
        let recorded = delivered.clone();
        gateway
            .expect_insert_notification()
            .times(3)
            .returning(move |n| {
                if n.owner_id == "gone" {
                    return Err(AppError::Internal("foreign key violation".to_string()));
                }
                recorded.lock().unwrap().push(n.owner_id.clone());
                Ok(Notification {
                    id: format!("n-{}", n.owner_id),
                    owner_id: n.owner_id.clone(),
                    title: n.title.clone(),
                    message: n.message.clone(),
                    related_movie_id: n.related_movie_id.clone(),
                    read: false,
                    created_at: chrono::Utc::now(),
                })
            });
        let provider = StubProvider {
            results: vec![interstellar()],
            seen: Mutex::new(vec![]),
        };
        let mut rng = StdRng::seed_from_u64(7);

        let outcome = broadcast_new_release(&gateway, &provider, &mut rng)
            .await
            .unwrap();

        assert_eq!(outcome.sent, 2);
        assert_eq!(*delivered.lock().unwrap(), vec!["u2", "u3"]);
    }
}
