use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use super::SessionContext;
use crate::{
    error::{AppError, AppResult},
    gateway::RemoteGateway,
    models::Session,
};

/// Idle time after which a token is forgotten and its streams released
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

struct TrackedSession {
    context: Arc<SessionContext>,
    last_seen: Instant,
}

/// Signed-in clients of this service, keyed by their bearer token
///
/// A token unused for longer than the idle timeout is signed out, either when
/// it is next presented or by [`SessionRegistry::evict_idle`].
#[derive(Clone)]
pub struct SessionRegistry {
    gateway: Arc<dyn RemoteGateway>,
    idle_timeout: Duration,
    sessions: Arc<RwLock<HashMap<Uuid, TrackedSession>>>,
}

impl SessionRegistry {
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        Self::with_idle_timeout(gateway, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(gateway: Arc<dyn RemoteGateway>, idle_timeout: Duration) -> Self {
        Self {
            gateway,
            idle_timeout,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Signs in a new client and hands out its token
    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<(Uuid, Session)> {
        let context = Arc::new(SessionContext::new(self.gateway.clone()));
        let session = context.sign_in(email, password).await?;

        let token = Uuid::new_v4();
        self.sessions.write().await.insert(
            token,
            TrackedSession {
                context,
                last_seen: Instant::now(),
            },
        );

        Ok((token, session))
    }

    /// Context of a token, `Unauthenticated` when unknown, expired or signed out.
    /// A successful lookup counts as activity.
    pub async fn resolve(&self, token: &Uuid) -> AppResult<Arc<SessionContext>> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();

        let tracked = sessions.get_mut(token).ok_or(AppError::Unauthenticated)?;
        if now.duration_since(tracked.last_seen) <= self.idle_timeout {
            if tracked.context.current_session().is_none() {
                return Err(AppError::Unauthenticated);
            }
            tracked.last_seen = now;
            return Ok(tracked.context.clone());
        }

        let expired = sessions.remove(token);
        drop(sessions);

        if let Some(tracked) = expired {
            let user_id = tracked.context.current_session().map(|s| s.user_id);
            tracked.context.sign_out();
            tracing::info!(user_id = ?user_id, "Idle session expired");
        }
        Err(AppError::Unauthenticated)
    }

    /// Ends the client's session. Unknown tokens are ignored.
    pub async fn sign_out(&self, token: &Uuid) {
        let removed = self.sessions.write().await.remove(token);
        if let Some(tracked) = removed {
            tracked.context.sign_out();
        }
    }

    /// Signs out every session idle for longer than the timeout, returning how many
    pub async fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<TrackedSession> = {
            let mut sessions = self.sessions.write().await;
            let tokens: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, t)| now.duration_since(t.last_seen) > self.idle_timeout)
                .map(|(token, _)| *token)
                .collect();
            tokens
                .iter()
                .filter_map(|token| sessions.remove(token))
                .collect()
        };

        for tracked in &expired {
            tracked.context.sign_out();
        }
        if !expired.is_empty() {
            tracing::info!(evicted = expired.len(), "Evicted idle sessions");
        }
        expired.len()
    }

    /// Runs [`SessionRegistry::evict_idle`] every `period`
    pub fn spawn_idle_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                registry.evict_idle().await;
            }
        })
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use crate::models::Registration;

    async fn registry() -> SessionRegistry {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway
            .register(&Registration {
                display_name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                password: "secret1".to_string(),
            })
            .await
            .unwrap();
        SessionRegistry::new(gateway)
    }

    #[tokio::test]
    async fn test_token_lifecycle() {
        let registry = registry().await;
        let (token, session) = registry.sign_in("ada@example.com", "secret1").await.unwrap();

        let context = registry.resolve(&token).await.unwrap();
        assert_eq!(context.current_session(), Some(session));

        registry.sign_out(&token).await;
        registry.sign_out(&token).await;

        assert!(matches!(
            registry.resolve(&token).await,
            Err(AppError::Unauthenticated)
        ));
        assert!(context.current_session().is_none());
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_idle_token_expires_on_use() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway
            .register(&Registration {
                display_name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                password: "secret1".to_string(),
            })
            .await
            .unwrap();
        let registry = SessionRegistry::with_idle_timeout(gateway, Duration::from_millis(50));

        let (token, _) = registry.sign_in("ada@example.com", "secret1").await.unwrap();
        let context = registry.resolve(&token).await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(matches!(
            registry.resolve(&token).await,
            Err(AppError::Unauthenticated)
        ));
        assert!(context.current_session().is_none());
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_evict_idle_keeps_active_tokens() {
        let gateway = Arc::new(InMemoryGateway::new());
        for email in ["ada@example.com", "grace@example.com"] {
            gateway
                .register(&Registration {
                    display_name: "User".to_string(),
                    email: email.to_string(),
                    password: "secret1".to_string(),
                })
                .await
                .unwrap();
        }
        let registry = SessionRegistry::with_idle_timeout(gateway, Duration::from_millis(100));

        let (idle, _) = registry.sign_in("ada@example.com", "secret1").await.unwrap();
        let (busy, _) = registry.sign_in("grace@example.com", "secret1").await.unwrap();
        let idle_context = registry.resolve(&idle).await.unwrap();

        tokio::time::sleep(Duration::from_millis(70)).await;
        registry.resolve(&busy).await.unwrap();
        tokio::time::sleep(Duration::from_millis(70)).await;

        assert_eq!(registry.evict_idle().await, 1);
        assert_eq!(registry.active_count().await, 1);
        assert!(idle_context.current_session().is_none());
        assert!(registry.resolve(&busy).await.is_ok());
    }

    #[tokio::test]
    async fn test_bad_credentials_issue_no_token() {
        let registry = registry().await;
        let result = registry.sign_in("ada@example.com", "nope").await;

        assert!(matches!(result, Err(AppError::InvalidCredentials)));
        assert_eq!(registry.active_count().await, 0);
    }
}
