use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{postgres::PgListener, PgPool};
use tokio::sync::{broadcast, OnceCell};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{RemoteGateway, Subscription};
use crate::{
    error::{AppError, AppResult},
    models::{
        MovieKind, MovieReference, NewNotification, Notification, Profile, Registration, Session,
        WatchlistEntry,
    },
};

/// Channel the notifications insert trigger publishes on
pub const NOTIFICATION_CHANNEL: &str = "notification_inserts";

/// Buffer between the shared listener and the per-owner subscriptions
const INSERTS_CAPACITY: usize = 256;

const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    display_name: String,
    avatar_url: Option<String>,
}

impl From<UserRow> for Session {
    fn from(row: UserRow) -> Self {
        Session {
            user_id: row.id.to_string(),
            email: row.email,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    display_name: String,
    bio: String,
    favorite_genre: Option<String>,
    avatar_url: Option<String>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            display_name: row.display_name,
            bio: row.bio,
            favorite_genre: row.favorite_genre,
            avatar_url: row.avatar_url,
        }
    }
}

#[derive(sqlx::FromRow)]
struct WatchlistRow {
    user_id: Uuid,
    movie_id: String,
    title: String,
    year: String,
    poster_url: String,
    kind: String,
    added_at: DateTime<Utc>,
}

impl From<WatchlistRow> for WatchlistEntry {
    fn from(row: WatchlistRow) -> Self {
        WatchlistEntry {
            owner_id: row.user_id.to_string(),
            movie: MovieReference {
                id: row.movie_id,
                title: row.title,
                year: row.year,
                poster_url: row.poster_url,
                kind: row.kind.parse().unwrap_or(MovieKind::Movie),
            },
            added_at: row.added_at,
        }
    }
}

/// Shape of a `notifications` row, both from queries and from trigger payloads
#[derive(sqlx::FromRow, Deserialize)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    message: String,
    movie_id: Option<String>,
    read: bool,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: row.id.to_string(),
            owner_id: row.user_id.to_string(),
            title: row.title,
            message: row.message,
            related_movie_id: row.movie_id,
            read: row.read,
            created_at: row.created_at,
        }
    }
}

fn parse_id(id: &str) -> AppResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| AppError::InvalidInput(format!("Malformed identifier: {}", id)))
}

/// Decodes a trigger payload and hands it to every subscription
fn publish_payload(inserts: &broadcast::Sender<Notification>, payload: &str) {
    match serde_json::from_str::<NotificationRow>(payload) {
        Ok(row) => {
            // No live subscribers is not an error
            let _ = inserts.send(row.into());
        }
        Err(e) => tracing::warn!(error = %e, "Unreadable notification payload"),
    }
}

/// The LISTEN task, aborted once the last gateway clone is gone
struct ListenerTask(JoinHandle<()>);

impl Drop for ListenerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Gateway over the Postgres schema in `migrations/`
///
/// All change streams share one LISTEN connection, opened on the first
/// subscription and fanned out per owner.
#[derive(Clone)]
pub struct PgGateway {
    pool: PgPool,
    inserts: broadcast::Sender<Notification>,
    listener: Arc<OnceCell<ListenerTask>>,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        let (inserts, _) = broadcast::channel(INSERTS_CAPACITY);
        Self {
            pool,
            inserts,
            listener: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_listener(&self) -> AppResult<()> {
        self.listener
            .get_or_try_init(|| async {
                let mut listener = PgListener::connect_with(&self.pool).await?;
                listener.listen(NOTIFICATION_CHANNEL).await?;
                tracing::info!(channel = NOTIFICATION_CHANNEL, "Notification listener started");

                let task = tokio::spawn(Self::listen(listener, self.inserts.clone()));
                Ok::<_, AppError>(ListenerTask(task))
            })
            .await?;
        Ok(())
    }

    async fn listen(mut listener: PgListener, inserts: broadcast::Sender<Notification>) {
        loop {
            match listener.recv().await {
                Ok(message) => publish_payload(&inserts, message.payload()),
                Err(sqlx::Error::PoolClosed) => break,
                Err(e) => {
                    // The next recv reconnects; inserts made meanwhile arrive on refresh
                    tracing::error!(error = %e, "Notification listener failed, reconnecting");
                    tokio::time::sleep(LISTENER_RETRY_DELAY).await;
                }
            }
        }
        tracing::info!("Notification listener stopped");
    }
}

#[async_trait::async_trait]
impl RemoteGateway for PgGateway {
    async fn register(&self, registration: &Registration) -> AppResult<Session> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (email, password_hash, display_name)
            VALUES (lower(trim($1)), crypt($2, gen_salt('bf')), $3)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, email, display_name, avatar_url
            "#,
        )
        .bind(&registration.email)
        .bind(&registration.password)
        .bind(&registration.display_name)
        .fetch_optional(&self.pool)
        .await?;

        let session: Session = row.ok_or(AppError::EmailTaken)?.into();
        tracing::info!(user_id = %session.user_id, "Account registered");
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, display_name, avatar_url
            FROM users
            WHERE email = lower(trim($1)) AND password_hash = crypt($2, password_hash)
            "#,
        )
        .bind(email)
        .bind(password)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Session::from).ok_or(AppError::InvalidCredentials)
    }

    async fn get_profile(&self, user_id: &str) -> AppResult<Profile> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT display_name, bio, favorite_genre, avatar_url FROM users WHERE id = $1",
        )
        .bind(parse_id(user_id)?)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Profile::from)
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }

    async fn update_profile(&self, user_id: &str, profile: &Profile) -> AppResult<Profile> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            UPDATE users
            SET display_name = $2, bio = $3, favorite_genre = $4, avatar_url = $5
            WHERE id = $1
            RETURNING display_name, bio, favorite_genre, avatar_url
            "#,
        )
        .bind(parse_id(user_id)?)
        .bind(&profile.display_name)
        .bind(&profile.bio)
        .bind(&profile.favorite_genre)
        .bind(&profile.avatar_url)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Profile::from)
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }

    async fn list_user_ids(&self) -> AppResult<Vec<String>> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM users")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(|id| id.to_string()).collect())
    }

    async fn select_watchlist(&self, owner_id: &str) -> AppResult<Vec<WatchlistEntry>> {
        let rows = sqlx::query_as::<_, WatchlistRow>(
            r#"
            SELECT user_id, movie_id, title, year, poster_url, kind, added_at
            FROM watchlist_entries
            WHERE user_id = $1
            ORDER BY added_at DESC, movie_id DESC
            "#,
        )
        .bind(parse_id(owner_id)?)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(WatchlistEntry::from).collect())
    }

    async fn select_watchlist_entry(
        &self,
        owner_id: &str,
        movie_id: &str,
    ) -> AppResult<Option<WatchlistEntry>> {
        let row = sqlx::query_as::<_, WatchlistRow>(
            r#"
            SELECT user_id, movie_id, title, year, poster_url, kind, added_at
            FROM watchlist_entries
            WHERE user_id = $1 AND movie_id = $2
            "#,
        )
        .bind(parse_id(owner_id)?)
        .bind(movie_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(WatchlistEntry::from))
    }

    async fn upsert_watchlist_entry(&self, entry: &WatchlistEntry) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO watchlist_entries (user_id, movie_id, title, year, poster_url, kind, added_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, movie_id) DO NOTHING
            "#,
        )
        .bind(parse_id(&entry.owner_id)?)
        .bind(&entry.movie.id)
        .bind(&entry.movie.title)
        .bind(&entry.movie.year)
        .bind(&entry.movie.poster_url)
        .bind(entry.movie.kind.as_str())
        .bind(entry.added_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            owner_id = %entry.owner_id,
            movie_id = %entry.movie.id,
            inserted = result.rows_affected(),
            "Watchlist upsert"
        );
        Ok(())
    }

    async fn delete_watchlist_entry(&self, owner_id: &str, movie_id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM watchlist_entries WHERE user_id = $1 AND movie_id = $2")
            .bind(parse_id(owner_id)?)
            .bind(movie_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn select_notifications(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> AppResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, user_id, title, message, movie_id, read, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(parse_id(owner_id)?)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn insert_notification(&self, notification: &NewNotification) -> AppResult<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            INSERT INTO notifications (user_id, title, message, movie_id, read)
            VALUES ($1, $2, $3, $4, false)
            RETURNING id, user_id, title, message, movie_id, read, created_at
            "#,
        )
        .bind(parse_id(&notification.owner_id)?)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.related_movie_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn update_notification_read(&self, owner_id: &str, id: &str) -> AppResult<()> {
        sqlx::query("UPDATE notifications SET read = true WHERE id = $1 AND user_id = $2")
            .bind(parse_id(id)?)
            .bind(parse_id(owner_id)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_all_read(&self, owner_id: &str) -> AppResult<u64> {
        let result =
            sqlx::query("UPDATE notifications SET read = true WHERE user_id = $1 AND read = false")
                .bind(parse_id(owner_id)?)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn subscribe_notifications(&self, owner_id: &str) -> AppResult<Subscription> {
        let owner = parse_id(owner_id)?.to_string();
        let inserts = self.inserts.subscribe();
        self.ensure_listener().await?;

        tracing::info!(owner_id = %owner, channel = NOTIFICATION_CHANNEL, "Change stream opened");
        Ok(Subscription::filtered(&owner, inserts))
    }
}
