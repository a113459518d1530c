//! Postgres implementation of the backend seam.
//!
//! DESIGN
//! ======
//! Reads and the insert are plain SQLx queries. The live stream rides on
//! LISTEN/NOTIFY: an insert trigger publishes a JSON payload on the
//! `firm_messages` channel, and `subscribe` spawns a forward task that
//! filters by firm id into the subscription's channel. A listener error
//! ends the stream; the reconciler treats that as a drop and reconnects.
//!
//! Identity follows the session-token model: `current_user` joins the
//! session row against `users` and returns `None` for a missing, expired,
//! or unset token.

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{BackendError, ChatBackend, Subscription};
use crate::message::{Message, NewMessage};
use crate::services::directory::AuthorProfile;

const NOTIFY_CHANNEL: &str = "firm_messages";
const SUBSCRIPTION_QUEUE_CAPACITY: usize = 256;

/// Backend over a shared SQLx pool, optionally authenticated by a session
/// token for the send path.
pub struct PgBackend {
    pool: PgPool,
    session_token: Option<String>,
}

impl PgBackend {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool, session_token: None }
    }

    /// Attach the session token used by `current_user`.
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

#[async_trait]
impl ChatBackend for PgBackend {
    async fn fetch_messages(&self, firm_id: Uuid) -> Result<Vec<Message>, BackendError> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, Uuid, String, OffsetDateTime)>(
            "SELECT id, firm_id, author_id, body, created_at
             FROM messages
             WHERE firm_id = $1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(firm_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, firm_id, author_id, body, created_at)| Message { id, firm_id, author_id, body, created_at })
            .collect())
    }

    async fn fetch_authors(&self, ids: &[Uuid]) -> Result<Vec<AuthorProfile>, BackendError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, (Uuid, String)>("SELECT id, email FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(id, email)| AuthorProfile { id, email }).collect())
    }

    async fn fetch_author(&self, id: Uuid) -> Result<Option<AuthorProfile>, BackendError> {
        let row = sqlx::query_as::<_, (Uuid, String)>("SELECT id, email FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(id, email)| AuthorProfile { id, email }))
    }

    async fn insert_message(&self, message: NewMessage) -> Result<(), BackendError> {
        sqlx::query("INSERT INTO messages (id, firm_id, author_id, body) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::new_v4())
            .bind(message.firm_id)
            .bind(message.author_id)
            .bind(&message.body)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<AuthorProfile>, BackendError> {
        let Some(token) = &self.session_token else {
            return Ok(None);
        };

        let row = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT u.id, u.email
             FROM sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.token = $1 AND s.expires_at > now()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, email)| AuthorProfile { id, email }))
    }

    async fn subscribe(&self, firm_id: Uuid) -> Result<Subscription, BackendError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(NOTIFY_CHANNEL).await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_QUEUE_CAPACITY);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    notification = listener.recv() => match notification {
                        Ok(n) => {
                            let Some(message) = parse_notify_payload(n.payload()) else {
                                warn!(channel = NOTIFY_CHANNEL, "unparseable notify payload; dropping event");
                                continue;
                            };
                            if message.firm_id != firm_id {
                                continue;
                            }
                            if tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, %firm_id, "message listener dropped");
                            break;
                        }
                    },
                }
            }
            debug!(%firm_id, "subscription forward task finished");
        });

        Ok(Subscription::new(rx, stop_tx))
    }
}

// =============================================================================
// NOTIFY PAYLOAD
// =============================================================================

/// Shape emitted by the `notify_firm_message` trigger.
#[derive(Deserialize)]
struct NotifyPayload {
    id: Uuid,
    firm_id: Uuid,
    author_id: Uuid,
    body: String,
    created_at_ms: i64,
}

fn parse_notify_payload(payload: &str) -> Option<Message> {
    let parsed: NotifyPayload = serde_json::from_str(payload).ok()?;
    let created_at = OffsetDateTime::from_unix_timestamp_nanos(i128::from(parsed.created_at_ms) * 1_000_000).ok()?;
    Some(Message {
        id: parsed.id,
        firm_id: parsed.firm_id,
        author_id: parsed.author_id,
        body: parsed.body,
        created_at,
    })
}

#[cfg(test)]
#[path = "postgres_test.rs"]
mod tests;
