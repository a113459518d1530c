//! Backend — the seam to the hosted data/auth service.
//!
//! ARCHITECTURE
//! ============
//! The reconciler consumes five capabilities: a bulk message query, a
//! batched author query, a single-author query, a message insert, and a
//! current-identity lookup, plus a live subscription delivering new-row
//! events for one firm. `ChatBackend` is object-safe so panels can run over
//! any implementation; `PgBackend` is the concrete one.
//!
//! DESIGN
//! ======
//! A `Subscription` is an owned stream handle: events arrive over a bounded
//! channel, `close` is idempotent, and `Drop` closes too so the stream is
//! released on every exit path.

pub mod postgres;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::message::{Message, NewMessage};
use crate::services::directory::AuthorProfile;
use crate::state::ErrorCode;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
}

impl ErrorCode for BackendError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Database(_) => "E_DATABASE",
            Self::Subscribe(_) => "E_SUBSCRIBE",
        }
    }

    fn retryable(&self) -> bool {
        true
    }
}

// =============================================================================
// TRAIT
// =============================================================================

/// Capabilities the reconciler needs from the hosted data service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Bulk read of all messages for one firm, ordered by creation time
    /// ascending (ties by id). Order is guaranteed server-side.
    async fn fetch_messages(&self, firm_id: Uuid) -> Result<Vec<Message>, BackendError>;

    /// Batched point query resolving many author ids in one round trip.
    async fn fetch_authors(&self, ids: &[Uuid]) -> Result<Vec<AuthorProfile>, BackendError>;

    /// Single-author point query for lazy resolution of a pushed message.
    async fn fetch_author(&self, id: Uuid) -> Result<Option<AuthorProfile>, BackendError>;

    /// Insert one message. The server assigns the creation timestamp; the
    /// row comes back to the panel through the live subscription only.
    async fn insert_message(&self, message: NewMessage) -> Result<(), BackendError>;

    /// Current authenticated identity, if any.
    async fn current_user(&self) -> Result<Option<AuthorProfile>, BackendError>;

    /// Open a live stream of inserts scoped to one firm.
    async fn subscribe(&self, firm_id: Uuid) -> Result<Subscription, BackendError>;
}

// =============================================================================
// SUBSCRIPTION HANDLE
// =============================================================================

/// Owned handle to one live insert stream.
///
/// `recv` yields pushed messages until the stream ends; `None` means either
/// the handle was closed or the underlying listener dropped (the reconciler
/// reconnects in the latter case).
pub struct Subscription {
    rx: mpsc::Receiver<Message>,
    stop: Option<oneshot::Sender<()>>,
}

impl Subscription {
    #[must_use]
    pub fn new(rx: mpsc::Receiver<Message>, stop: oneshot::Sender<()>) -> Self {
        Self { rx, stop: Some(stop) }
    }

    /// Next pushed message, or `None` once the stream is finished.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Close the stream. Safe to call more than once; only the first call
    /// has any effect.
    pub fn close(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.rx.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.stop.is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}
