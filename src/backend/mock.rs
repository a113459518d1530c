//! Scripted in-memory backend for reconciler tests.
//!
//! Counters expose how many round trips each capability took so tests can
//! assert batched-vs-lazy author resolution, and the captured push sender
//! lets tests drive the live stream (or end it to exercise reconnect).

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::backend::{BackendError, ChatBackend, Subscription};
use crate::message::{Message, NewMessage};
use crate::services::directory::AuthorProfile;

pub(crate) struct MockBackend {
    messages: Mutex<Vec<Message>>,
    authors: Mutex<HashMap<Uuid, AuthorProfile>>,
    user: Mutex<Option<AuthorProfile>>,
    push_tx: Mutex<Option<mpsc::Sender<Message>>>,
    author_gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub(crate) inserted: Mutex<Vec<NewMessage>>,
    pub(crate) fetch_messages_calls: AtomicUsize,
    pub(crate) fetch_authors_calls: AtomicUsize,
    pub(crate) fetch_author_calls: AtomicUsize,
    pub(crate) subscribe_calls: AtomicUsize,
    pub(crate) fail_fetch_messages: AtomicBool,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            authors: Mutex::new(HashMap::new()),
            user: Mutex::new(None),
            push_tx: Mutex::new(None),
            author_gate: Mutex::new(None),
            inserted: Mutex::new(Vec::new()),
            fetch_messages_calls: AtomicUsize::new(0),
            fetch_authors_calls: AtomicUsize::new(0),
            fetch_author_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
            fail_fetch_messages: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_user(&self, user: AuthorProfile) {
        *self.user.lock().unwrap() = Some(user);
    }

    pub(crate) fn seed_message(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }

    pub(crate) fn seed_author(&self, id: Uuid, email: &str) {
        self.authors.lock().unwrap().insert(id, AuthorProfile { id, email: email.into() });
    }

    /// Deliver a message over the captured subscription. Returns false when
    /// no live subscription exists or the receiving side is gone.
    pub(crate) async fn push(&self, message: Message) -> bool {
        let tx = self.push_tx.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.send(message).await.is_ok(),
            None => false,
        }
    }

    /// Drop the push sender so the current subscription's stream ends,
    /// simulating a listener drop.
    pub(crate) fn end_stream(&self) {
        self.push_tx.lock().unwrap().take();
    }

    /// Make the next `fetch_author` call wait until the returned sender
    /// fires, so tests can observe the fallback render deterministically.
    pub(crate) fn gate_fetch_author(&self) -> oneshot::Sender<()> {
        let (release_tx, release_rx) = oneshot::channel();
        *self.author_gate.lock().unwrap() = Some(release_rx);
        release_tx
    }

    pub(crate) fn inserted_bodies(&self) -> Vec<String> {
        self.inserted.lock().unwrap().iter().map(|m| m.body.clone()).collect()
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn fetch_messages(&self, firm_id: Uuid) -> Result<Vec<Message>, BackendError> {
        self.fetch_messages_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch_messages.load(Ordering::SeqCst) {
            return Err(BackendError::Database(sqlx::Error::PoolClosed));
        }
        let rows = self.messages.lock().unwrap();
        Ok(rows.iter().filter(|m| m.firm_id == firm_id).cloned().collect())
    }

    async fn fetch_authors(&self, ids: &[Uuid]) -> Result<Vec<AuthorProfile>, BackendError> {
        self.fetch_authors_calls.fetch_add(1, Ordering::SeqCst);
        let authors = self.authors.lock().unwrap();
        Ok(ids.iter().filter_map(|id| authors.get(id).cloned()).collect())
    }

    async fn fetch_author(&self, id: Uuid) -> Result<Option<AuthorProfile>, BackendError> {
        self.fetch_author_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.author_gate.lock().unwrap().take();
        if let Some(release) = gate {
            let _ = release.await;
        }
        Ok(self.authors.lock().unwrap().get(&id).cloned())
    }

    async fn insert_message(&self, message: NewMessage) -> Result<(), BackendError> {
        self.inserted.lock().unwrap().push(message);
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<AuthorProfile>, BackendError> {
        Ok(self.user.lock().unwrap().clone())
    }

    async fn subscribe(&self, _firm_id: Uuid) -> Result<Subscription, BackendError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, _stop_rx) = oneshot::channel();
        *self.push_tx.lock().unwrap() = Some(tx);
        Ok(Subscription::new(rx, stop_tx))
    }
}
