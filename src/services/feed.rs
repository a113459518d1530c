//! Feed service — the firm message stream reconciler.
//!
//! ARCHITECTURE
//! ============
//! `FeedPanel::open` spawns one driver task per panel. The driver owns the
//! whole `FeedState` and is the only writer, so reconciliation needs no
//! locks; hosts reach it through a bounded command channel and observe it
//! through a watch channel of immutable snapshots.
//!
//! DESIGN
//! ======
//! Initialization subscribes first, then bulk-fetches history and resolves
//! every historical author with one batched read before the first live
//! snapshot is published. Overlap between the fetch and the stream is
//! de-duplicated by message id. A pushed message from an unseen author is
//! appended and rendered with its fallback label immediately; the resolved
//! label lands on the next snapshot after the single-author read settles.
//!
//! ERROR HANDLING
//! ==============
//! Failures surface as a `Degraded` status instead of vanishing. A lost
//! stream or failed initialization re-runs the full init protocol after a
//! capped, jittered backoff; the refetch covers any messages missed while
//! disconnected. Teardown closes the subscription exactly once and clears
//! the liveness flag so late settlements cannot mutate state.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use time::{OffsetDateTime, UtcOffset};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{BackendError, ChatBackend};
use crate::message::{NewMessage, in_feed_order};
use crate::services::directory::{self, AuthorProfile};
use crate::services::grouping;
use crate::state::{ErrorCode, FeedSnapshot, FeedState, FeedStatus, ScrollHint};

const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 64;
const DEFAULT_RECONNECT_BASE_MS: u64 = 250;
const DEFAULT_RECONNECT_MAX_MS: u64 = 15_000;

/// Status code published when the live stream ends without a close request.
pub const CODE_STREAM_LOST: &str = "E_STREAM_LOST";

// =============================================================================
// CONFIG
// =============================================================================

/// Tuning knobs for a panel, loaded from environment variables.
#[derive(Debug, Clone, Copy)]
pub struct FeedConfig {
    /// Bounded capacity of the host command channel.
    pub command_queue_capacity: usize,
    /// First reconnect delay; doubles per failed attempt.
    pub reconnect_base_ms: u64,
    /// Ceiling for the reconnect delay.
    pub reconnect_max_ms: u64,
    /// Offset used to bucket messages into calendar days.
    pub utc_offset: UtcOffset,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
            reconnect_base_ms: DEFAULT_RECONNECT_BASE_MS,
            reconnect_max_ms: DEFAULT_RECONNECT_MAX_MS,
            utc_offset: UtcOffset::UTC,
        }
    }
}

impl FeedConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            command_queue_capacity: env_parse("FEED_COMMAND_QUEUE_CAPACITY", DEFAULT_COMMAND_QUEUE_CAPACITY),
            reconnect_base_ms: env_parse("FEED_RECONNECT_BASE_MS", DEFAULT_RECONNECT_BASE_MS),
            reconnect_max_ms: env_parse("FEED_RECONNECT_MAX_MS", DEFAULT_RECONNECT_MAX_MS),
            utc_offset: UtcOffset::UTC,
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// PANEL HANDLE
// =============================================================================

#[derive(Debug)]
enum Command {
    Send(String),
    SetFirm(Uuid),
    SetPinned(bool),
    Close,
}

/// Host-facing handle to one reconciler driver.
pub struct FeedPanel {
    cmd_tx: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<FeedSnapshot>,
    driver: JoinHandle<()>,
    closed: bool,
}

impl FeedPanel {
    /// Open a feed for one firm and start its driver task.
    #[must_use]
    pub fn open(backend: Arc<dyn ChatBackend>, firm_id: Uuid, config: FeedConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_queue_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(FeedSnapshot::loading(firm_id));
        let driver = tokio::spawn(run_driver(backend, firm_id, config, cmd_rx, snapshot_tx));
        Self { cmd_tx, snapshot_rx, driver, closed: false }
    }

    /// Subscribe to snapshot updates.
    #[must_use]
    pub fn snapshots(&self) -> watch::Receiver<FeedSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Submit a message body. Whitespace-only bodies and sends without a
    /// current identity are dropped without an insert; the host clears its
    /// input optimistically regardless.
    pub async fn send(&self, body: impl Into<String> + Send) {
        let _ = self.cmd_tx.send(Command::Send(body.into())).await;
    }

    /// Switch the panel to another firm. The whole view state is discarded
    /// and the initialization protocol reruns.
    pub async fn set_firm(&self, firm_id: Uuid) {
        let _ = self.cmd_tx.send(Command::SetFirm(firm_id)).await;
    }

    /// Tell the driver whether the view is scrolled to the latest message;
    /// live appends then carry a smooth-scroll hint.
    pub async fn set_pinned(&self, pinned: bool) {
        let _ = self.cmd_tx.send(Command::SetPinned(pinned)).await;
    }

    /// Tear the panel down. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.cmd_tx.send(Command::Close).await;
    }

    /// Wait for the driver task to finish. Call after `close`.
    pub async fn join(self) {
        let _ = self.driver.await;
    }
}

// =============================================================================
// DRIVER
// =============================================================================

enum LoopControl {
    Reconnect,
    Close,
}

struct Driver {
    backend: Arc<dyn ChatBackend>,
    config: FeedConfig,
    state: FeedState,
    snapshot_tx: watch::Sender<FeedSnapshot>,
    revision: u64,
    pinned: bool,
    identity: Option<AuthorProfile>,
    status: FeedStatus,
}

async fn run_driver(
    backend: Arc<dyn ChatBackend>,
    firm_id: Uuid,
    config: FeedConfig,
    mut cmd_rx: mpsc::Receiver<Command>,
    snapshot_tx: watch::Sender<FeedSnapshot>,
) {
    let mut driver = Driver {
        backend,
        config,
        state: FeedState::new(firm_id),
        snapshot_tx,
        revision: 0,
        pinned: true,
        identity: None,
        status: FeedStatus::Loading,
    };

    match driver.backend.current_user().await {
        Ok(user) => driver.identity = user,
        Err(e) => warn!(error = %e, "identity lookup failed; sending disabled"),
    }

    let mut backoff_ms = driver.config.reconnect_base_ms;

    'session: loop {
        // Subscribe before the historical fetch so inserts racing the fetch
        // are not missed; the overlap is de-duplicated by message id.
        let mut sub = match driver.backend.subscribe(driver.state.firm_id).await {
            Ok(sub) => sub,
            Err(e) => {
                error!(error = %e, firm_id = %driver.state.firm_id, "subscribe failed");
                driver.set_degraded(e.error_code());
                match driver.wait_before_reconnect(&mut cmd_rx, &mut backoff_ms).await {
                    LoopControl::Reconnect => continue 'session,
                    LoopControl::Close => break 'session,
                }
            }
        };

        if let Err(e) = driver.initialize().await {
            error!(error = %e, firm_id = %driver.state.firm_id, "feed initialization failed");
            sub.close();
            driver.set_degraded(e.error_code());
            match driver.wait_before_reconnect(&mut cmd_rx, &mut backoff_ms).await {
                LoopControl::Reconnect => continue 'session,
                LoopControl::Close => break 'session,
            }
        }
        backoff_ms = driver.config.reconnect_base_ms;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(Command::Close) => {
                        sub.close();
                        break 'session;
                    }
                    Some(Command::Send(body)) => driver.handle_send(body).await,
                    Some(Command::SetPinned(pinned)) => driver.pinned = pinned,
                    Some(Command::SetFirm(firm_id)) => {
                        sub.close();
                        driver.switch_firm(firm_id);
                        continue 'session;
                    }
                },
                message = sub.recv() => match message {
                    Some(message) => driver.handle_live(message).await,
                    None => {
                        warn!(firm_id = %driver.state.firm_id, "live stream ended; reconnecting");
                        sub.close();
                        driver.set_degraded(CODE_STREAM_LOST);
                        match driver.wait_before_reconnect(&mut cmd_rx, &mut backoff_ms).await {
                            LoopControl::Reconnect => continue 'session,
                            LoopControl::Close => break 'session,
                        }
                    }
                },
            }
        }
    }

    driver.teardown();
}

impl Driver {
    /// Bulk fetch, batched author resolution, then the first live snapshot.
    /// Also runs on every reconnect: the seen-id set makes the re-applied
    /// rows idempotent while the refetch fills any gap.
    async fn initialize(&mut self) -> Result<(), BackendError> {
        let rows = self.backend.fetch_messages(self.state.firm_id).await?;
        debug_assert!(in_feed_order(&rows), "bulk fetch must arrive in feed order");

        let authors = directory::distinct_authors(&rows);
        directory::resolve_all(self.backend.as_ref(), &mut self.state.directory, &authors).await?;

        let mut appended = 0_usize;
        for row in rows {
            if self.state.push(row) {
                appended += 1;
            }
        }
        info!(firm_id = %self.state.firm_id, appended, authors = authors.len(), "feed hydrated");

        self.status = FeedStatus::Live;
        self.publish(if self.pinned { ScrollHint::SmoothToLatest } else { ScrollHint::Hold });
        Ok(())
    }

    /// Apply one pushed insert: de-dup, append, render with whatever label
    /// is available now, then resolve an unseen author and render again.
    async fn handle_live(&mut self, message: crate::message::Message) {
        let author_id = message.author_id;
        if !self.state.push(message) {
            debug!(firm_id = %self.state.firm_id, "duplicate live message dropped");
            return;
        }

        let scroll = if self.pinned { ScrollHint::SmoothToLatest } else { ScrollHint::Hold };
        self.publish(scroll);

        if !self.state.directory.contains(&author_id) {
            match directory::resolve_one(self.backend.as_ref(), &mut self.state.directory, author_id).await {
                Ok(true) => self.publish(ScrollHint::Hold),
                Ok(false) => {}
                Err(e) => {
                    // The message stays visible under its fallback label.
                    warn!(error = %e, %author_id, "lazy author resolution failed");
                }
            }
        }
    }

    /// Send protocol: trimmed non-empty body and a known identity, or no
    /// insert at all. The panel never appends locally; the row comes back
    /// through the live stream.
    async fn handle_send(&mut self, body: String) {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return;
        }
        let Some(user) = &self.identity else {
            debug!(firm_id = %self.state.firm_id, "send ignored: no current identity");
            return;
        };

        let message = NewMessage {
            firm_id: self.state.firm_id,
            author_id: user.id,
            body: trimmed.to_string(),
        };
        if let Err(e) = self.backend.insert_message(message).await {
            error!(error = %e, firm_id = %self.state.firm_id, "send failed");
            self.set_degraded(e.error_code());
        }
    }

    /// Full reset for a new firm; nothing carries over.
    fn switch_firm(&mut self, firm_id: Uuid) {
        info!(from = %self.state.firm_id, to = %firm_id, "switching firm");
        self.state.reset(firm_id);
        self.status = FeedStatus::Loading;
        self.publish(ScrollHint::Hold);
    }

    fn set_degraded(&mut self, code: &'static str) {
        self.status = FeedStatus::Degraded { code };
        self.publish(ScrollHint::Hold);
    }

    fn publish(&mut self, scroll: ScrollHint) {
        if !self.state.alive {
            return;
        }
        self.revision += 1;
        let groups = grouping::group_by_day(
            &self.state.messages,
            &self.state.directory,
            OffsetDateTime::now_utc(),
            self.config.utc_offset,
        );
        let _ = self.snapshot_tx.send(FeedSnapshot {
            firm_id: self.state.firm_id,
            revision: self.revision,
            status: self.status.clone(),
            groups,
            scroll,
        });
    }

    /// Publish the final snapshot, then clear the liveness flag so any
    /// late-settling operation is suppressed.
    fn teardown(&mut self) {
        self.status = FeedStatus::Closed;
        self.publish(ScrollHint::Hold);
        self.state.alive = false;
        info!(firm_id = %self.state.firm_id, "feed panel closed");
    }

    /// Sleep out the backoff while still honoring host commands.
    async fn wait_before_reconnect(
        &mut self,
        cmd_rx: &mut mpsc::Receiver<Command>,
        backoff_ms: &mut u64,
    ) -> LoopControl {
        let delay = jittered(*backoff_ms);
        debug!(delay_ms = %delay.as_millis(), firm_id = %self.state.firm_id, "waiting before reconnect");
        *backoff_ms = backoff_ms.saturating_mul(2).min(self.config.reconnect_max_ms);

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return LoopControl::Reconnect,
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(Command::Close) => return LoopControl::Close,
                    Some(Command::SetFirm(firm_id)) => {
                        self.switch_firm(firm_id);
                        return LoopControl::Reconnect;
                    }
                    Some(Command::Send(body)) => self.handle_send(body).await,
                    Some(Command::SetPinned(pinned)) => self.pinned = pinned,
                },
            }
        }
    }
}

/// Backoff delay with up to 50% additive jitter.
fn jittered(base_ms: u64) -> Duration {
    let jitter = rand::rng().random_range(0..=base_ms / 2);
    Duration::from_millis(base_ms + jitter)
}

#[cfg(test)]
#[path = "feed_test.rs"]
mod tests;
