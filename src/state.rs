//! Per-panel feed state and the host-facing snapshot types.
//!
//! DESIGN
//! ======
//! `FeedState` is owned exclusively by one driver task; nothing else writes
//! it, so no locking is needed. The only discipline is the `alive` flag: it
//! is cleared on teardown and checked before every mutation so a settlement
//! arriving after teardown is suppressed rather than aborted.

use std::collections::HashSet;

use serde::Serialize;
use uuid::Uuid;

use crate::message::Message;
use crate::services::directory::AuthorDirectory;
use crate::services::grouping::DayGroup;

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag, surfaced in degraded snapshots.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// FEED STATE
// =============================================================================

/// The ordered message sequence plus author directory for one firm.
/// Fully reset whenever the firm identifier changes; no carry-over.
pub struct FeedState {
    pub firm_id: Uuid,
    /// Append-only, already in feed order. Unbounded by design.
    pub messages: Vec<Message>,
    /// Ids already appended; duplicates across fetch and push are dropped.
    pub seen: HashSet<Uuid>,
    pub directory: AuthorDirectory,
    /// Cleared exactly once on teardown; guards every mutation.
    pub alive: bool,
}

impl FeedState {
    #[must_use]
    pub fn new(firm_id: Uuid) -> Self {
        Self {
            firm_id,
            messages: Vec::new(),
            seen: HashSet::new(),
            directory: AuthorDirectory::new(),
            alive: true,
        }
    }

    /// Append a message unless the state is torn down or the id was already
    /// seen. Returns whether the message was appended.
    pub fn push(&mut self, message: Message) -> bool {
        if !self.alive {
            return false;
        }
        if !self.seen.insert(message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Drop everything and rebind to a new firm. The directory does not
    /// carry over either.
    pub fn reset(&mut self, firm_id: Uuid) {
        self.firm_id = firm_id;
        self.messages.clear();
        self.seen.clear();
        self.directory = AuthorDirectory::new();
    }
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

/// Where the feed stands, surfaced instead of the source's silent failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum FeedStatus {
    /// Initialization in flight; no historical messages published yet.
    Loading,
    /// Subscription open and historical fetch applied.
    Live,
    /// A read/write/subscribe failure occurred; the feed keeps whatever it
    /// has and recovers on its own where it can.
    Degraded { code: &'static str },
    /// Torn down; no further snapshots will be published.
    Closed,
}

/// What the host should do with its scroll position after this snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollHint {
    /// Leave the viewport alone.
    Hold,
    /// Smooth-scroll to the newest message (view is pinned to latest).
    SmoothToLatest,
}

/// Immutable rendering of the feed, published on every state change.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub firm_id: Uuid,
    /// Monotonic per panel; restarts only when the panel is reopened.
    pub revision: u64,
    pub status: FeedStatus,
    pub groups: Vec<DayGroup>,
    pub scroll: ScrollHint,
}

impl FeedSnapshot {
    /// Initial snapshot published before the first fetch settles.
    #[must_use]
    pub fn loading(firm_id: Uuid) -> Self {
        Self { firm_id, revision: 0, status: FeedStatus::Loading, groups: Vec::new(), scroll: ScrollHint::Hold }
    }

    /// Total messages across all day groups.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.groups.iter().map(|g| g.messages.len()).sum()
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use time::OffsetDateTime;

    use super::*;

    /// Message with a fixed body at the given timestamp.
    #[must_use]
    pub fn message_at(firm_id: Uuid, author_id: Uuid, created_at: OffsetDateTime) -> Message {
        Message { id: Uuid::new_v4(), firm_id, author_id, body: "hello".into(), created_at }
    }

    /// Message with an explicit body, timestamped now.
    #[must_use]
    pub fn message_with_body(firm_id: Uuid, author_id: Uuid, body: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            firm_id,
            author_id,
            body: body.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
