//! Message — the universal row type for the firm feed.
//!
//! DESIGN
//! ======
//! Messages are created by an insert and never mutated or deleted in this
//! system's scope. Within one firm they form a total order by `created_at`;
//! ties keep arrival order, so every append in this crate is stable and no
//! comparator is ever applied after the server-side sort.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// One chat entry, as stored and as delivered by the live stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Opaque, unique, server-assigned identifier.
    pub id: Uuid,
    /// Groups messages into a feed.
    pub firm_id: Uuid,
    /// Foreign key into the author directory.
    pub author_id: Uuid,
    pub body: String,
    /// Server-assigned creation time; display ordering key.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Insert payload for the send protocol. The server assigns `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub firm_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
}

/// True when `rows` is non-decreasing by `created_at`.
///
/// The bulk query guarantees this server-side; the reconciler only
/// `debug_assert!`s it on hydration.
#[must_use]
pub fn in_feed_order(rows: &[Message]) -> bool {
    rows.windows(2).all(|w| w[0].created_at <= w[1].created_at)
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
