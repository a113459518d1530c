//! Display grouping — calendar-day buckets over the ordered feed.
//!
//! DESIGN
//! ======
//! Grouping is a pure, order-preserving partition of the already-sorted
//! sequence: a new bucket starts whenever the calendar day changes, and
//! nothing is ever re-sorted within or across buckets. Labels are computed
//! once from the `now` the caller supplies, so they cannot shift while a
//! single rendering pass is in flight.

use serde::Serialize;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::message::Message;
use crate::services::directory::AuthorDirectory;

// =============================================================================
// TYPES
// =============================================================================

/// One message as the host renders it.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedMessage {
    pub id: Uuid,
    /// Resolved display name, or the deterministic id-prefix fallback.
    pub author_label: String,
    pub author_resolved: bool,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Messages sharing one calendar day, under a display label.
#[derive(Debug, Clone, Serialize)]
pub struct DayGroup {
    pub label: String,
    pub messages: Vec<RenderedMessage>,
}

// =============================================================================
// GROUPING
// =============================================================================

/// Partition `messages` into labeled day buckets relative to `now`,
/// rendering author labels from the directory as it goes.
#[must_use]
pub fn group_by_day(
    messages: &[Message],
    directory: &AuthorDirectory,
    now: OffsetDateTime,
    offset: UtcOffset,
) -> Vec<DayGroup> {
    let today = now.to_offset(offset).date();
    let yesterday = today.previous_day();

    let mut groups: Vec<DayGroup> = Vec::new();
    let mut current_day: Option<Date> = None;

    for message in messages {
        let day = message.created_at.to_offset(offset).date();
        if current_day != Some(day) {
            groups.push(DayGroup { label: day_label(day, today, yesterday), messages: Vec::new() });
            current_day = Some(day);
        }

        let (author_label, author_resolved) = directory.label_for(message.author_id);
        if let Some(group) = groups.last_mut() {
            group.messages.push(RenderedMessage {
                id: message.id,
                author_label,
                author_resolved,
                body: message.body.clone(),
                created_at: message.created_at,
            });
        }
    }

    groups
}

fn day_label(day: Date, today: Date, yesterday: Option<Date>) -> String {
    if day == today {
        return "Today".into();
    }
    if Some(day) == yesterday {
        return "Yesterday".into();
    }
    dated_label(day)
}

/// Short weekday/month/day caption, e.g. "Mon, Jan 1".
fn dated_label(day: Date) -> String {
    let format = format_description!("[weekday repr:short], [month repr:short] [day padding:none]");
    day.format(&format).unwrap_or_else(|_| day.to_string())
}

#[cfg(test)]
#[path = "grouping_test.rs"]
mod tests;
