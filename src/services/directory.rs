//! Author directory — lazy, insert-only identity resolution.
//!
//! DESIGN
//! ======
//! The directory grows in two ways: one batched read for every author in
//! the historical fetch (per-message resolution there is the anti-pattern
//! this module exists to avoid), then one single-author read the first time
//! an unseen id arrives over the live stream. Entries are never removed or
//! replaced for the lifetime of a view, and rendering never blocks on
//! resolution: unknown ids get a deterministic fallback label.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::backend::{BackendError, ChatBackend};
use crate::message::Message;

/// Characters of the raw id shown while an author is unresolved.
pub const FALLBACK_LABEL_LEN: usize = 6;

// =============================================================================
// TYPES
// =============================================================================

/// Display metadata for one author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorProfile {
    pub id: Uuid,
    pub email: String,
}

impl AuthorProfile {
    /// Display name: the email local-part ("alice" from "alice@x.com").
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.email.split('@').next().unwrap_or(&self.email)
    }
}

/// Insert-only mapping from author id to display metadata.
#[derive(Debug, Default)]
pub struct AuthorDirectory {
    entries: HashMap<Uuid, AuthorProfile>,
}

impl AuthorDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    #[must_use]
    pub fn contains(&self, id: &Uuid) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<&AuthorProfile> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add an entry unless the id is already present. Entries are never
    /// updated once inserted.
    pub fn upsert(&mut self, profile: AuthorProfile) {
        self.entries.entry(profile.id).or_insert(profile);
    }

    /// Label plus whether it is resolved. Unresolved ids render as a
    /// fixed-length prefix of the raw identifier.
    #[must_use]
    pub fn label_for(&self, id: Uuid) -> (String, bool) {
        match self.entries.get(&id) {
            Some(profile) => (profile.display_name().to_string(), true),
            None => (fallback_label(id), false),
        }
    }
}

/// Deterministic stand-in identity derived from the raw id.
#[must_use]
pub fn fallback_label(id: Uuid) -> String {
    id.to_string().chars().take(FALLBACK_LABEL_LEN).collect()
}

// =============================================================================
// RESOLUTION
// =============================================================================

/// Distinct author ids in first-seen order.
#[must_use]
pub fn distinct_authors(messages: &[Message]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    messages
        .iter()
        .filter(|m| seen.insert(m.author_id))
        .map(|m| m.author_id)
        .collect()
}

/// Resolve a set of authors with one batched read. Ids the backend does not
/// know stay unresolved and keep their fallback labels.
///
/// # Errors
///
/// Returns a backend error if the batched read fails.
pub async fn resolve_all(
    backend: &dyn ChatBackend,
    directory: &mut AuthorDirectory,
    ids: &[Uuid],
) -> Result<(), BackendError> {
    if ids.is_empty() {
        return Ok(());
    }
    let profiles = backend.fetch_authors(ids).await?;
    debug!(requested = ids.len(), resolved = profiles.len(), "batched author resolution");
    for profile in profiles {
        directory.upsert(profile);
    }
    Ok(())
}

/// Resolve one author lazily. Returns whether a new entry was added.
///
/// # Errors
///
/// Returns a backend error if the point read fails.
pub async fn resolve_one(
    backend: &dyn ChatBackend,
    directory: &mut AuthorDirectory,
    id: Uuid,
) -> Result<bool, BackendError> {
    if directory.contains(&id) {
        return Ok(false);
    }
    match backend.fetch_author(id).await? {
        Some(profile) => {
            directory.upsert(profile);
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
#[path = "directory_test.rs"]
mod tests;
