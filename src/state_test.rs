use time::macros::datetime;

use super::*;
use crate::services::directory::AuthorProfile;

#[test]
fn push_appends_in_arrival_order() {
    let firm = Uuid::new_v4();
    let mut state = FeedState::new(firm);
    let a = test_helpers::message_with_body(firm, Uuid::new_v4(), "first");
    let b = test_helpers::message_with_body(firm, Uuid::new_v4(), "second");

    assert!(state.push(a.clone()));
    assert!(state.push(b.clone()));

    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[0].id, a.id);
    assert_eq!(state.messages[1].id, b.id);
}

#[test]
fn push_drops_duplicate_ids() {
    let firm = Uuid::new_v4();
    let mut state = FeedState::new(firm);
    let msg = test_helpers::message_with_body(firm, Uuid::new_v4(), "hello");

    assert!(state.push(msg.clone()));
    assert!(!state.push(msg));
    assert_eq!(state.messages.len(), 1);
}

#[test]
fn push_is_suppressed_after_teardown() {
    let firm = Uuid::new_v4();
    let mut state = FeedState::new(firm);
    state.alive = false;

    let msg = test_helpers::message_with_body(firm, Uuid::new_v4(), "late");
    assert!(!state.push(msg));
    assert!(state.messages.is_empty());
    assert!(state.seen.is_empty());
}

#[test]
fn reset_clears_everything_and_rebinds_firm() {
    let f1 = Uuid::new_v4();
    let f2 = Uuid::new_v4();
    let author = Uuid::new_v4();

    let mut state = FeedState::new(f1);
    state.push(test_helpers::message_at(f1, author, datetime!(2026-08-20 09:00 UTC)));
    state.directory.upsert(AuthorProfile { id: author, email: "alice@x.com".into() });

    state.reset(f2);

    assert_eq!(state.firm_id, f2);
    assert!(state.messages.is_empty());
    assert!(state.seen.is_empty());
    assert!(state.directory.is_empty());
    assert!(state.alive);
}

#[test]
fn loading_snapshot_is_empty() {
    let firm = Uuid::new_v4();
    let snapshot = FeedSnapshot::loading(firm);
    assert_eq!(snapshot.firm_id, firm);
    assert_eq!(snapshot.revision, 0);
    assert_eq!(snapshot.status, FeedStatus::Loading);
    assert_eq!(snapshot.message_count(), 0);
    assert_eq!(snapshot.scroll, ScrollHint::Hold);
}

#[test]
fn feed_status_serializes_with_kind_tag() {
    let degraded = FeedStatus::Degraded { code: "E_DATABASE" };
    let json = serde_json::to_string(&degraded).unwrap();
    assert!(json.contains("degraded"));
    assert!(json.contains("E_DATABASE"));
}
