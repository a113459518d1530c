use time::macros::datetime;

use super::*;

fn message_at(ts: time::OffsetDateTime) -> Message {
    Message {
        id: Uuid::new_v4(),
        firm_id: Uuid::new_v4(),
        author_id: Uuid::new_v4(),
        body: "hi".into(),
        created_at: ts,
    }
}

#[test]
fn serde_round_trip_keeps_timestamp() {
    let msg = message_at(datetime!(2026-08-20 12:30:45 UTC));
    let json = serde_json::to_string(&msg).unwrap();
    let restored: Message = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, msg);
    assert!(json.contains("2026-08-20T12:30:45"));
}

#[test]
fn in_feed_order_accepts_sorted_sequences_and_ties() {
    let rows = vec![
        message_at(datetime!(2026-08-20 10:00 UTC)),
        message_at(datetime!(2026-08-20 10:00 UTC)),
        message_at(datetime!(2026-08-20 11:00 UTC)),
    ];
    assert!(in_feed_order(&rows));
    assert!(in_feed_order(&[]));
    assert!(in_feed_order(&rows[..1]));
}

#[test]
fn in_feed_order_rejects_regressions() {
    let rows = vec![
        message_at(datetime!(2026-08-20 11:00 UTC)),
        message_at(datetime!(2026-08-20 10:59 UTC)),
    ];
    assert!(!in_feed_order(&rows));
}
