//! firmchat-tail — follow one firm's feed from a terminal.

use std::sync::Arc;

use firmchat::backend::postgres::PgBackend;
use firmchat::db;
use firmchat::services::feed::{FeedConfig, FeedPanel};
use firmchat::state::FeedSnapshot;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let firm_id: Uuid = std::env::var("FIRM_ID")
        .expect("FIRM_ID required")
        .parse()
        .expect("invalid FIRM_ID");

    let pool = db::init_pool(&database_url)
        .await
        .expect("database init failed");

    let mut backend = PgBackend::new(pool);
    if let Ok(token) = std::env::var("SESSION_TOKEN") {
        backend = backend.with_session_token(token);
    }

    let mut panel = FeedPanel::open(Arc::new(backend), firm_id, FeedConfig::from_env());
    let mut snapshots = panel.snapshots();

    tracing::info!(%firm_id, "firmchat tailing feed");
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                print_snapshot(&snapshot);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    panel.close().await;
    panel.join().await;
}

fn print_snapshot(snapshot: &FeedSnapshot) {
    println!(
        "== firm {} | rev {} | {:?} | {} messages ==",
        snapshot.firm_id,
        snapshot.revision,
        snapshot.status,
        snapshot.message_count()
    );
    for group in &snapshot.groups {
        println!("[{}]", group.label);
        for message in &group.messages {
            println!("  {}: {}", message.author_label, message.body);
        }
    }
}
