use node_stream_rs::{
    ConnectionConfig, ConnectionManager, EventFeedConsumer, FeedConfig, FeedScope, FrameFormat,
    HttpEventHistory, TargetAddress,
};
use std::sync::Arc;

/// Watch the alert feed of the whole fleet, or of one node with NODE_ID set
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let origin = std::env::var("PANEL_ORIGIN").expect("PANEL_ORIGIN must be set in .env");
    let token = std::env::var("PANEL_TOKEN").ok();
    let scope = match std::env::var("NODE_ID") {
        Ok(node) => FeedScope::Node(node),
        Err(_) => FeedScope::Aggregate,
    };

    let credentials: Arc<dyn node_stream_rs::CredentialSource> =
        Arc::new(move || token.clone());

    let target = TargetAddress::from_page(&origin, "/api/events/ws")?;
    let config = ConnectionConfig::new(target.as_str()).with_frame_format(FrameFormat::Json);
    let (manager, events) = ConnectionManager::builder(config)
        .credentials(credentials.clone())
        .build()?;

    let history = HttpEventHistory::new(&format!("{}/api/events", origin), Some(credentials))?;
    let feed = EventFeedConsumer::new(manager, events, Arc::new(history), FeedConfig::new(scope))?;

    println!("🔔 Watching {:?} alerts from {}\n", feed.scope(), target);

    let mut updates = feed.subscribe();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let events = updates.borrow_and_update().clone();
                println!("--- {} events ({}) ---", events.len(), feed.status());
                for event in events.iter().take(10) {
                    let state = if event.is_resolved() { "resolved" } else { "active" };
                    println!("{:<12} {:<8} started={}", event.key(), state, event.started_at);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
