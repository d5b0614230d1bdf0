use node_stream_rs::{ConnectionConfig, ConnectionManager, LogTailConsumer, TargetAddress};
use std::sync::Arc;

/// Tail one node's log stream in the terminal
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let origin = std::env::var("PANEL_ORIGIN").expect("PANEL_ORIGIN must be set in .env");
    let node = std::env::var("NODE_ID").unwrap_or_else(|_| "1".to_string());
    let token = std::env::var("PANEL_TOKEN").ok();

    let target = TargetAddress::from_page(&origin, &format!("/api/nodes/{}/logs/ws", node))?;
    println!("📡 Tailing {}\n", target);

    let (manager, events) = ConnectionManager::builder(ConnectionConfig::new(target.as_str()))
        .credentials(Arc::new(move || token.clone()))
        .build()?;
    let tail = LogTailConsumer::new(manager, events, 20);

    let mut changes = tail.subscribe();
    let mut printed = 0;
    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                // Print only lines that arrived since the last wake-up
                let lines = tail.lines();
                for line in lines.iter().skip(printed.min(lines.len())) {
                    println!("[{}] {}", tail.status(), line);
                }
                printed = lines.len();
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("\nDisconnecting...");
    drop(tail);
    Ok(())
}
