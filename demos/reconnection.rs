use node_stream_rs::{ConnectionConfig, ConnectionEvent, ConnectionManager, ReadyState};
use std::time::Duration;

/// Exercise reconnection against a real stream endpoint.
///
/// Restart the server while this runs to watch the backoff schedule.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let url = std::env::var("STREAM_URL").expect("STREAM_URL must be set in .env");
    let config = ConnectionConfig::new(&url)
        .with_reconnect_intervals(1000, 10000)
        .with_max_reconnect_attempts(5);

    let (manager, mut events) = ConnectionManager::new(config)?;
    let mut state = manager.watch_state();

    // Test 1: connect and wait for open
    println!("✅ Test 1: Initial connection to {}...", url);
    manager.connect();
    state.wait_for(|ready| *ready == ReadyState::Open).await?;
    println!("✅ Connected\n");

    // Test 2: explicit disconnect must not reconnect
    println!("✅ Test 2: Manual disconnect (should NOT auto-reconnect)...");
    manager.disconnect();
    tokio::time::sleep(Duration::from_secs(5)).await;
    if manager.is_connected() {
        return Err("Should NOT reconnect after manual disconnect".into());
    }
    println!("✅ Stayed disconnected\n");

    // Test 3: manual reconnect, then report events until exhaustion or ctrl-c
    println!("✅ Test 3: Manual reconnect, then watching events...");
    manager.manual_reconnect();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ConnectionEvent::Open) => println!("🟢 open (attempts reset to {})", manager.attempts()),
                Some(ConnectionEvent::Close { code, reason }) => {
                    println!("🔴 closed: {} '{}' (attempt {})", code, reason, manager.attempts())
                }
                Some(ConnectionEvent::Error(err)) => println!("⚠️  {}", err),
                Some(ConnectionEvent::ReconnectExhausted { attempts }) => {
                    println!("🛑 gave up after {} attempts", attempts);
                    break;
                }
                Some(ConnectionEvent::Message(message)) => println!("📨 {:?}", message),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    manager.disconnect();
    println!("🎉 Done");
    Ok(())
}
