//! End-to-end tour against a live store: single commands, a batch, and a
//! short-lived subscription.
//!
//! Run with a local server listening on 6379:
//! `cargo run -p redpool-client --example demo`

use std::time::Duration;

use anyhow::Result;
use redpool_client::{ClientConfig, RedisClient};
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let client = RedisClient::with_config(ClientConfig {
        addr: "127.0.0.1:6379".to_string(),
        acquire_timeout: Duration::from_secs(2),
        ..ClientConfig::default()
    })?;

    client.set(b"demo:greeting", b"hello")?;
    let value = client.get(b"demo:greeting")?;
    info!(?value, "single command round trip");

    let replies = client.pipelined(|pipe| {
        pipe.incr(b"demo:hits")
            .incr(b"demo:hits")
            .get(b"demo:greeting");
        Ok(())
    })?;
    info!(?replies, "batched replies in stage order");

    let subscription = client.subscribe(
        |message| {
            println!(
                "{} -> {}",
                String::from_utf8_lossy(&message.channel),
                String::from_utf8_lossy(&message.payload)
            );
        },
        &[b"demo:events"],
    )?;
    client.publish(b"demo:events", b"it works")?;
    std::thread::sleep(Duration::from_millis(200));
    subscription.unsubscribe()?;

    info!(stats = ?client.pool_stats(), "pool occupancy before shutdown");
    client.shutdown();
    Ok(())
}
