//! Publish an order JSON file to the orders topic.
//!
//! ```text
//! publish <file> [topic]
//! ```
//!
//! The file is sent as-is, so invalid orders can be published too. The
//! message key is the file's `order_uid` when it has one.

use std::time::Duration;

use anyhow::Context;

use order_ingest::config::Config;
use order_ingest::messaging::RedpandaClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    order_ingest::logging::init(&config.log_level);

    let mut args = std::env::args().skip(1);
    let path = args.next().context("usage: publish <file> [topic]")?;
    let topic = args.next().unwrap_or_else(|| config.orders_topic.clone());

    let payload = std::fs::read(&path).with_context(|| format!("failed to read {}", path))?;
    let key = serde_json::from_slice::<serde_json::Value>(&payload)
        .ok()
        .and_then(|v| v.get("order_uid").and_then(|id| id.as_str()).map(str::to_owned))
        .unwrap_or_default();

    let client = RedpandaClient::new(&config.kafka_brokers)?;
    client.publish(&topic, &key, &payload).await?;
    client.flush(Duration::from_secs(5));

    tracing::info!(topic = %topic, key = %key, bytes = payload.len(), "Published {}", path);
    Ok(())
}
