use anyhow::Result;
use tracing::{info, Level};

mod config;
mod service;

use config::ServiceConfig;
use service::AgentService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting alpha agent service");

    let config = ServiceConfig::from_env()?;
    let service = AgentService::from_config(&config)?;

    // Keep the sender halves alive; the external chat listener pushes
    // inbound messages through them.
    let mut topic_senders = Vec::new();
    for topic in &config.watched_topics {
        let tx = service.watch_topic(topic, "default");
        topic_senders.push((topic.clone(), tx));
    }
    info!(topics = topic_senders.len(), "watchers running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down gracefully...");
    service.shutdown().await;

    Ok(())
}
