//! Pulse consume command
//!
//! Subscribes the ingestion worker to the bus and persists every decoded
//! event. On shutdown the subscription drains before the store closes, so
//! no in-flight insert loses its connection.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use pulse_bus::NatsBus;
use pulse_core::EventStore;
use pulse_server::{IngestionWorker, start_ingest_consumer};
use tracing::{info, warn};

use crate::config::{ConfigLoader, RawPulseConfig};
use crate::signal::shutdown_signal;

/// Arguments for the consume command
#[derive(Debug, Args)]
pub struct ConsumeArgs {
    /// Event store connection string
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// NATS server address
    #[arg(long, value_name = "URL")]
    pub nats_url: Option<String>,

    /// Maximum deliveries handled at once
    #[arg(long)]
    pub max_in_flight: Option<usize>,
}

impl ConsumeArgs {
    fn overrides(&self) -> RawPulseConfig {
        let mut raw = RawPulseConfig::default();
        raw.database.url = self.database_url.clone();
        raw.nats.url = self.nats_url.clone();
        raw.nats.max_in_flight = self.max_in_flight;
        raw
    }
}

/// Run the consume command
pub async fn run(args: ConsumeArgs) -> Result<()> {
    let config = ConfigLoader::load_with(args.overrides())?;
    let bus_config = config.bus_config()?;

    let store = Arc::new(super::connect_store(&config).await?);
    let bus = NatsBus::connect(bus_config)
        .await
        .context("failed to connect to message bus")?;

    let worker = Arc::new(
        IngestionWorker::new(Arc::clone(&store) as Arc<dyn EventStore>)
            .with_insert_timeout(config.ingest.insert_timeout),
    );
    let subscription = start_ingest_consumer(&bus, worker)
        .await
        .context("failed to start ingest consumer")?;
    info!(subject = %config.nats.subject, "Consuming analytics events");

    if let Err(e) = shutdown_signal().await {
        warn!(error = %e, "Failed to listen for shutdown signal, stopping");
    }

    info!("Shutting down consumer");
    if let Err(e) = subscription.drain().await {
        warn!(error = %e, "Subscription did not drain cleanly");
    }
    if let Err(e) = bus.close().await {
        warn!(error = %e, "Failed to flush message bus connection");
    }
    store.close().await;
    info!("Consumer stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_carry_urls() {
        let args = ConsumeArgs {
            database_url: Some("postgres://localhost/pulse".to_string()),
            nats_url: Some("nats://localhost:4222".to_string()),
            max_in_flight: None,
        };

        let raw = args.overrides();

        assert_eq!(raw.database.url.as_deref(), Some("postgres://localhost/pulse"));
        assert_eq!(raw.nats.url.as_deref(), Some("nats://localhost:4222"));
        assert!(raw.nats.max_in_flight.is_none());
    }
}
