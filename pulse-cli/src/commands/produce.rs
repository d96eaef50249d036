//! Pulse produce command
//!
//! Publishes randomly generated analytics events at a fixed interval, for
//! local testing and demos.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use pulse_bus::{NatsBus, Publisher};
use pulse_core::AnalyticsEvent;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ConfigLoader, RawPulseConfig};
use crate::signal::cancel_on_signal;

/// Arguments for the produce command
#[derive(Debug, Args)]
pub struct ProduceArgs {
    /// NATS server address
    #[arg(long, value_name = "URL")]
    pub nats_url: Option<String>,

    /// Time between events, e.g. "1s" or "250ms"
    #[arg(short, long, value_parser = parse_interval)]
    pub interval: Option<Duration>,

    /// Stop after publishing this many events
    #[arg(short = 'n', long)]
    pub count: Option<u64>,
}

/// Parse a humantime duration, refusing zero.
fn parse_interval(value: &str) -> Result<Duration, String> {
    let interval =
        humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())?;
    if interval.is_zero() {
        return Err("interval must be greater than zero".to_string());
    }
    Ok(interval)
}

impl ProduceArgs {
    fn overrides(&self) -> RawPulseConfig {
        let mut raw = RawPulseConfig::default();
        raw.nats.url = self.nats_url.clone();
        raw.produce.interval = self.interval;
        raw
    }
}

/// Run the produce command
pub async fn run(args: ProduceArgs) -> Result<()> {
    let config = ConfigLoader::load_with(args.overrides())?;
    let bus = NatsBus::connect(config.bus_config()?)
        .await
        .context("failed to connect to message bus")?;

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());

    info!(interval = ?config.produce.interval, count = ?args.count, "Producing analytics events");
    let published = publish_loop(&bus, config.produce.interval, args.count, &shutdown).await;
    shutdown.cancel();

    if let Err(e) = bus.close().await {
        warn!(error = %e, "Failed to flush message bus connection");
    }
    info!(published, "Producer stopped");
    Ok(())
}

/// Publish a generated event every `interval` until `limit` events went out
/// or `shutdown` fires. Returns how many were published.
async fn publish_loop(
    publisher: &dyn Publisher,
    interval: Duration,
    limit: Option<u64>,
    shutdown: &CancellationToken,
) -> u64 {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut published = 0;

    while limit.is_none_or(|limit| published < limit) {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let event = AnalyticsEvent::generate();
        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode event");
                continue;
            }
        };

        match publisher.publish(payload).await {
            Ok(()) => {
                published += 1;
                debug!(
                    event_type = %event.event_type,
                    user_id = event.user_id,
                    "Published event"
                );
            }
            Err(e) => warn!(error = %e, "Failed to publish event"),
        }
    }

    published
}
