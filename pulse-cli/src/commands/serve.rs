//! Pulse serve command
//!
//! Runs the viewer-facing server:
//! - WebSocket feed at `/ws` with a windowed count every broadcast tick
//! - One-shot aggregate at `/stats`
//! - Liveness at `/ping` and `/api/health`

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use pulse_core::EventStore;
use pulse_server::PulseServer;
use tracing::info;

use crate::config::{ConfigLoader, RawPulseConfig};
use crate::signal::cancel_on_signal;

/// Arguments for the serve command
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Event store connection string
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,
}

impl ServeArgs {
    fn overrides(&self) -> RawPulseConfig {
        let mut raw = RawPulseConfig::default();
        raw.server.host = self.host.clone();
        raw.server.port = self.port;
        raw.database.url = self.database_url.clone();
        raw
    }
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let config = ConfigLoader::load_with(args.overrides())?;
    let store = Arc::new(super::connect_store(&config).await?);

    let server_config = config.server_config();
    info!(
        "Starting pulse server on {}:{}",
        server_config.host, server_config.port
    );

    let server = PulseServer::new(server_config, Arc::clone(&store) as Arc<dyn EventStore>);
    cancel_on_signal(server.shutdown_token());

    let result = server.run().await;

    store.close().await;
    info!("Event store closed");

    result.map_err(Into::into)
}
